//! Interactive input.
//!
//! Every question the CLI asks goes through [`Prompter`], so the install
//! workflow can be driven by a scripted implementation in tests.
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password, Select};
use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("no choices available for '{0}'")]
    NoChoices(String),

    /// Raised by non-interactive prompters when input would be required.
    #[error("input required for '{0}' but no terminal is available")]
    NotInteractive(String),
}

pub trait Prompter: Send + Sync {
    /// Free text input.
    fn input(&self, prompt: &str) -> Result<String, PromptError>;

    /// Masked input. `help` is shown before the prompt when present.
    fn secret(&self, prompt: &str, help: Option<&str>) -> Result<SecretString, PromptError>;

    /// Pick one of `items`, returning its index.
    fn select(&self, prompt: &str, items: &[String], default: usize)
    -> Result<usize, PromptError>;

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, PromptError>;
}

/// Terminal prompter backed by dialoguer.
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn input(&self, prompt: &str) -> Result<String, PromptError> {
        let value = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .interact_text()?;
        Ok(value.trim().to_string())
    }

    fn secret(&self, prompt: &str, help: Option<&str>) -> Result<SecretString, PromptError> {
        if let Some(help) = help {
            eprintln!("{help}");
        }
        let value = Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .interact()?;
        Ok(SecretString::from(value))
    }

    fn select(
        &self,
        prompt: &str,
        items: &[String],
        default: usize,
    ) -> Result<usize, PromptError> {
        if items.is_empty() {
            return Err(PromptError::NoChoices(prompt.to_string()));
        }
        let index = Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(default.min(items.len() - 1))
            .interact()?;
        Ok(index)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, PromptError> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }
}

/// Prompter for unattended runs. Every question fails, confirmations
/// included; pass the matching `--confirm` flag to skip them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn input(&self, prompt: &str) -> Result<String, PromptError> {
        Err(PromptError::NotInteractive(prompt.to_string()))
    }

    fn secret(&self, prompt: &str, _help: Option<&str>) -> Result<SecretString, PromptError> {
        Err(PromptError::NotInteractive(prompt.to_string()))
    }

    fn select(
        &self,
        prompt: &str,
        _items: &[String],
        _default: usize,
    ) -> Result<usize, PromptError> {
        Err(PromptError::NotInteractive(prompt.to_string()))
    }

    fn confirm(&self, prompt: &str, _default: bool) -> Result<bool, PromptError> {
        Err(PromptError::NotInteractive(prompt.to_string()))
    }
}
