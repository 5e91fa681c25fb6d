//! Resolution of provider configuration into stack parameters.
use crate::aws::{AwsError, SecretStore};
use crate::deploy::ParameterSet;
use crate::handler_id::HandlerId;
use crate::prompt::{PromptError, Prompter};
use crate::registry::{ConfigField, ProviderId};
use std::collections::BTreeMap;
use tracing::info;

pub const SECRET_REF_PREFIX: &str = "secretref://";
pub const DEFAULT_NAMESPACE: &str = "common-fate";

#[derive(Debug, thiserror::Error)]
pub enum ConfigureError {
    #[error("invalid config argument (expected format is --config key=value): {0}")]
    InvalidArgument(String),

    #[error("storing secret for '{key}' at {path}: {source}")]
    SecretStore {
        key: String,
        path: String,
        #[source]
        source: AwsError,
    },

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Splits a `key=value` argument on the first `=`.
pub fn parse_config_arg(raw: &str) -> Result<(String, String), ConfigureError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigureError::InvalidArgument(raw.to_string())),
    }
}

pub fn parse_overrides<I, S>(args: I) -> Result<BTreeMap<String, String>, ConfigureError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| parse_config_arg(a.as_ref()))
        .collect()
}

/// Stack parameter name for a schema key: `api_key` becomes `ApiKey`, or
/// `ApiKeySecret` for secrets.
pub fn parameter_name(key: &str, secret: bool) -> String {
    let mut name: String = key
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    if secret {
        name.push_str("Secret");
    }
    name
}

/// `/{namespace}/provider/{publisher}/{name}/{handler_id}/{key}`
pub fn secret_path(namespace: &str, provider: &ProviderId, handler_id: &HandlerId, key: &str) -> String {
    format!(
        "/{namespace}/provider/{}/{}/{handler_id}/{key}",
        provider.publisher, provider.name
    )
}

#[derive(Debug, Clone, Copy)]
pub struct ConfigRequest<'a> {
    pub schema: &'a BTreeMap<String, ConfigField>,
    pub overrides: &'a BTreeMap<String, String>,
    pub handler_id: &'a HandlerId,
    pub provider: &'a ProviderId,
    pub namespace: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub parameters: ParameterSet,
    /// One `--config key=value` per schema key, in schema order.
    pub redeploy_args: Vec<String>,
}

/// Resolves a value for every schema key. Keys are visited in sorted order
/// so prompts and parameters are stable between runs.
pub async fn resolve_config(
    request: ConfigRequest<'_>,
    prompter: &dyn Prompter,
    secrets: &dyn SecretStore,
) -> Result<ResolvedConfig, ConfigureError> {
    let mut resolved = ResolvedConfig::default();
    if !request.schema.is_empty() {
        info!("this provider requires configuration");
    }

    for (key, field) in request.schema {
        let param = parameter_name(key, field.secret);

        let value = match request.overrides.get(key) {
            Some(value) => value.clone(),
            None if field.secret => prompt_secret(&request, key, prompter, secrets).await?,
            None => {
                if !field.usage.is_empty() {
                    info!(key = %key, "{}", field.usage);
                }
                prompter.input(key)?
            }
        };

        if field.secret && !value.starts_with(SECRET_REF_PREFIX) {
            info!("setting CloudFormation parameter {param}");
        } else {
            info!("setting CloudFormation parameter {param}={value}");
        }
        resolved.redeploy_args.push(format!("--config {key}={value}"));
        resolved.parameters.insert(param, value);
    }

    Ok(resolved)
}

async fn prompt_secret(
    request: &ConfigRequest<'_>,
    key: &str,
    prompter: &dyn Prompter,
    secrets: &dyn SecretStore,
) -> Result<String, ConfigureError> {
    let path = secret_path(request.namespace, request.provider, request.handler_id, key);
    let help = format!("This will be stored in AWS SSM Parameter Store with name '{path}'");
    let secret = prompter.secret(key, Some(&help))?;

    secrets
        .put_secret(&path, &secret)
        .await
        .map_err(|source| ConfigureError::SecretStore {
            key: key.to_string(),
            path: path.clone(),
            source,
        })?;
    info!("added to AWS SSM Parameter Store with name '{path}'");
    Ok(format!("{SECRET_REF_PREFIX}{path}"))
}
