//! Handler identity.
//!
//! The handler id names the CloudFormation stack, the handler's IAM role and
//! the control-plane registration, so it has to satisfy all three.
use crate::aws::{AwsError, RoleDirectory};
use crate::prompt::{PromptError, Prompter};
use crate::registry::ProviderId;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::warn;

pub const HANDLER_PREFIX: &str = "cf-handler-";

static VALID_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,63}$").expect("handler id pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum HandlerIdError {
    #[error(
        "invalid handler id '{0}': must start with a letter and contain at most 64 letters, digits or hyphens"
    )]
    Invalid(String),

    #[error("checking for an existing role named '{id}': {source}")]
    Lookup {
        id: String,
        #[source]
        source: AwsError,
    },

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId(String);

impl HandlerId {
    /// `cf-handler-{publisher}-{name}`
    pub fn default_for(provider: &ProviderId) -> Result<Self, HandlerIdError> {
        format!("{HANDLER_PREFIX}{}-{}", provider.publisher, provider.name).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Target group id implied by the naming convention: the id without its
    /// `cf-handler-` prefix.
    pub fn conventional_target_group(&self) -> &str {
        self.0.strip_prefix(HANDLER_PREFIX).unwrap_or(&self.0)
    }
}

impl FromStr for HandlerId {
    type Err = HandlerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if VALID_ID.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(HandlerIdError::Invalid(s.to_string()))
        }
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HandlerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns `candidate` if no IAM role uses it yet, otherwise keeps asking
/// for another id until a free one is given.
pub async fn resolve_unique_handler_id(
    roles: &dyn RoleDirectory,
    prompter: &dyn Prompter,
    candidate: HandlerId,
) -> Result<HandlerId, HandlerIdError> {
    let mut candidate = candidate;
    loop {
        let exists = roles
            .role_exists(candidate.as_str())
            .await
            .map_err(|source| HandlerIdError::Lookup {
                id: candidate.to_string(),
                source,
            })?;
        if !exists {
            return Ok(candidate);
        }

        warn!(
            "A Lambda function named '{candidate}' already exists in the account. You will need to set a custom Handler ID. \
             By convention, we use 'cf-handler-[publisher]-[name]-[suffix]' as Handler IDs, for example: 'cf-handler-common-fate-aws-dev'."
        );
        candidate = loop {
            let raw = prompter.input("Unique Handler ID")?;
            match raw.parse::<HandlerId>() {
                Ok(id) => break id,
                Err(e) => warn!("{e}"),
            }
        };
    }
}
