//! Cloud capability interfaces.
//!
//! The install workflow only talks to AWS through the traits defined here.
//! Each trait has a single SDK-backed implementation in a submodule; tests
//! substitute in-memory ones.
use crate::deploy::ParameterSet;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use clap::Args;
use secrecy::SecretString;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub mod cloudformation;
pub mod iam;
pub mod s3;
pub mod ssm;

pub use cloudformation::CloudFormationEngine;
pub use iam::IamRoles;
pub use s3::S3ObjectStore;
pub use ssm::SsmSecretStore;

#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("{service} request failed: {message}")]
    Api {
        service: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error(
        "AWS credentials have expired; refresh them (for example with `aws sso login`) and retry"
    )]
    ExpiredToken,

    #[error("no AWS region is configured; pass --aws-region or set AWS_REGION")]
    NoRegion,

    #[error("the caller identity did not include an account id")]
    NoAccount,
}

impl AwsError {
    pub(crate) fn api<E>(service: &'static str, err: E) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        let code = err.code().map(str::to_string);
        if matches!(code.as_deref(), Some("ExpiredToken" | "ExpiredTokenException")) {
            return Self::ExpiredToken;
        }
        Self::Api {
            service,
            code,
            message: DisplayErrorContext(&err).to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// The stack does not exist (CloudFormation reports this as `ValidationError`).
    #[error("stack '{0}' does not exist")]
    NotFound(String),

    #[error("change set for stack '{stack}' failed: {reason}")]
    ChangeSetFailed { stack: String, reason: String },

    #[error("stack '{stack}' did not settle within {waited:?}")]
    SettleTimeout {
        stack: String,
        waited: std::time::Duration,
    },

    #[error("invalid CloudFormation request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Aws(#[from] AwsError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackDescription {
    pub name: String,
    pub status: String,
    pub outputs: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

/// Everything needed to create a change set.
#[derive(Debug, Clone, Copy)]
pub struct ChangeSetRequest<'a> {
    pub stack_name: &'a str,
    /// Either an `https://` template URL or an inline template body.
    pub template: &'a str,
    pub parameters: &'a ParameterSet,
    pub tags: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSetOutcome {
    Created { change_set: String },
    /// The submitted template and parameters match the deployed stack.
    NoChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    pub action: String,
    pub logical_id: String,
    pub resource_type: String,
    pub replacement: Option<String>,
}

impl fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} {} ({})",
            self.action, self.logical_id, self.resource_type
        )?;
        match self.replacement.as_deref() {
            Some("True") => write!(f, " [replacement]"),
            Some("Conditional") => write!(f, " [may require replacement]"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledStack {
    pub status: String,
    /// Failure reasons reported by stack events during the operation.
    pub messages: Vec<String>,
}

/// The infrastructure deployment engine.
#[async_trait]
pub trait StackEngine: Send + Sync {
    /// Describes stacks matching `name`. A missing stack is [`StackError::NotFound`].
    async fn describe_stacks(&self, name: &str) -> Result<Vec<StackDescription>, StackError>;

    async fn create_change_set(
        &self,
        request: ChangeSetRequest<'_>,
    ) -> Result<ChangeSetOutcome, StackError>;

    async fn describe_change_set(
        &self,
        stack_name: &str,
        change_set: &str,
    ) -> Result<Vec<ResourceChange>, StackError>;

    async fn execute_change_set(&self, stack_name: &str, change_set: &str)
    -> Result<(), StackError>;

    async fn delete_stack(&self, stack_name: &str) -> Result<(), StackError>;

    /// Blocks until the stack leaves every `*_IN_PROGRESS` state.
    async fn wait_for_settle(&self, stack_name: &str) -> Result<SettledStack, StackError>;
}

/// Lookup of compute lifecycle roles, used to detect handler id collisions.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn role_exists(&self, name: &str) -> Result<bool, AwsError>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Stores `value` at `path`, overwriting any previous value.
    async fn put_secret(&self, path: &str, value: &SecretString) -> Result<(), AwsError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Server-side copy. `source` is an already encoded `bucket/key`.
    async fn copy_object(&self, source: &str, bucket: &str, key: &str) -> Result<(), AwsError>;
}

#[async_trait]
pub trait CallerIdentity: Send + Sync {
    /// The account the current credentials belong to.
    async fn account_id(&self) -> Result<String, AwsError>;
}

#[derive(Args, Debug, Clone, Default)]
pub struct AwsArgs {
    /// AWS shared config profile to use
    #[arg(long = "aws-profile", env = "AWS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// AWS region to deploy into
    #[arg(long = "aws-region", env = "AWS_REGION", global = true)]
    pub region: Option<String>,
}

/// Loaded AWS configuration plus the clients built from it.
#[derive(Clone)]
pub struct AwsContext {
    config: SdkConfig,
    region: String,
}

impl AwsContext {
    pub async fn load(args: &AwsArgs) -> Result<Self, AwsError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &args.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &args.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let config = loader.load().await;
        let region = config
            .region()
            .map(|r| r.as_ref().to_string())
            .ok_or(AwsError::NoRegion)?;
        debug!(%region, profile = ?args.profile, "loaded AWS configuration");
        Ok(Self { config, region })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn stacks(&self) -> CloudFormationEngine {
        CloudFormationEngine::new(&self.config)
    }

    pub fn roles(&self) -> IamRoles {
        IamRoles::new(&self.config)
    }

    pub fn secrets(&self) -> SsmSecretStore {
        SsmSecretStore::new(&self.config)
    }

    pub fn objects(&self) -> S3ObjectStore {
        S3ObjectStore::new(&self.config)
    }
}

#[async_trait]
impl CallerIdentity for AwsContext {
    async fn account_id(&self) -> Result<String, AwsError> {
        let client = aws_sdk_sts::Client::new(&self.config);
        let identity = client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| AwsError::api("sts", e))?;
        identity
            .account()
            .map(str::to_string)
            .ok_or(AwsError::NoAccount)
    }
}
