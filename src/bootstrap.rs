//! Per account and region asset bucket.
//!
//! The bucket lives in a fixed CloudFormation stack. It is created the first
//! time a provider is installed into an account/region and never touched
//! again by this tool.
use crate::aws::{StackDescription, StackEngine, StackError};
use crate::deploy::{DeployError, DeployRequest, Deployer, ParameterSet};
use crate::prompt::Prompter;
use crate::retry::{RetryError, RetryPolicy, retry};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const STACK_NAME: &str = "CommonFateProviderAssetsBootstrapStack";

const TEMPLATE: &str = include_str!("../assets/bootstrap.json");

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("the bootstrap stack {STACK_NAME} is not deployed in this account and region")]
    NotDeployed,

    #[error("expected 1 stack but got {0}")]
    Integrity(usize),

    #[error("decoding CloudFormation outputs: missing output '{0}'")]
    MissingOutput(&'static str),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("bootstrap detection cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutput {
    pub assets_bucket: String,
}

impl TryFrom<&StackDescription> for BootstrapOutput {
    type Error = BootstrapError;

    fn try_from(stack: &StackDescription) -> Result<Self, Self::Error> {
        let assets_bucket = stack
            .outputs
            .get("AssetsBucket")
            .filter(|v| !v.is_empty())
            .ok_or(BootstrapError::MissingOutput("AssetsBucket"))?;
        Ok(Self {
            assets_bucket: assets_bucket.clone(),
        })
    }
}

pub struct Bootstrapper<'a> {
    stacks: &'a dyn StackEngine,
    deployer: Deployer<'a>,
    cancel: CancellationToken,
    redetect: RetryPolicy,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(
        stacks: &'a dyn StackEngine,
        prompter: &'a dyn Prompter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stacks,
            deployer: Deployer::new(stacks, prompter),
            cancel,
            redetect: RetryPolicy::fibonacci(Duration::from_secs(1), Duration::from_secs(20)),
        }
    }

    /// Finds the deployed bootstrap stack.
    ///
    /// With `retry` the lookup is repeated while the stack is not yet
    /// visible, which covers the short window after a fresh deployment.
    pub async fn detect(&self, retry_missing: bool) -> Result<BootstrapOutput, BootstrapError> {
        let policy = if retry_missing {
            self.redetect
        } else {
            RetryPolicy::once()
        };

        let result = retry(
            &policy,
            &self.cancel,
            |e: &BootstrapError| matches!(e, BootstrapError::NotDeployed),
            || self.describe(),
        )
        .await;

        match result {
            Ok(out) => Ok(out),
            Err(RetryError::Cancelled) => Err(BootstrapError::Cancelled),
            Err(RetryError::Permanent(e)) | Err(RetryError::Exhausted { last: e, .. }) => Err(e),
        }
    }

    async fn describe(&self) -> Result<BootstrapOutput, BootstrapError> {
        let stacks = match self.stacks.describe_stacks(STACK_NAME).await {
            Ok(stacks) => stacks,
            Err(StackError::NotFound(_)) => return Err(BootstrapError::NotDeployed),
            Err(e) => return Err(e.into()),
        };
        match stacks.as_slice() {
            [stack] => BootstrapOutput::try_from(stack),
            other => Err(BootstrapError::Integrity(other.len())),
        }
    }

    /// Deploys the bundled bootstrap template.
    pub async fn deploy(&self, confirm: bool) -> Result<(), BootstrapError> {
        info!(stack = STACK_NAME, "deploying the provider asset bootstrap stack");
        let status = self
            .deployer
            .deploy(&DeployRequest {
                template: TEMPLATE.to_string(),
                parameters: ParameterSet::new(),
                tags: BTreeMap::new(),
                stack_name: STACK_NAME.to_string(),
                confirm,
            })
            .await?;
        debug!(%status, "bootstrap deployment finished");
        Ok(())
    }

    /// Returns the asset bucket, deploying the bootstrap stack first if needed.
    pub async fn get_or_deploy(&self, confirm: bool) -> Result<BootstrapOutput, BootstrapError> {
        match self.detect(false).await {
            Err(BootstrapError::NotDeployed) => {
                self.deploy(confirm).await?;
                self.detect(true).await
            }
            other => other,
        }
    }
}
