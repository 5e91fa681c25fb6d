//! Change-set based stack deployment.
use crate::aws::{ChangeSetOutcome, ChangeSetRequest, SettledStack, StackEngine, StackError};
use crate::prompt::{PromptError, Prompter};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("user cancelled deployment")]
    Cancelled,
}

/// Stack parameters in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet(IndexMap<String, String>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing the value (but keeping the position) of an
    /// existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Template URL or inline body.
    pub template: String,
    pub parameters: ParameterSet,
    pub tags: BTreeMap<String, String>,
    pub stack_name: String,
    /// Skip the interactive review of the change set.
    pub confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStatus {
    /// The change set was empty, nothing was executed.
    Skipped,
    Settled { status: String, messages: Vec<String> },
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => f.write_str("DEPLOY_SKIPPED"),
            Self::Settled { status, .. } => f.write_str(status),
        }
    }
}

pub struct Deployer<'a> {
    stacks: &'a dyn StackEngine,
    prompter: &'a dyn Prompter,
}

impl<'a> Deployer<'a> {
    pub fn new(stacks: &'a dyn StackEngine, prompter: &'a dyn Prompter) -> Self {
        Self { stacks, prompter }
    }

    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployStatus, DeployError> {
        let outcome = self
            .stacks
            .create_change_set(ChangeSetRequest {
                stack_name: &request.stack_name,
                template: &request.template,
                parameters: &request.parameters,
                tags: &request.tags,
            })
            .await?;

        let change_set = match outcome {
            ChangeSetOutcome::NoChanges => {
                info!(
                    stack = %request.stack_name,
                    "skipped deployment (there are no changes in the change set)"
                );
                return Ok(DeployStatus::Skipped);
            }
            ChangeSetOutcome::Created { change_set } => change_set,
        };

        if !request.confirm {
            let changes = self
                .stacks
                .describe_change_set(&request.stack_name, &change_set)
                .await?;
            info!("the following CloudFormation changes will be made:");
            for change in &changes {
                eprintln!("  {change}");
            }
            if !self.prompter.confirm("Do you wish to continue?", true)? {
                return Err(DeployError::Cancelled);
            }
        }

        self.stacks
            .execute_change_set(&request.stack_name, &change_set)
            .await?;
        let settled = self.stacks.wait_for_settle(&request.stack_name).await?;
        Ok(report(&request.stack_name, settled))
    }

    pub async fn delete(&self, stack_name: &str) -> Result<DeployStatus, DeployError> {
        self.stacks.delete_stack(stack_name).await?;
        let settled = self.stacks.wait_for_settle(stack_name).await?;
        Ok(report(stack_name, settled))
    }
}

fn report(stack_name: &str, settled: SettledStack) -> DeployStatus {
    info!(stack = stack_name, status = %settled.status, "final stack status");
    for message in &settled.messages {
        warn!(stack = stack_name, "{message}");
    }
    DeployStatus::Settled {
        status: settled.status,
        messages: settled.messages,
    }
}
