use super::{
    AwsError, ChangeSetOutcome, ChangeSetRequest, ResourceChange, SettledStack, StackDescription,
    StackEngine, StackError,
};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use aws_sdk_cloudformation::types::{Capability, ChangeSetType, Parameter, Stack, Tag};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, info};

const NO_CHANGES_REASONS: [&str; 2] = [
    "didn't contain changes",
    "No updates are to be performed",
];

const CHANGE_SET_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, PartialEq, Eq)]
enum ChangeSetState {
    Ready,
    Empty,
    Failed(String),
    Pending,
    Missing,
}

fn change_set_state(status: Option<&str>, reason: Option<&str>) -> ChangeSetState {
    match status {
        None | Some("") => ChangeSetState::Missing,
        Some("CREATE_COMPLETE") => ChangeSetState::Ready,
        Some("FAILED") => {
            let reason = reason.unwrap_or_default();
            if NO_CHANGES_REASONS.iter().any(|r| reason.contains(r)) {
                ChangeSetState::Empty
            } else {
                ChangeSetState::Failed(reason.to_string())
            }
        }
        Some(_) => ChangeSetState::Pending,
    }
}

/// CloudFormation driven through change sets.
pub struct CloudFormationEngine {
    client: Client,
    poll_interval: Duration,
    settle_timeout: Duration,
}

impl CloudFormationEngine {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
            poll_interval: Duration::from_secs(5),
            settle_timeout: Duration::from_secs(60 * 60),
        }
    }

    async fn stack_exists(&self, name: &str) -> Result<bool, StackError> {
        match self.describe_stacks(name).await {
            Ok(stacks) => Ok(stacks
                .iter()
                .any(|s| s.status != "REVIEW_IN_PROGRESS")),
            Err(StackError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Polls until the change set has been computed.
    async fn await_change_set(
        &self,
        stack_name: &str,
        change_set: &str,
    ) -> Result<ChangeSetOutcome, StackError> {
        let started = Instant::now();
        loop {
            let out = self
                .client
                .describe_change_set()
                .stack_name(stack_name)
                .change_set_name(change_set)
                .send()
                .await
                .map_err(|e| AwsError::api("cloudformation", e))?;

            let status = out.status().map(|s| s.as_str());
            match change_set_state(status, out.status_reason()) {
                ChangeSetState::Ready => {
                    return Ok(ChangeSetOutcome::Created {
                        change_set: change_set.to_string(),
                    });
                }
                ChangeSetState::Empty => {
                    self.discard_change_set(stack_name, change_set).await;
                    return Ok(ChangeSetOutcome::NoChanges);
                }
                ChangeSetState::Failed(reason) => {
                    return Err(StackError::ChangeSetFailed {
                        stack: stack_name.to_string(),
                        reason,
                    });
                }
                ChangeSetState::Missing => {
                    return Err(StackError::NotFound(format!("{stack_name}/{change_set}")));
                }
                ChangeSetState::Pending => {
                    if started.elapsed() >= self.settle_timeout {
                        return Err(StackError::SettleTimeout {
                            stack: stack_name.to_string(),
                            waited: started.elapsed(),
                        });
                    }
                    debug!(stack = stack_name, status = ?status, "waiting for change set");
                    tokio::time::sleep(CHANGE_SET_POLL).await;
                }
            }
        }
    }

    async fn discard_change_set(&self, stack_name: &str, change_set: &str) {
        if let Err(e) = self
            .client
            .delete_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set)
            .send()
            .await
        {
            debug!(error = %AwsError::api("cloudformation", e), "failed to delete empty change set");
        }
    }

    async fn failure_reasons(&self, stack_name: &str, since_secs: i64) -> Vec<String> {
        let events = match self
            .client
            .describe_stack_events()
            .stack_name(stack_name)
            .send()
            .await
        {
            Ok(out) => out,
            Err(e) => {
                debug!(error = %AwsError::api("cloudformation", e), "failed to read stack events");
                return Vec::new();
            }
        };

        let mut messages: Vec<String> = events
            .stack_events()
            .iter()
            .filter(|e| e.timestamp().is_some_and(|t| t.secs() >= since_secs))
            .filter(|e| {
                e.resource_status()
                    .is_some_and(|s| s.as_str().ends_with("_FAILED"))
            })
            .filter_map(|e| {
                let reason = e.resource_status_reason()?;
                Some(format!(
                    "{}: {}",
                    e.logical_resource_id().unwrap_or("unknown"),
                    reason
                ))
            })
            .collect();
        // events are newest first
        messages.reverse();
        messages
    }
}

fn to_description(stack: &Stack) -> StackDescription {
    StackDescription {
        name: stack.stack_name().unwrap_or_default().to_string(),
        status: stack
            .stack_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        outputs: stack
            .outputs()
            .iter()
            .filter_map(|o| Some((o.output_key()?.to_string(), o.output_value()?.to_string())))
            .collect(),
        tags: stack
            .tags()
            .iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
            .collect(),
    }
}

#[async_trait]
impl StackEngine for CloudFormationEngine {
    async fn describe_stacks(&self, name: &str) -> Result<Vec<StackDescription>, StackError> {
        match self.client.describe_stacks().stack_name(name).send().await {
            Ok(out) if out.stacks().is_empty() => Err(StackError::NotFound(name.to_string())),
            Ok(out) => Ok(out.stacks().iter().map(to_description).collect()),
            Err(e) if e.code() == Some("ValidationError") => {
                Err(StackError::NotFound(name.to_string()))
            }
            Err(e) => Err(AwsError::api("cloudformation", e).into()),
        }
    }

    async fn create_change_set(
        &self,
        request: ChangeSetRequest<'_>,
    ) -> Result<ChangeSetOutcome, StackError> {
        let change_set_type = if self.stack_exists(request.stack_name).await? {
            ChangeSetType::Update
        } else {
            ChangeSetType::Create
        };

        let parameters = request
            .parameters
            .iter()
            .map(|(key, value)| {
                Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build()
            })
            .collect();
        let tags = request
            .tags
            .iter()
            .map(|(key, value)| {
                Tag::builder()
                    .key(key)
                    .value(value)
                    .build()
            })
            .collect::<Vec<_>>();

        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let change_set_name = format!("cf-cli-{seconds}");

        let mut builder = self
            .client
            .create_change_set()
            .stack_name(request.stack_name)
            .change_set_name(&change_set_name)
            .change_set_type(change_set_type.clone())
            .set_parameters(Some(parameters))
            .set_tags(Some(tags))
            .capabilities(Capability::CapabilityIam)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityAutoExpand);
        builder = if request.template.starts_with("https://") {
            builder.template_url(request.template)
        } else {
            builder.template_body(request.template)
        };

        info!(
            stack = request.stack_name,
            kind = change_set_type.as_str(),
            "creating CloudFormation change set"
        );
        let out = builder
            .send()
            .await
            .map_err(|e| AwsError::api("cloudformation", e))?;
        let change_set = out.id().unwrap_or(&change_set_name).to_string();

        self.await_change_set(request.stack_name, &change_set).await
    }

    async fn describe_change_set(
        &self,
        stack_name: &str,
        change_set: &str,
    ) -> Result<Vec<ResourceChange>, StackError> {
        let out = self
            .client
            .describe_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set)
            .send()
            .await
            .map_err(|e| AwsError::api("cloudformation", e))?;

        Ok(out
            .changes()
            .iter()
            .filter_map(|c| c.resource_change())
            .map(|rc| ResourceChange {
                action: rc
                    .action()
                    .map(|a| a.as_str().to_string())
                    .unwrap_or_default(),
                logical_id: rc.logical_resource_id().unwrap_or_default().to_string(),
                resource_type: rc.resource_type().unwrap_or_default().to_string(),
                replacement: rc.replacement().map(|r| r.as_str().to_string()),
            })
            .collect())
    }

    async fn execute_change_set(
        &self,
        stack_name: &str,
        change_set: &str,
    ) -> Result<(), StackError> {
        self.client
            .execute_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set)
            .send()
            .await
            .map_err(|e| AwsError::api("cloudformation", e))?;
        Ok(())
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<(), StackError> {
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| AwsError::api("cloudformation", e))?;
        Ok(())
    }

    async fn wait_for_settle(&self, stack_name: &str) -> Result<SettledStack, StackError> {
        let started = Instant::now();
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        loop {
            let status = match self.describe_stacks(stack_name).await {
                Ok(stacks) => stacks
                    .into_iter()
                    .next()
                    .map(|s| s.status)
                    .unwrap_or_default(),
                // a deleted stack disappears once deletion finishes
                Err(StackError::NotFound(_)) => "DELETE_COMPLETE".to_string(),
                Err(e) => return Err(e),
            };

            if !status.ends_with("_IN_PROGRESS") {
                let messages = if status == "DELETE_COMPLETE" {
                    Vec::new()
                } else {
                    self.failure_reasons(stack_name, since).await
                };
                return Ok(SettledStack { status, messages });
            }

            if started.elapsed() >= self.settle_timeout {
                return Err(StackError::SettleTimeout {
                    stack: stack_name.to_string(),
                    waited: started.elapsed(),
                });
            }
            debug!(stack = stack_name, %status, "waiting for stack to settle");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_set_states() {
        assert_eq!(
            change_set_state(Some("CREATE_COMPLETE"), None),
            ChangeSetState::Ready
        );
        assert_eq!(
            change_set_state(Some("CREATE_PENDING"), None),
            ChangeSetState::Pending
        );
        assert_eq!(
            change_set_state(
                Some("FAILED"),
                Some("The submitted information didn't contain changes.")
            ),
            ChangeSetState::Empty
        );
        assert_eq!(
            change_set_state(Some("FAILED"), Some("Template format error")),
            ChangeSetState::Failed("Template format error".into())
        );
    }

    #[test]
    fn change_set_without_a_status_is_missing() {
        assert_eq!(change_set_state(None, None), ChangeSetState::Missing);
        assert_eq!(change_set_state(Some(""), None), ChangeSetState::Missing);
    }
}
