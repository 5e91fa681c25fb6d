//! Removal of an installed handler.
//!
//! Deletes the handler's stack, its target group and its control-plane
//! registration, in that order.
use crate::aws::{StackDescription, StackEngine, StackError};
use crate::controlplane::{ControlPlane, DeleteOutcome};
use crate::deploy::{DeployStatus, Deployer};
use crate::error::CfError;
use crate::handler_id::HandlerId;
use crate::install::{TAG_PROVIDER, TAG_TARGET_GROUP};
use crate::prompt::Prompter;
use tracing::{info, warn};

#[derive(Clone, Copy)]
pub struct UninstallServices<'a> {
    pub control_plane: &'a dyn ControlPlane,
    pub stacks: &'a dyn StackEngine,
    pub prompter: &'a dyn Prompter,
}

#[derive(Debug, Clone)]
pub struct UninstallRequest {
    pub handler_id: HandlerId,
    pub target_group_id: Option<String>,
    pub delete_stack: bool,
    /// Skip the confirmation prompt.
    pub confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallOutcome {
    pub target_group_id: String,
    /// `publisher/name@version` read from the stack tags, when available.
    pub provider: Option<String>,
    pub stack: Option<DeployStatus>,
    pub target_group: DeleteOutcome,
    pub handler: DeleteOutcome,
}

/// Target group for a handler: explicit id, then the stack tag, then the
/// `cf-handler-` naming convention.
pub fn target_group_for(
    handler_id: &HandlerId,
    explicit: Option<&str>,
    stack: Option<&StackDescription>,
) -> String {
    if let Some(id) = explicit {
        return id.to_string();
    }
    if let Some(id) = stack.and_then(|s| s.tags.get(TAG_TARGET_GROUP)) {
        return id.clone();
    }
    let guess = handler_id.conventional_target_group().to_string();
    warn!(
        handler = %handler_id,
        target_group = %guess,
        "no target group recorded for this handler, assuming the naming convention (use --target-group-id to override)"
    );
    guess
}

pub async fn uninstall(
    services: UninstallServices<'_>,
    request: UninstallRequest,
) -> Result<UninstallOutcome, CfError> {
    services.control_plane.list_handlers().await?;

    let handler_id = &request.handler_id;
    let stack = match services.stacks.describe_stacks(handler_id.as_str()).await {
        Ok(stacks) => stacks.into_iter().next(),
        Err(StackError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };

    let target_group_id =
        target_group_for(handler_id, request.target_group_id.as_deref(), stack.as_ref());
    let provider = stack.as_ref().and_then(|s| s.tags.get(TAG_PROVIDER).cloned());
    let remove_stack = request.delete_stack && stack.is_some();

    if !request.confirm {
        let mut summary = format!("Remove handler '{handler_id}' and target group '{target_group_id}'");
        if remove_stack {
            summary.push_str(&format!(" and delete CloudFormation stack '{handler_id}'"));
        }
        if !services.prompter.confirm(&format!("{summary}?"), false)? {
            return Err(CfError::Cancelled);
        }
    }

    let stack_status = if remove_stack {
        info!(stack = %handler_id, "deleting CloudFormation stack");
        Some(
            Deployer::new(services.stacks, services.prompter)
                .delete(handler_id.as_str())
                .await?,
        )
    } else {
        None
    };

    info!(target_group = %target_group_id, "deleting target group");
    let target_group = services
        .control_plane
        .delete_target_group(&target_group_id)
        .await?;
    if target_group == DeleteOutcome::NotFound {
        warn!(target_group = %target_group_id, "target group was already gone");
    }

    info!(handler = %handler_id, "deleting handler");
    let handler = services
        .control_plane
        .delete_handler(handler_id.as_str())
        .await?;
    if handler == DeleteOutcome::NotFound {
        warn!(handler = %handler_id, "handler was not registered");
    }

    info!(handler = %handler_id, "handler has been removed");
    if let Some(provider) = &provider {
        info!(
            "You can deploy this handler again by running:\ncf provider install -p {provider} --handler-id {handler_id} --target-group-id {target_group_id}"
        );
    }

    Ok(UninstallOutcome {
        target_group_id,
        provider,
        stack: stack_status,
        target_group,
        handler,
    })
}
