//! Control-plane registration of a deployed handler, followed by polling
//! until the control plane reports it healthy.
use crate::controlplane::{
    ControlPlane, ControlPlaneError, CreateOutcome, CreateTargetGroup, Diagnostic, HandlerDetail,
    LinkOutcome, RegisterHandler, TargetGroupLink,
};
use crate::handler_id::HandlerId;
use crate::retry::{RetryError, RetryPolicy, retry};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const LAMBDA_RUNTIME: &str = "aws-lambda";
pub const DEFAULT_PRIORITY: i32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(
        "Duplicate targetgroup ID provided. Targetgroup with that ID '{0}' already exist"
    )]
    TargetGroupExists(String),

    #[error("a handler with id '{0}' is already registered")]
    HandlerExists(String),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error("timed out after {waited:?} waiting for handler '{handler_id}' to become healthy: {last}")]
    HealthTimeout {
        handler_id: String,
        waited: Duration,
        last: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("registration cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub handler_id: HandlerId,
    pub target_group_id: String,
    /// `publisher/name@version/kind`
    pub target_schema: String,
    pub kind: String,
    pub aws_account: String,
    pub aws_region: String,
    /// Reuse a target group or handler that already exists.
    pub allow_existing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
        }
    }
}

pub async fn create_target_group(
    control_plane: &dyn ControlPlane,
    request: &RegistrationRequest,
) -> Result<(), RegisterError> {
    info!(
        target_group = %request.target_group_id,
        "creating a target group to route access requests to the handler"
    );
    let outcome = control_plane
        .create_target_group(&CreateTargetGroup {
            id: request.target_group_id.clone(),
            target_schema: request.target_schema.clone(),
        })
        .await?;
    match outcome {
        CreateOutcome::Created => {
            info!(target_group = %request.target_group_id, "target group created");
            Ok(())
        }
        CreateOutcome::AlreadyExists if request.allow_existing => {
            info!(target_group = %request.target_group_id, "target group already exists, reusing it");
            Ok(())
        }
        CreateOutcome::AlreadyExists => Err(RegisterError::TargetGroupExists(
            request.target_group_id.clone(),
        )),
    }
}

pub async fn register_handler(
    control_plane: &dyn ControlPlane,
    request: &RegistrationRequest,
) -> Result<(), RegisterError> {
    let outcome = control_plane
        .register_handler(&RegisterHandler {
            id: request.handler_id.to_string(),
            aws_account: request.aws_account.clone(),
            aws_region: request.aws_region.clone(),
            runtime: LAMBDA_RUNTIME.to_string(),
        })
        .await?;
    match outcome {
        CreateOutcome::Created => {
            info!(handler = %request.handler_id, "registered handler with Common Fate");
            Ok(())
        }
        CreateOutcome::AlreadyExists if request.allow_existing => {
            info!(handler = %request.handler_id, "handler is already registered");
            Ok(())
        }
        CreateOutcome::AlreadyExists => {
            Err(RegisterError::HandlerExists(request.handler_id.to_string()))
        }
    }
}

pub async fn link_target_group(
    control_plane: &dyn ControlPlane,
    request: &RegistrationRequest,
) -> Result<(), RegisterError> {
    let link = TargetGroupLink {
        deployment_id: request.handler_id.to_string(),
        priority: DEFAULT_PRIORITY,
        kind: request.kind.clone(),
    };
    match control_plane
        .link_target_group(&request.target_group_id, &link)
        .await?
    {
        LinkOutcome::Linked => info!(
            handler = %request.handler_id,
            target_group = %request.target_group_id,
            "linked handler with target group"
        ),
        LinkOutcome::AlreadyLinked => info!(
            handler = %request.handler_id,
            target_group = %request.target_group_id,
            "handler is already linked with target group"
        ),
    }
    Ok(())
}

enum HealthCheck {
    Unhealthy(Vec<Diagnostic>),
    Failed(ControlPlaneError),
}

/// Polls the handler until it reports healthy or the policy's timeout passes.
/// A timed out handler stays registered.
pub async fn wait_for_healthy(
    control_plane: &dyn ControlPlane,
    handler_id: &HandlerId,
    policy: &HealthPolicy,
    cancel: &CancellationToken,
) -> Result<HandlerDetail, RegisterError> {
    info!(handler = %handler_id, "waiting for handler to become healthy");
    let retry_policy = RetryPolicy::constant(policy.interval, policy.timeout);

    let result = retry(
        &retry_policy,
        cancel,
        |e: &HealthCheck| match e {
            HealthCheck::Unhealthy(_) => true,
            HealthCheck::Failed(e) => e.is_retryable(),
        },
        || async move {
            let handler = control_plane
                .get_handler(handler_id.as_str())
                .await
                .map_err(HealthCheck::Failed)?;
            if handler.healthy {
                return Ok(handler);
            }
            let diagnostics: Vec<String> =
                handler.diagnostics.iter().map(ToString::to_string).collect();
            warn!(handler = %handler_id, ?diagnostics, "handler is not healthy yet");
            Err(HealthCheck::Unhealthy(handler.diagnostics))
        },
    )
    .await;

    match result {
        Ok(handler) => {
            info!(handler = %handler_id, "handler is healthy");
            Ok(handler)
        }
        Err(RetryError::Cancelled) => Err(RegisterError::Cancelled),
        Err(RetryError::Permanent(HealthCheck::Failed(e))) => Err(e.into()),
        Err(RetryError::Permanent(HealthCheck::Unhealthy(diagnostics))) => {
            Err(timeout(handler_id, Duration::ZERO, "unhealthy".to_string(), diagnostics))
        }
        Err(RetryError::Exhausted { last, elapsed, .. }) => Err(match last {
            HealthCheck::Unhealthy(diagnostics) => {
                timeout(handler_id, elapsed, "handler reported unhealthy".to_string(), diagnostics)
            }
            HealthCheck::Failed(e) => timeout(handler_id, elapsed, e.to_string(), Vec::new()),
        }),
    }
}

fn timeout(
    handler_id: &HandlerId,
    waited: Duration,
    last: String,
    diagnostics: Vec<Diagnostic>,
) -> RegisterError {
    RegisterError::HealthTimeout {
        handler_id: handler_id.to_string(),
        waited,
        last,
        diagnostics,
    }
}

/// Target group, handler registration, link, then health polling.
pub async fn register_and_wait(
    control_plane: &dyn ControlPlane,
    request: &RegistrationRequest,
    policy: &HealthPolicy,
    cancel: &CancellationToken,
) -> Result<HandlerDetail, RegisterError> {
    create_target_group(control_plane, request).await?;
    register_handler(control_plane, request).await?;
    link_target_group(control_plane, request).await?;
    wait_for_healthy(control_plane, &request.handler_id, policy, cancel).await
}
