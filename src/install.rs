//! The provider installation workflow.
//!
//! Stages run strictly in sequence and any failure aborts the run. Nothing
//! completed by an earlier stage is rolled back.
use crate::aws::{CallerIdentity, ObjectStore, RoleDirectory, SecretStore, StackEngine};
use crate::bootstrap::Bootstrapper;
use crate::configure::{ConfigRequest, parse_overrides, resolve_config};
use crate::controlplane::{ControlPlane, HandlerDetail};
use crate::deploy::{DeployRequest, DeployStatus, Deployer};
use crate::error::CfError;
use crate::handler_id::{HandlerId, resolve_unique_handler_id};
use crate::prompt::Prompter;
use crate::register::{self, HealthPolicy, RegisterError, RegistrationRequest};
use crate::registry::{ProviderId, Registry, resolve_provider, select_target_kind};
use crate::staging::stage_assets;
use std::collections::BTreeMap;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const TAG_TARGET_GROUP: &str = "cf:target-group-id";
pub const TAG_PROVIDER: &str = "cf:provider";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ProviderResolved,
    Bootstrapped,
    AssetsStaged,
    ConfigResolved,
    Deployed,
    Registered,
    Linked,
    Healthy,
    TimedOut,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::ProviderResolved => "provider-resolved",
            Stage::Bootstrapped => "bootstrapped",
            Stage::AssetsStaged => "assets-staged",
            Stage::ConfigResolved => "config-resolved",
            Stage::Deployed => "deployed",
            Stage::Registered => "registered",
            Stage::Linked => "linked",
            Stage::Healthy => "healthy",
            Stage::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// The remote systems the workflow talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub registry: &'a dyn Registry,
    pub control_plane: &'a dyn ControlPlane,
    pub identity: &'a dyn CallerIdentity,
    pub stacks: &'a dyn StackEngine,
    pub roles: &'a dyn RoleDirectory,
    pub secrets: &'a dyn SecretStore,
    pub objects: &'a dyn ObjectStore,
    pub prompter: &'a dyn Prompter,
}

#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// `publisher/name@version`; prompted for when absent.
    pub provider: Option<String>,
    pub handler_id: Option<String>,
    pub target_group_id: Option<String>,
    /// Reuse a target group or handler registration that already exists.
    pub allow_existing: bool,
    /// Defaults to the account of the current AWS credentials.
    pub common_fate_account_id: Option<String>,
    pub target_kind: Option<String>,
    pub confirm_bootstrap: bool,
    /// Raw `key=value` configuration overrides.
    pub config: Vec<String>,
    pub region: String,
    pub namespace: String,
    pub health: HealthPolicy,
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub provider: ProviderId,
    pub handler_id: HandlerId,
    pub target_group_id: String,
    pub kind: String,
    pub deploy_status: DeployStatus,
    pub handler: HandlerDetail,
    pub redeploy_command: String,
    /// Every stage reached, in order.
    pub stages: Vec<Stage>,
}

struct Progress {
    stages: Vec<Stage>,
}

impl Progress {
    fn new() -> Self {
        info!(stage = %Stage::Start, "starting provider installation");
        Self {
            stages: vec![Stage::Start],
        }
    }

    fn advance(&mut self, stage: Stage) {
        info!(stage = %stage, "install stage reached");
        self.stages.push(stage);
    }
}

pub async fn install(
    services: Services<'_>,
    request: InstallRequest,
    cancel: &CancellationToken,
) -> Result<InstallOutcome, CfError> {
    let overrides = parse_overrides(&request.config)?;
    let mut progress = Progress::new();

    // Fail early on an expired token or a non-admin user.
    services.control_plane.list_handlers().await?;
    // Likewise for expired AWS credentials.
    let aws_account = services.identity.account_id().await?;

    let cf_account_id = match request.common_fate_account_id.clone() {
        Some(id) => id,
        None => {
            warn!(
                "using the current AWS account ({aws_account}) as the Common Fate account (use --common-fate-account-id to override)"
            );
            aws_account.clone()
        }
    };

    let provider = resolve_provider(
        services.registry,
        request.provider.as_deref(),
        services.prompter,
    )
    .await?;
    progress.advance(Stage::ProviderResolved);

    let bootstrap = Bootstrapper::new(services.stacks, services.prompter, cancel.clone())
        .get_or_deploy(request.confirm_bootstrap)
        .await?;
    progress.advance(Stage::Bootstrapped);

    let kind = select_target_kind(&provider, request.target_kind.as_deref(), services.prompter)?;

    let staged = stage_assets(
        services.objects,
        &bootstrap.assets_bucket,
        &request.region,
        &provider,
    )
    .await?;
    progress.advance(Stage::AssetsStaged);

    let candidate = match request.handler_id.as_deref() {
        Some(id) => id.parse::<HandlerId>()?,
        None => HandlerId::default_for(&provider.id)?,
    };
    let handler_id =
        resolve_unique_handler_id(services.roles, services.prompter, candidate).await?;

    let resolved = resolve_config(
        ConfigRequest {
            schema: &provider.config_schema,
            overrides: &overrides,
            handler_id: &handler_id,
            provider: &provider.id,
            namespace: &request.namespace,
        },
        services.prompter,
        services.secrets,
    )
    .await?;
    progress.advance(Stage::ConfigResolved);

    let mut parameters = resolved.parameters;
    parameters.insert("CommonFateAWSAccountID", cf_account_id.as_str());
    parameters.insert("AssetPath", staged.handler_key.as_str());
    parameters.insert("BootstrapBucketName", bootstrap.assets_bucket.as_str());
    parameters.insert("HandlerID", handler_id.as_str());

    let target_group_id = request
        .target_group_id
        .clone()
        .unwrap_or_else(|| handler_id.conventional_target_group().to_string());

    let redeploy_command = redeploy_command(
        &cf_account_id,
        &handler_id,
        &target_group_id,
        &provider.id,
        (provider.target_kinds.len() > 1).then_some(kind.as_str()),
        &resolved.redeploy_args,
    );
    info!(
        "You can use the following one-liner command to redeploy this Provider in future:\n{redeploy_command}"
    );

    info!(handler = %handler_id, "deploying CloudFormation stack for handler");
    let tags = BTreeMap::from([
        (TAG_TARGET_GROUP.to_string(), target_group_id.clone()),
        (TAG_PROVIDER.to_string(), provider.id.to_string()),
    ]);
    let deploy_status = Deployer::new(services.stacks, services.prompter)
        .deploy(&DeployRequest {
            template: staged.template_url.clone(),
            parameters,
            tags,
            stack_name: handler_id.to_string(),
            confirm: true,
        })
        .await?;
    info!(status = %deploy_status, "deployment completed");
    progress.advance(Stage::Deployed);

    let registration = RegistrationRequest {
        handler_id: handler_id.clone(),
        target_group_id: target_group_id.clone(),
        target_schema: format!("{}/{kind}", provider.id),
        kind: kind.clone(),
        aws_account,
        aws_region: request.region.clone(),
        allow_existing: request.allow_existing,
    };
    register::create_target_group(services.control_plane, &registration).await?;
    register::register_handler(services.control_plane, &registration).await?;
    progress.advance(Stage::Registered);

    register::link_target_group(services.control_plane, &registration).await?;
    progress.advance(Stage::Linked);

    let handler = match register::wait_for_healthy(
        services.control_plane,
        &handler_id,
        &request.health,
        cancel,
    )
    .await
    {
        Ok(handler) => handler,
        Err(e @ RegisterError::HealthTimeout { .. }) => {
            progress.advance(Stage::TimedOut);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    progress.advance(Stage::Healthy);

    Ok(InstallOutcome {
        provider: provider.id,
        handler_id,
        target_group_id,
        kind,
        deploy_status,
        handler,
        redeploy_command,
        stages: progress.stages,
    })
}

/// The non-interactive command line that reproduces an install.
pub fn redeploy_command(
    cf_account_id: &str,
    handler_id: &HandlerId,
    target_group_id: &str,
    provider: &ProviderId,
    kind: Option<&str>,
    config_args: &[String],
) -> String {
    let mut command = format!(
        "cf provider install --common-fate-account-id {cf_account_id} --handler-id {handler_id} --target-group-id {target_group_id} --provider {provider}"
    );
    if let Some(kind) = kind {
        command.push_str(&format!(" --target {kind}"));
    }
    for arg in config_args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}
