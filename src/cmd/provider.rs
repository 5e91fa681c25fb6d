use super::GlobalArgs;
use crate::{
    configure::DEFAULT_NAMESPACE,
    error::CfError,
    handler_id::HandlerId,
    install::{self, InstallRequest, Services},
    register::HealthPolicy,
    registry::{ProviderId, Registry, group_versions},
    staging::stage_assets,
    uninstall::{self, UninstallRequest, UninstallServices},
};
use clap::{Args, Subcommand};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum ProviderCommand {
    /// Install an Access Provider into your AWS account
    Install(InstallArgs),

    /// Remove an installed Access Provider
    Uninstall(UninstallArgs),

    /// Copy a provider's assets into an existing bootstrap bucket
    Bootstrap(ProviderBootstrapArgs),

    /// List providers available in the registry
    #[command(alias = "ls")]
    List,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// The provider to install, as publisher/name@version
    #[arg(short = 'p', long)]
    pub provider: Option<String>,

    /// Handler ID; also used as the CloudFormation stack name [default: cf-handler-{publisher}-{name}]
    #[arg(long)]
    pub handler_id: Option<String>,

    /// Target group ID [default: the handler ID without its cf-handler- prefix]
    #[arg(long)]
    pub target_group_id: Option<String>,

    /// Reuse the target group and handler registration if they already exist
    #[arg(long)]
    pub allow_existing: bool,

    /// AWS account running Common Fate [default: the current AWS account]
    #[arg(long)]
    pub common_fate_account_id: Option<String>,

    /// Target kind to route to the handler, when the provider offers several
    #[arg(short = 't', long = "target")]
    pub target: Option<String>,

    /// Deploy the bootstrap stack without reviewing its change set
    #[arg(long)]
    pub confirm_bootstrap: bool,

    /// Provider configuration value; may be repeated
    #[arg(long = "config", value_name = "KEY=VALUE")]
    pub config: Vec<String>,

    /// Namespace secrets are stored under in SSM Parameter Store
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub secret_namespace: String,

    /// How long to wait for the handler to become healthy
    #[arg(long, value_parser = humantime::parse_duration, default_value = "2m")]
    pub health_timeout: Duration,

    /// Delay between handler health checks
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    pub health_interval: Duration,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// ID of the handler to remove
    #[arg(long)]
    pub handler_id: String,

    /// Target group to delete [default: read from the handler's stack]
    #[arg(long)]
    pub target_group_id: Option<String>,

    /// Delete the handler's CloudFormation stack
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_name = "BOOL"
    )]
    pub delete_cloudformation_stack: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub confirm: bool,
}

#[derive(Args, Debug)]
pub struct ProviderBootstrapArgs {
    /// The provider to stage, as publisher/name@version
    #[arg(long)]
    pub id: String,

    /// Existing bootstrap bucket to copy into
    #[arg(long)]
    pub bootstrap_bucket: String,
}

pub async fn run(
    global: &GlobalArgs,
    cmd: ProviderCommand,
    cancel: &CancellationToken,
) -> Result<(), CfError> {
    match cmd {
        ProviderCommand::Install(args) => install(global, args, cancel).await,
        ProviderCommand::Uninstall(args) => uninstall(global, args).await,
        ProviderCommand::Bootstrap(args) => stage(global, args).await,
        ProviderCommand::List => list(global).await,
    }
}

async fn install(
    global: &GlobalArgs,
    args: InstallArgs,
    cancel: &CancellationToken,
) -> Result<(), CfError> {
    let registry = global.registry()?;
    let control_plane = global.control_plane()?;
    let aws = global.aws().await?;
    let (stacks, roles, secrets, objects) =
        (aws.stacks(), aws.roles(), aws.secrets(), aws.objects());
    let prompter = global.prompter();

    let services = Services {
        registry: &registry,
        control_plane: &control_plane,
        identity: &aws,
        stacks: &stacks,
        roles: &roles,
        secrets: &secrets,
        objects: &objects,
        prompter: prompter.as_ref(),
    };
    let request = InstallRequest {
        provider: args.provider,
        handler_id: args.handler_id,
        target_group_id: args.target_group_id,
        allow_existing: args.allow_existing,
        common_fate_account_id: args.common_fate_account_id,
        target_kind: args.target,
        confirm_bootstrap: args.confirm_bootstrap,
        config: args.config,
        region: aws.region().to_string(),
        namespace: args.secret_namespace,
        health: HealthPolicy {
            interval: args.health_interval,
            timeout: args.health_timeout,
        },
    };

    let outcome = install::install(services, request, cancel).await?;
    info!(
        provider = %outcome.provider,
        handler = %outcome.handler_id,
        target_group = %outcome.target_group_id,
        "provider installed"
    );
    Ok(())
}

async fn uninstall(global: &GlobalArgs, args: UninstallArgs) -> Result<(), CfError> {
    let handler_id: HandlerId = args.handler_id.parse()?;
    let control_plane = global.control_plane()?;
    let aws = global.aws().await?;
    let stacks = aws.stacks();
    let prompter = global.prompter();

    uninstall::uninstall(
        UninstallServices {
            control_plane: &control_plane,
            stacks: &stacks,
            prompter: prompter.as_ref(),
        },
        UninstallRequest {
            handler_id,
            target_group_id: args.target_group_id,
            delete_stack: args.delete_cloudformation_stack,
            confirm: args.confirm,
        },
    )
    .await?;
    Ok(())
}

async fn stage(global: &GlobalArgs, args: ProviderBootstrapArgs) -> Result<(), CfError> {
    let id: ProviderId = args.id.parse()?;
    let registry = global.registry()?;
    let aws = global.aws().await?;

    let provider = registry.get_provider(&id).await?;
    let staged = stage_assets(&aws.objects(), &args.bootstrap_bucket, aws.region(), &provider).await?;
    println!("{}", staged.template_url);
    Ok(())
}

async fn list(global: &GlobalArgs) -> Result<(), CfError> {
    let registry = global.registry()?;
    let groups = group_versions(registry.list_providers().await?);
    for (family, releases) in groups {
        let versions: Vec<&str> = releases.iter().map(|p| p.id.version.as_str()).collect();
        println!("{family}\t{}", versions.join(", "));
    }
    Ok(())
}
