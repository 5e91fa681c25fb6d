use crate::{
    aws::{AwsArgs, AwsContext},
    config::Config,
    controlplane::{ControlPlaneArgs, HttpControlPlane},
    error::CfError,
    logging::Logger,
    prompt::{NonInteractive, Prompter, TerminalPrompter},
    registry::{DEFAULT_REGISTRY_URL, HttpRegistry},
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use url::Url;

mod bootstrap;
mod context;
mod handler;
mod provider;
mod rules;
mod targetgroup;

pub use bootstrap::BootstrapArgs;
pub use context::ContextCommand;
pub use handler::HandlerCommand;
pub use provider::{InstallArgs, ProviderCommand, UninstallArgs};
pub use rules::RulesCommand;
pub use targetgroup::{RoutesCommand, TargetGroupCommand};

#[derive(Parser, Debug)]
#[command(name = "cf")]
#[command(version, about = "Install and manage Common Fate Access Providers", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bootstrap a cloud account for deploying access providers
    Bootstrap(BootstrapArgs),

    /// Install, remove and inspect Access Providers
    #[command(subcommand)]
    Provider(ProviderCommand),

    /// Manage target groups
    #[command(subcommand, name = "targetgroup")]
    TargetGroup(TargetGroupCommand),

    /// Manage handlers
    #[command(subcommand)]
    Handler(HandlerCommand),

    /// Inspect access rules
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Manage control plane contexts in the local config file
    #[command(subcommand)]
    Context(ContextCommand),
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    #[command(flatten)]
    pub logger: Logger,

    #[command(flatten, next_help_heading = "Control Plane")]
    pub control_plane: ControlPlaneArgs,

    #[command(flatten, next_help_heading = "AWS")]
    pub aws: AwsArgs,

    /// Provider registry API URL
    #[arg(long, env = "CF_REGISTRY_API_URL", default_value = DEFAULT_REGISTRY_URL, global = true)]
    pub registry_url: Url,

    /// Path to the CLI config file [default: $CF_CONFIG or ~/.cf/config]
    #[arg(long = "config-file", global = true)]
    pub config_file: Option<PathBuf>,

    /// Fail instead of prompting when input is required
    #[arg(long, env = "CF_NON_INTERACTIVE", global = true)]
    pub non_interactive: bool,
}

impl GlobalArgs {
    pub(crate) fn config_path(&self) -> Result<PathBuf, CfError> {
        match &self.config_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::default_path()?),
        }
    }

    /// The `--api-url` flag, falling back to the current context.
    pub fn api_url(&self) -> Result<Url, CfError> {
        if let Some(url) = &self.control_plane.api_url {
            return Ok(url.clone());
        }
        let config = Config::load(&self.config_path()?)?;
        let raw = &config.current()?.api_url;
        Url::parse(raw)
            .map_err(|e| CfError::Usage(format!("invalid api_url '{raw}' in config file: {e}")))
    }

    pub fn control_plane(&self) -> Result<HttpControlPlane, CfError> {
        let token = self.control_plane.token.clone().ok_or_else(|| {
            CfError::Usage("no API token configured; pass --api-token or set CF_API_TOKEN".into())
        })?;
        Ok(HttpControlPlane::new(self.api_url()?, token)?)
    }

    pub fn registry(&self) -> Result<HttpRegistry, CfError> {
        Ok(HttpRegistry::new(self.registry_url.clone())?)
    }

    pub async fn aws(&self) -> Result<AwsContext, CfError> {
        Ok(AwsContext::load(&self.aws).await?)
    }

    pub fn prompter(&self) -> Box<dyn Prompter> {
        if self.non_interactive {
            Box::new(NonInteractive)
        } else {
            Box::new(TerminalPrompter::new())
        }
    }
}

pub async fn run(cli: Cli, cancel: &CancellationToken) -> Result<(), CfError> {
    let global = &cli.global;
    match cli.cmd {
        Command::Bootstrap(args) => bootstrap::bootstrap(global, args, cancel).await,
        Command::Provider(cmd) => provider::run(global, cmd, cancel).await,
        Command::TargetGroup(cmd) => targetgroup::run(global, cmd).await,
        Command::Handler(cmd) => handler::run(global, cmd).await,
        Command::Rules(cmd) => rules::run(global, cmd).await,
        Command::Context(cmd) => context::run(global, cmd),
    }
}
