use super::GlobalArgs;
use crate::{
    config::{Config, Context},
    error::CfError,
};
use clap::{Args, Subcommand};
use tracing::info;
use url::Url;

#[derive(Subcommand, Debug)]
pub enum ContextCommand {
    /// Add or replace a context and make it current
    Set(SetArgs),

    /// Print the current context
    Show,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    #[arg(long, default_value = "default")]
    pub name: String,

    /// Control plane API URL
    #[arg(long = "url")]
    pub api_url: Url,

    #[arg(long)]
    pub dashboard_url: Option<Url>,

    #[arg(long)]
    pub auth_url: Option<Url>,

    #[arg(long)]
    pub token_url: Option<Url>,

    #[arg(long)]
    pub client_id: Option<String>,
}

fn url_or_empty(url: Option<Url>) -> String {
    url.map(String::from).unwrap_or_default()
}

pub fn run(global: &GlobalArgs, cmd: ContextCommand) -> Result<(), CfError> {
    let path = global.config_path()?;
    let mut config = Config::load(&path)?;
    match cmd {
        ContextCommand::Set(args) => {
            config.set_context(
                args.name.clone(),
                Context {
                    api_url: args.api_url.into(),
                    dashboard_url: url_or_empty(args.dashboard_url),
                    auth_url: url_or_empty(args.auth_url),
                    token_url: url_or_empty(args.token_url),
                    client_id: args.client_id.unwrap_or_default(),
                },
            );
            config.save(&path)?;
            info!(context = %args.name, path = ?path, "context saved");
        }
        ContextCommand::Show => {
            let ctx = config.current()?;
            println!("context:   {}", config.current_context);
            println!("api_url:   {}", ctx.api_url);
            if !ctx.dashboard_url.is_empty() {
                println!("dashboard: {}", ctx.dashboard_url);
            }
        }
    }
    Ok(())
}
