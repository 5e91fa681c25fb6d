use super::GlobalArgs;
use crate::{
    controlplane::{
        ControlPlane, CreateOutcome, CreateTargetGroup, DeleteOutcome, LinkOutcome,
        TargetGroupLink, TargetRoute,
    },
    error::CfError,
    register::{DEFAULT_PRIORITY, RegisterError},
};
use clap::{Args, Subcommand};
use tracing::{info, warn};

#[derive(Subcommand, Debug)]
pub enum TargetGroupCommand {
    /// Create a target group
    Create(CreateArgs),

    /// Link a handler to a target group
    Link(LinkArgs),

    /// Unlink a deployment from a target group
    Unlink(UnlinkArgs),

    /// Delete a target group
    Delete(DeleteArgs),

    /// List target groups
    #[command(alias = "ls")]
    List,

    /// Inspect the routes of a target group
    #[command(subcommand)]
    Routes(RoutesCommand),
}

#[derive(Subcommand, Debug)]
pub enum RoutesCommand {
    /// List the handlers a target group routes to
    #[command(alias = "ls")]
    List(RoutesArgs),
}

#[derive(Args, Debug)]
pub struct RoutesArgs {
    /// Target group ID
    #[arg(long)]
    pub id: String,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub id: String,

    /// Target schema, as publisher/name@version/kind
    #[arg(long)]
    pub schema_from: String,

    /// Succeed if a target group with this ID already exists
    #[arg(long)]
    pub ok_if_exists: bool,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    #[arg(long)]
    pub target_group: String,

    /// Handler (deployment) ID
    #[arg(long)]
    pub handler: String,

    #[arg(long)]
    pub kind: String,

    #[arg(long, default_value_t = DEFAULT_PRIORITY)]
    pub priority: i32,
}

#[derive(Args, Debug)]
pub struct UnlinkArgs {
    #[arg(long)]
    pub target_group: String,

    #[arg(long)]
    pub deployment: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[arg(long)]
    pub id: String,
}

pub async fn run(global: &GlobalArgs, cmd: TargetGroupCommand) -> Result<(), CfError> {
    let cp = global.control_plane()?;
    match cmd {
        TargetGroupCommand::Create(args) => create(&cp, args).await,
        TargetGroupCommand::Link(args) => {
            let link = TargetGroupLink {
                deployment_id: args.handler.clone(),
                priority: args.priority,
                kind: args.kind.clone(),
            };
            match cp.link_target_group(&args.target_group, &link).await? {
                LinkOutcome::Linked => info!(
                    "successfully linked the handler '{}' with target group '{}' using kind: '{}'",
                    args.handler, args.target_group, args.kind
                ),
                LinkOutcome::AlreadyLinked => info!(
                    "handler '{}' is already linked with target group '{}'",
                    args.handler, args.target_group
                ),
            }
            Ok(())
        }
        TargetGroupCommand::Unlink(args) => {
            match cp
                .unlink_target_group(&args.target_group, &args.deployment)
                .await?
            {
                DeleteOutcome::Deleted => info!(
                    "unlinked deployment {} from group {}",
                    args.deployment, args.target_group
                ),
                DeleteOutcome::NotFound => warn!(
                    "deployment {} is not linked to group {}",
                    args.deployment, args.target_group
                ),
            }
            Ok(())
        }
        TargetGroupCommand::Delete(args) => {
            match cp.delete_target_group(&args.id).await? {
                DeleteOutcome::Deleted => info!("deleted target group {}", args.id),
                DeleteOutcome::NotFound => warn!("target group {} does not exist", args.id),
            }
            Ok(())
        }
        TargetGroupCommand::List => {
            for group in cp.list_target_groups().await? {
                println!("{}\t{}", group.id, group.from);
            }
            Ok(())
        }
        TargetGroupCommand::Routes(RoutesCommand::List(args)) => {
            let routes = cp.list_target_routes(&args.id).await?;
            print!("{}", routes_table(&routes));
            Ok(())
        }
    }
}

fn routes_table(routes: &[TargetRoute]) -> String {
    let mut out = String::from("TARGET GROUP ID\tHANDLER ID\tKIND\tPRIORITY\tVALID\tDIAGNOSTICS\n");
    for route in routes {
        let diagnostics: Vec<String> = route.diagnostics.iter().map(|d| d.to_string()).collect();
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            route.target_group_id,
            route.handler_id,
            route.kind,
            route.priority,
            route.valid,
            diagnostics.join("; ")
        ));
    }
    out
}

async fn create(cp: &dyn ControlPlane, args: CreateArgs) -> Result<(), CfError> {
    let outcome = cp
        .create_target_group(&CreateTargetGroup {
            id: args.id.clone(),
            target_schema: args.schema_from,
        })
        .await?;
    match outcome {
        CreateOutcome::Created => {
            info!("successfully created the targetgroup: {}", args.id);
            Ok(())
        }
        CreateOutcome::AlreadyExists if args.ok_if_exists => {
            info!("targetgroup with that ID already exists: '{}'", args.id);
            Ok(())
        }
        CreateOutcome::AlreadyExists => Err(RegisterError::TargetGroupExists(args.id).into()),
    }
}
