use super::GlobalArgs;
use crate::{
    aws::StackEngine,
    controlplane::{ControlPlane, DeleteOutcome, HandlerDetail},
    error::CfError,
};
use clap::{Args, Subcommand};
use tracing::{info, warn};

#[derive(Subcommand, Debug)]
pub enum HandlerCommand {
    /// List handlers
    #[command(alias = "ls")]
    List,

    /// Remove a handler registration
    Delete(DeleteArgs),

    /// Check a handler's stack and health
    Validate(ValidateArgs),

    /// List diagnostic logs for a handler
    Diagnostic(DiagnosticArgs),
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[arg(long)]
    pub handler_id: String,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Handler ID
    #[arg(long)]
    pub id: String,

    /// Also report the status of this CloudFormation stack
    #[arg(long)]
    pub cloudformation_stack_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct DiagnosticArgs {
    /// Handler ID
    #[arg(long)]
    pub id: String,
}

fn health(healthy: bool) -> &'static str {
    if healthy { "healthy" } else { "unhealthy" }
}

pub async fn run(global: &GlobalArgs, cmd: HandlerCommand) -> Result<(), CfError> {
    let cp = global.control_plane()?;
    match cmd {
        HandlerCommand::List => {
            for h in cp.list_handlers().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    h.id,
                    h.aws_account,
                    h.aws_region,
                    health(h.healthy)
                );
            }
            Ok(())
        }
        HandlerCommand::Delete(args) => {
            match cp.delete_handler(&args.handler_id).await? {
                DeleteOutcome::Deleted => info!("deleted handler {}", args.handler_id),
                DeleteOutcome::NotFound => warn!("handler {} is not registered", args.handler_id),
            }
            Ok(())
        }
        HandlerCommand::Validate(args) => {
            if let Some(stack_name) = &args.cloudformation_stack_name {
                let aws = global.aws().await?;
                let stacks = aws.stacks().describe_stacks(stack_name).await?;
                for stack in stacks {
                    info!(
                        "cloudformation stack '{}' exists in '{}' and is in '{}' state",
                        stack.name,
                        aws.region(),
                        stack.status
                    );
                }
            }

            let handler = cp.get_handler(&args.id).await?;
            println!(
                "{} {} {} {}",
                handler.id,
                handler.aws_account,
                handler.aws_region,
                health(handler.healthy)
            );
            if !handler.diagnostics.is_empty() {
                println!("Diagnostic Logs:");
                for diagnostic in &handler.diagnostics {
                    println!("  {diagnostic}");
                }
            }
            Ok(())
        }
        HandlerCommand::Diagnostic(args) => {
            let handler = cp.get_handler(&args.id).await?;
            print!("{}", diagnostic_report(&handler));
            Ok(())
        }
    }
}

fn diagnostic_report(handler: &HandlerDetail) -> String {
    let mut out = format!(
        "Diagnostic Logs:\n{} {} {} {}\nLEVEL\tMESSAGE\n",
        handler.id,
        handler.aws_account,
        handler.aws_region,
        health(handler.healthy)
    );
    for diagnostic in &handler.diagnostics {
        out.push_str(&format!("{}\t{}\n", diagnostic.level, diagnostic.message));
    }
    out
}
