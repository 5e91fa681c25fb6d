use super::GlobalArgs;
use crate::{controlplane::ControlPlane, error::CfError};
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// List access rules
    #[command(alias = "ls")]
    List,
}

pub async fn run(global: &GlobalArgs, cmd: RulesCommand) -> Result<(), CfError> {
    let cp = global.control_plane()?;
    match cmd {
        RulesCommand::List => {
            println!("ID\tNAME");
            for rule in cp.list_access_rules().await? {
                println!("{}\t{}", rule.id, rule.name);
            }
            Ok(())
        }
    }
}
