use super::GlobalArgs;
use crate::{bootstrap::Bootstrapper, error::CfError};
use clap::Args;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct BootstrapArgs {
    /// Deploy without reviewing the change set
    #[arg(short = 'y', long)]
    pub confirm: bool,
}

/// Prints the asset bucket, deploying the bootstrap stack if it is missing.
pub async fn bootstrap(
    global: &GlobalArgs,
    args: BootstrapArgs,
    cancel: &CancellationToken,
) -> Result<(), CfError> {
    let aws = global.aws().await?;
    let stacks = aws.stacks();
    let prompter = global.prompter();

    let out = Bootstrapper::new(&stacks, prompter.as_ref(), cancel.clone())
        .get_or_deploy(args.confirm)
        .await?;
    println!("{}", out.assets_bucket);
    Ok(())
}
