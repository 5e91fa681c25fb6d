use clap::Parser;
use cf::cmd::{self, Cli};
use cf::error::CfError;
use cf::signal;
use std::process::{ExitCode, Termination};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = cli.global.logger.init() {
        eprintln!("{e}");
    }

    let cancel = signal::cancel_on_shutdown();
    let result = tokio::select! {
        res = cmd::run(cli, &cancel) => res,
        _ = cancel.cancelled() => Err(CfError::Cancelled),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => e.report(),
    }
}
