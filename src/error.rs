use crate::{
    aws::{AwsError, StackError},
    bootstrap::BootstrapError,
    config::ConfigError,
    configure::ConfigureError,
    controlplane::ControlPlaneError,
    deploy::DeployError,
    handler_id::HandlerIdError,
    logging::LoggingError,
    prompt::PromptError,
    register::RegisterError,
    registry::RegistryError,
    staging::StagingError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CfError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error(transparent)]
    Aws(#[from] AwsError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    HandlerId(#[from] HandlerIdError),

    #[error(transparent)]
    Configure(#[from] ConfigureError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl std::process::Termination for CfError {
    fn report(self) -> std::process::ExitCode {
        tracing::error!(exit_code = 1, "{}", self);
        std::process::ExitCode::FAILURE
    }
}
