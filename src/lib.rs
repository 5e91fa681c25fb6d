//! # cf
//!
//! `cf` installs Common Fate Access Provider handlers into an AWS account.
//! An install bootstraps a per-region asset bucket, stages the provider's
//! handler package and template into it, resolves configuration and secrets,
//! deploys a CloudFormation stack through a reviewed change set and finally
//! registers the handler with the control plane and waits for it to report
//! healthy.
//!
//! Every external system sits behind a trait (`aws::StackEngine`,
//! `controlplane::ControlPlane`, `registry::Registry`, `prompt::Prompter`, ...)
//! so the workflow in [`install`] can be driven against in-memory fakes.
pub mod aws;
pub mod bootstrap;
pub mod cmd;
pub mod config;
pub mod configure;
pub mod controlplane;
pub mod deploy;
pub mod error;
pub mod handler_id;
pub mod install;
pub mod logging;
pub mod prompt;
pub mod register;
pub mod registry;
pub mod retry;
pub mod signal;
pub mod staging;
pub mod uninstall;
pub mod write;
