mod common;

use cf::bootstrap::{BootstrapError, Bootstrapper, STACK_NAME};
use cf::deploy::DeployError;
use cf::prompt::{NonInteractive, PromptError};
use common::{ASSETS_BUCKET, MockStacks, ScriptedPrompter};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn existing_stack_is_not_redeployed() {
    let stacks = MockStacks::bootstrapped();
    let prompter = ScriptedPrompter::default();

    let out = Bootstrapper::new(&stacks, &prompter, CancellationToken::new())
        .get_or_deploy(false)
        .await
        .unwrap();

    assert_eq!(out.assets_bucket, ASSETS_BUCKET);
    assert_eq!(stacks.calls(), vec![format!("describe_stacks {STACK_NAME}")]);
    assert!(prompter.asked().is_empty());
}

#[tokio::test]
async fn missing_stack_is_deployed_then_detected() {
    let stacks = MockStacks::default();
    let prompter = ScriptedPrompter::default();

    let out = Bootstrapper::new(&stacks, &prompter, CancellationToken::new())
        .get_or_deploy(true)
        .await
        .unwrap();

    assert_eq!(out.assets_bucket, ASSETS_BUCKET);
    let calls = stacks.calls();
    assert_eq!(
        calls,
        vec![
            format!("describe_stacks {STACK_NAME}"),
            format!("create_change_set {STACK_NAME}"),
            format!("execute_change_set {STACK_NAME} cs-1"),
            format!("wait_for_settle {STACK_NAME}"),
            format!("describe_stacks {STACK_NAME}"),
        ]
    );
    let change_set = stacks.change_set_for(STACK_NAME).unwrap();
    assert!(change_set.template.contains("AssetsBucket"));
    assert!(change_set.parameters.is_empty());
}

#[tokio::test(start_paused = true)]
async fn redetection_waits_for_the_new_stack() {
    let stacks = MockStacks::default();
    // One miss for the initial lookup, three more after deploying.
    *stacks.hidden_describes.lock().unwrap() = 4;
    let prompter = ScriptedPrompter::default();

    let start = Instant::now();
    let out = Bootstrapper::new(&stacks, &prompter, CancellationToken::new())
        .get_or_deploy(true)
        .await
        .unwrap();

    assert_eq!(out.assets_bucket, ASSETS_BUCKET);
    let describes = stacks
        .calls()
        .iter()
        .filter(|c| c.starts_with("describe_stacks"))
        .count();
    assert_eq!(describes, 5);
    // Fibonacci backoff: 1s + 1s + 2s
    assert_eq!(start.elapsed(), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn redetection_gives_up_after_its_deadline() {
    let stacks = MockStacks::default();
    *stacks.hidden_describes.lock().unwrap() = usize::MAX;
    let prompter = ScriptedPrompter::default();

    let start = Instant::now();
    let err = Bootstrapper::new(&stacks, &prompter, CancellationToken::new())
        .get_or_deploy(true)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::NotDeployed));
    assert!(start.elapsed() <= Duration::from_secs(20));
}

#[tokio::test]
async fn declined_bootstrap_change_set_is_not_executed() {
    let stacks = MockStacks::default();
    let prompter = ScriptedPrompter::default().confirmations(&[false]);

    let err = Bootstrapper::new(&stacks, &prompter, CancellationToken::new())
        .get_or_deploy(false)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::Deploy(DeployError::Cancelled)));
    assert!(
        !stacks
            .calls()
            .iter()
            .any(|c| c.starts_with("execute_change_set"))
    );
}

#[tokio::test]
async fn detect_without_retry_reports_missing_stack() {
    let stacks = MockStacks::default();
    let prompter = ScriptedPrompter::default();

    let err = Bootstrapper::new(&stacks, &prompter, CancellationToken::new())
        .detect(false)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::NotDeployed));
    assert_eq!(stacks.calls().len(), 1);
}

#[tokio::test]
async fn non_interactive_run_does_not_execute_an_unreviewed_change_set() {
    let stacks = MockStacks::default();

    let err = Bootstrapper::new(&stacks, &NonInteractive, CancellationToken::new())
        .get_or_deploy(false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::Deploy(DeployError::Prompt(PromptError::NotInteractive(_)))
    ));
    assert!(
        !stacks
            .calls()
            .iter()
            .any(|c| c.starts_with("execute_change_set"))
    );
    assert!(stacks.stacks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn non_interactive_run_deploys_when_confirmed_up_front() {
    let stacks = MockStacks::default();

    let out = Bootstrapper::new(&stacks, &NonInteractive, CancellationToken::new())
        .get_or_deploy(true)
        .await
        .unwrap();

    assert_eq!(out.assets_bucket, ASSETS_BUCKET);
}

#[tokio::test]
async fn second_lookup_after_deploy_reuses_the_bucket() {
    let stacks = MockStacks::default();
    let prompter = ScriptedPrompter::default();
    let bootstrapper = Bootstrapper::new(&stacks, &prompter, CancellationToken::new());

    let first = bootstrapper.get_or_deploy(true).await.unwrap();
    let calls_after_deploy = stacks.calls().len();
    let second = bootstrapper.get_or_deploy(false).await.unwrap();

    assert_eq!(first.assets_bucket, ASSETS_BUCKET);
    assert_eq!(second.assets_bucket, first.assets_bucket);
    assert_eq!(stacks.change_sets.lock().unwrap().len(), 1);
    assert_eq!(
        stacks.calls()[calls_after_deploy..],
        [format!("describe_stacks {STACK_NAME}")]
    );
    assert!(prompter.asked().is_empty());
}
