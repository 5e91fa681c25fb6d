mod common;

use cf::handler_id::{HandlerId, HandlerIdError, resolve_unique_handler_id};
use cf::prompt::PromptError;
use common::{MockRoles, ScriptedPrompter, okta_provider};

#[tokio::test]
async fn unused_default_is_accepted() {
    let roles = MockRoles::default();
    let prompter = ScriptedPrompter::default();
    let candidate = HandlerId::default_for(&okta_provider().id).unwrap();

    let id = resolve_unique_handler_id(&roles, &prompter, candidate)
        .await
        .unwrap();

    assert_eq!(id.as_str(), "cf-handler-common-fate-okta");
    assert_eq!(roles.lookups(), vec!["cf-handler-common-fate-okta".to_string()]);
    assert!(prompter.asked().is_empty());
}

#[tokio::test]
async fn collision_prompts_until_a_free_id_is_given() {
    let roles = MockRoles::taken(&["cf-handler-common-fate-okta", "cf-handler-common-fate-okta-dev"]);
    let prompter = ScriptedPrompter::default().inputs(&[
        "cf-handler-common-fate-okta-dev",
        "not_valid!",
        "cf-handler-common-fate-okta-prod",
    ]);
    let candidate = HandlerId::default_for(&okta_provider().id).unwrap();

    let id = resolve_unique_handler_id(&roles, &prompter, candidate)
        .await
        .unwrap();

    assert_eq!(id.as_str(), "cf-handler-common-fate-okta-prod");
    // The invalid answer is re-prompted without a lookup.
    assert_eq!(
        roles.lookups(),
        vec![
            "cf-handler-common-fate-okta".to_string(),
            "cf-handler-common-fate-okta-dev".to_string(),
            "cf-handler-common-fate-okta-prod".to_string(),
        ]
    );
    assert_eq!(prompter.asked().len(), 3);
}

#[tokio::test]
async fn collision_without_input_fails() {
    let roles = MockRoles::taken(&["cf-handler-common-fate-okta"]);
    let prompter = ScriptedPrompter::default();
    let candidate = HandlerId::default_for(&okta_provider().id).unwrap();

    let err = resolve_unique_handler_id(&roles, &prompter, candidate)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HandlerIdError::Prompt(PromptError::NotInteractive(_))
    ));
}
