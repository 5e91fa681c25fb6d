#![allow(dead_code)]

use async_trait::async_trait;
use cf::aws::{
    AwsError, CallerIdentity, ChangeSetOutcome, ChangeSetRequest, ObjectStore, ResourceChange,
    RoleDirectory, SecretStore, SettledStack, StackDescription, StackEngine, StackError,
};
use cf::bootstrap::STACK_NAME as BOOTSTRAP_STACK;
use cf::controlplane::{
    AccessRule, ControlPlane, ControlPlaneError, CreateOutcome, CreateTargetGroup, DeleteOutcome,
    Diagnostic, HandlerDetail, LinkOutcome, RegisterHandler, TargetGroup, TargetGroupLink,
    TargetRoute,
};
use cf::deploy::ParameterSet;
use cf::prompt::{PromptError, Prompter};
use cf::registry::{ConfigField, ProviderDescriptor, ProviderId, Registry, RegistryError};
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

pub const ACCOUNT: &str = "123456789012";
pub const REGION: &str = "ap-southeast-2";
pub const ASSETS_BUCKET: &str = "cf-provider-assets-abc123";

/// A provider with one plain and one secret config key.
pub fn okta_provider() -> ProviderDescriptor {
    ProviderDescriptor {
        id: "common-fate/okta@v1.2.0".parse().unwrap(),
        config_schema: BTreeMap::from([
            (
                "org_url".to_string(),
                ConfigField {
                    secret: false,
                    usage: "Your Okta organization URL".to_string(),
                },
            ),
            (
                "api_key".to_string(),
                ConfigField {
                    secret: true,
                    usage: "An Okta API token".to_string(),
                },
            ),
        ]),
        target_kinds: BTreeSet::from(["Group".to_string()]),
        handler_asset: "arn:aws:s3:::cf-registry/common-fate/okta/v1.2.0/handler.zip".to_string(),
        template_asset: "s3://cf-registry/common-fate/okta/v1.2.0/cloudformation.json"
            .to_string(),
    }
}

pub fn bootstrap_stack() -> StackDescription {
    StackDescription {
        name: BOOTSTRAP_STACK.to_string(),
        status: "CREATE_COMPLETE".to_string(),
        outputs: BTreeMap::from([("AssetsBucket".to_string(), ASSETS_BUCKET.to_string())]),
        tags: BTreeMap::new(),
    }
}

#[derive(Default)]
pub struct MockRegistry {
    pub providers: Vec<ProviderDescriptor>,
}

impl MockRegistry {
    pub fn with(providers: Vec<ProviderDescriptor>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn get_provider(&self, id: &ProviderId) -> Result<ProviderDescriptor, RegistryError> {
        self.providers
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    async fn list_providers(&self) -> Result<Vec<ProviderDescriptor>, RegistryError> {
        Ok(self.providers.clone())
    }
}

/// Records every call. The handler reports unhealthy for the first
/// `unhealthy_polls` health checks.
#[derive(Default)]
pub struct MockControlPlane {
    pub calls: Mutex<Vec<String>>,
    pub target_groups: Mutex<BTreeSet<String>>,
    pub handlers: Mutex<BTreeSet<String>>,
    /// Filled in by `link_target_group`.
    pub routes: Mutex<Vec<TargetRoute>>,
    pub unhealthy_polls: Mutex<usize>,
    pub unauthorized: bool,
}

impl MockControlPlane {
    pub fn healthy_after(polls: usize) -> Self {
        Self {
            unhealthy_polls: Mutex::new(polls),
            ..Default::default()
        }
    }

    pub fn with_target_group(self, id: &str) -> Self {
        self.target_groups.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn with_handler(self, id: &str) -> Self {
        self.handlers.lock().unwrap().insert(id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("get_handler"))
            .count()
    }

    fn record(&self, call: String) -> Result<(), ControlPlaneError> {
        self.calls.lock().unwrap().push(call);
        if self.unauthorized {
            return Err(ControlPlaneError::Unauthorized("invalid token".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn list_handlers(&self) -> Result<Vec<HandlerDetail>, ControlPlaneError> {
        self.record("list_handlers".to_string())?;
        Ok(self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|id| HandlerDetail {
                id: id.clone(),
                ..Default::default()
            })
            .collect())
    }

    async fn get_handler(&self, id: &str) -> Result<HandlerDetail, ControlPlaneError> {
        self.record(format!("get_handler {id}"))?;
        let mut remaining = self.unhealthy_polls.lock().unwrap();
        let healthy = *remaining == 0;
        *remaining = remaining.saturating_sub(1);
        Ok(HandlerDetail {
            id: id.to_string(),
            aws_account: ACCOUNT.to_string(),
            aws_region: REGION.to_string(),
            runtime: "aws-lambda".to_string(),
            healthy,
            diagnostics: if healthy {
                Vec::new()
            } else {
                vec![Diagnostic {
                    level: "ERROR".to_string(),
                    message: "failed to assume role".to_string(),
                }]
            },
        })
    }

    async fn register_handler(
        &self,
        request: &RegisterHandler,
    ) -> Result<CreateOutcome, ControlPlaneError> {
        self.record(format!("register_handler {}", request.id))?;
        if self.handlers.lock().unwrap().insert(request.id.clone()) {
            Ok(CreateOutcome::Created)
        } else {
            Ok(CreateOutcome::AlreadyExists)
        }
    }

    async fn delete_handler(&self, id: &str) -> Result<DeleteOutcome, ControlPlaneError> {
        self.record(format!("delete_handler {id}"))?;
        if self.handlers.lock().unwrap().remove(id) {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }

    async fn list_target_groups(&self) -> Result<Vec<TargetGroup>, ControlPlaneError> {
        self.record("list_target_groups".to_string())?;
        Ok(self
            .target_groups
            .lock()
            .unwrap()
            .iter()
            .map(|id| TargetGroup {
                id: id.clone(),
                from: Default::default(),
            })
            .collect())
    }

    async fn create_target_group(
        &self,
        request: &CreateTargetGroup,
    ) -> Result<CreateOutcome, ControlPlaneError> {
        self.record(format!(
            "create_target_group {} {}",
            request.id, request.target_schema
        ))?;
        if self.target_groups.lock().unwrap().insert(request.id.clone()) {
            Ok(CreateOutcome::Created)
        } else {
            Ok(CreateOutcome::AlreadyExists)
        }
    }

    async fn delete_target_group(&self, id: &str) -> Result<DeleteOutcome, ControlPlaneError> {
        self.record(format!("delete_target_group {id}"))?;
        if self.target_groups.lock().unwrap().remove(id) {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }

    async fn link_target_group(
        &self,
        target_group_id: &str,
        link: &TargetGroupLink,
    ) -> Result<LinkOutcome, ControlPlaneError> {
        self.record(format!(
            "link_target_group {target_group_id} {} {} {}",
            link.deployment_id, link.kind, link.priority
        ))?;
        self.routes.lock().unwrap().push(TargetRoute {
            target_group_id: target_group_id.to_string(),
            handler_id: link.deployment_id.clone(),
            kind: link.kind.clone(),
            priority: link.priority,
            valid: true,
            diagnostics: Vec::new(),
        });
        Ok(LinkOutcome::Linked)
    }

    async fn list_target_routes(
        &self,
        target_group_id: &str,
    ) -> Result<Vec<TargetRoute>, ControlPlaneError> {
        self.record(format!("list_target_routes {target_group_id}"))?;
        Ok(self
            .routes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.target_group_id == target_group_id)
            .cloned()
            .collect())
    }

    async fn unlink_target_group(
        &self,
        target_group_id: &str,
        deployment_id: &str,
    ) -> Result<DeleteOutcome, ControlPlaneError> {
        self.record(format!("unlink_target_group {target_group_id} {deployment_id}"))?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_access_rules(&self) -> Result<Vec<AccessRule>, ControlPlaneError> {
        self.record("list_access_rules".to_string())?;
        Ok(Vec::new())
    }
}

pub struct MockIdentity(pub String);

impl Default for MockIdentity {
    fn default() -> Self {
        Self(ACCOUNT.to_string())
    }
}

#[async_trait]
impl CallerIdentity for MockIdentity {
    async fn account_id(&self) -> Result<String, AwsError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedChangeSet {
    pub stack_name: String,
    pub template: String,
    pub parameters: ParameterSet,
    pub tags: BTreeMap<String, String>,
}

/// In-memory stack engine. Executed change sets create (or update) the stack
/// immediately; `hidden_describes` makes a freshly deployed stack invisible
/// to that many describe calls.
#[derive(Default)]
pub struct MockStacks {
    pub stacks: Mutex<BTreeMap<String, StackDescription>>,
    pub change_sets: Mutex<Vec<RecordedChangeSet>>,
    pub calls: Mutex<Vec<String>>,
    pub no_changes: bool,
    pub hidden_describes: Mutex<usize>,
    /// Fails every describe with `StackError::Invalid`.
    pub describe_error: Option<String>,
}

impl MockStacks {
    pub fn with_stack(self, stack: StackDescription) -> Self {
        self.stacks
            .lock()
            .unwrap()
            .insert(stack.name.clone(), stack);
        self
    }

    pub fn bootstrapped() -> Self {
        Self::default().with_stack(bootstrap_stack())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn change_set_for(&self, stack_name: &str) -> Option<RecordedChangeSet> {
        self.change_sets
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.stack_name == stack_name)
            .cloned()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StackEngine for MockStacks {
    async fn describe_stacks(&self, name: &str) -> Result<Vec<StackDescription>, StackError> {
        self.record(format!("describe_stacks {name}"));
        if let Some(reason) = &self.describe_error {
            return Err(StackError::Invalid(reason.clone()));
        }
        let mut hidden = self.hidden_describes.lock().unwrap();
        if *hidden > 0 && name == BOOTSTRAP_STACK {
            *hidden -= 1;
            return Err(StackError::NotFound(name.to_string()));
        }
        match self.stacks.lock().unwrap().get(name) {
            Some(stack) => Ok(vec![stack.clone()]),
            None => Err(StackError::NotFound(name.to_string())),
        }
    }

    async fn create_change_set(
        &self,
        request: ChangeSetRequest<'_>,
    ) -> Result<ChangeSetOutcome, StackError> {
        self.record(format!("create_change_set {}", request.stack_name));
        let mut change_sets = self.change_sets.lock().unwrap();
        change_sets.push(RecordedChangeSet {
            stack_name: request.stack_name.to_string(),
            template: request.template.to_string(),
            parameters: request.parameters.clone(),
            tags: request.tags.clone(),
        });
        if self.no_changes {
            return Ok(ChangeSetOutcome::NoChanges);
        }
        Ok(ChangeSetOutcome::Created {
            change_set: format!("cs-{}", change_sets.len()),
        })
    }

    async fn describe_change_set(
        &self,
        stack_name: &str,
        change_set: &str,
    ) -> Result<Vec<ResourceChange>, StackError> {
        self.record(format!("describe_change_set {stack_name} {change_set}"));
        Ok(vec![ResourceChange {
            action: "Add".to_string(),
            logical_id: "AssetsBucket".to_string(),
            resource_type: "AWS::S3::Bucket".to_string(),
            replacement: None,
        }])
    }

    async fn execute_change_set(
        &self,
        stack_name: &str,
        change_set: &str,
    ) -> Result<(), StackError> {
        self.record(format!("execute_change_set {stack_name} {change_set}"));
        let tags = self
            .change_set_for(stack_name)
            .map(|c| c.tags)
            .unwrap_or_default();
        let mut stack = if stack_name == BOOTSTRAP_STACK {
            bootstrap_stack()
        } else {
            StackDescription {
                name: stack_name.to_string(),
                ..Default::default()
            }
        };
        stack.status = "CREATE_COMPLETE".to_string();
        stack.tags = tags;
        self.stacks
            .lock()
            .unwrap()
            .insert(stack_name.to_string(), stack);
        Ok(())
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<(), StackError> {
        self.record(format!("delete_stack {stack_name}"));
        self.stacks.lock().unwrap().remove(stack_name);
        Ok(())
    }

    async fn wait_for_settle(&self, stack_name: &str) -> Result<SettledStack, StackError> {
        self.record(format!("wait_for_settle {stack_name}"));
        let status = match self.stacks.lock().unwrap().get(stack_name) {
            Some(stack) => stack.status.clone(),
            None => "DELETE_COMPLETE".to_string(),
        };
        Ok(SettledStack {
            status,
            messages: Vec::new(),
        })
    }
}

#[derive(Default)]
pub struct MockRoles {
    pub taken: BTreeSet<String>,
    pub lookups: Mutex<Vec<String>>,
}

impl MockRoles {
    pub fn taken(names: &[&str]) -> Self {
        Self {
            taken: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoleDirectory for MockRoles {
    async fn role_exists(&self, name: &str) -> Result<bool, AwsError> {
        self.lookups.lock().unwrap().push(name.to_string());
        Ok(self.taken.contains(name))
    }
}

#[derive(Default)]
pub struct MockSecrets {
    pub stored: Mutex<BTreeMap<String, String>>,
}

impl MockSecrets {
    pub fn stored(&self) -> BTreeMap<String, String> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretStore for MockSecrets {
    async fn put_secret(&self, path: &str, value: &SecretString) -> Result<(), AwsError> {
        self.stored
            .lock()
            .unwrap()
            .insert(path.to_string(), value.expose_secret().to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockObjects {
    /// `(source, bucket, key)` per copy.
    pub copies: Mutex<Vec<(String, String, String)>>,
}

impl MockObjects {
    pub fn copies(&self) -> Vec<(String, String, String)> {
        self.copies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjects {
    async fn copy_object(&self, source: &str, bucket: &str, key: &str) -> Result<(), AwsError> {
        self.copies
            .lock()
            .unwrap()
            .push((source.to_string(), bucket.to_string(), key.to_string()));
        Ok(())
    }
}

/// Answers prompts from pre-loaded queues. An empty queue fails the prompt
/// the same way a non-interactive session would.
#[derive(Default)]
pub struct ScriptedPrompter {
    pub inputs: Mutex<VecDeque<String>>,
    pub secrets: Mutex<VecDeque<String>>,
    pub selections: Mutex<VecDeque<usize>>,
    pub confirmations: Mutex<VecDeque<bool>>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn inputs(self, values: &[&str]) -> Self {
        self.inputs
            .lock()
            .unwrap()
            .extend(values.iter().map(|v| v.to_string()));
        self
    }

    pub fn secrets(self, values: &[&str]) -> Self {
        self.secrets
            .lock()
            .unwrap()
            .extend(values.iter().map(|v| v.to_string()));
        self
    }

    pub fn selections(self, values: &[usize]) -> Self {
        self.selections.lock().unwrap().extend(values);
        self
    }

    pub fn confirmations(self, values: &[bool]) -> Self {
        self.confirmations.lock().unwrap().extend(values);
        self
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn ask(&self, prompt: &str) {
        self.asked.lock().unwrap().push(prompt.to_string());
    }
}

impl Prompter for ScriptedPrompter {
    fn input(&self, prompt: &str) -> Result<String, PromptError> {
        self.ask(prompt);
        self.inputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PromptError::NotInteractive(prompt.to_string()))
    }

    fn secret(&self, prompt: &str, _help: Option<&str>) -> Result<SecretString, PromptError> {
        self.ask(prompt);
        self.secrets
            .lock()
            .unwrap()
            .pop_front()
            .map(SecretString::from)
            .ok_or_else(|| PromptError::NotInteractive(prompt.to_string()))
    }

    fn select(&self, prompt: &str, items: &[String], _default: usize) -> Result<usize, PromptError> {
        self.ask(prompt);
        match self.selections.lock().unwrap().pop_front() {
            Some(index) if index < items.len() => Ok(index),
            Some(_) => Err(PromptError::NoChoices(prompt.to_string())),
            None => Err(PromptError::NotInteractive(prompt.to_string())),
        }
    }

    fn confirm(&self, prompt: &str, _default: bool) -> Result<bool, PromptError> {
        self.ask(prompt);
        self.confirmations
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PromptError::NotInteractive(prompt.to_string()))
    }
}
