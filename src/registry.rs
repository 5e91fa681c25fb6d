//! Provider catalog lookups.
//!
//! Resolves a [`ProviderDescriptor`] either from an explicit
//! `publisher/name@version` id or by letting the user pick from the catalog.
use crate::prompt::{PromptError, Prompter};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_REGISTRY_URL: &str = "https://api.registry.commonfate.io";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid provider id '{0}': expected publisher/name@version")]
    InvalidId(String),

    #[error("provider not found: {0}")]
    NotFound(String),

    #[error("provider registry error: {0}")]
    Server(String),

    #[error("unhandled response from the provider registry (status {status}): {body}")]
    Unhandled { status: u16, body: String },

    #[error("network request to the provider registry failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid registry url: {0}")]
    Url(#[from] url::ParseError),

    #[error("the provider registry has no providers")]
    Empty,

    #[error(
        "This Provider doesn't grant access to anything. This is a problem with the Provider and should be reported to the Provider developers."
    )]
    NoTargetKinds,

    #[error("target kind '{kind}' is not offered by this provider (available: {available})")]
    UnknownTargetKind { kind: String, available: String },

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId {
    pub publisher: String,
    pub name: String,
    pub version: String,
}

impl ProviderId {
    /// `publisher/name`, the grouping key in the catalog.
    pub fn family(&self) -> String {
        format!("{}/{}", self.publisher, self.name)
    }
}

impl FromStr for ProviderId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidId(s.to_string());
        let (family, version) = s.split_once('@').ok_or_else(invalid)?;
        let (publisher, name) = family.split_once('/').ok_or_else(invalid)?;

        let valid_part = |p: &str| !p.is_empty() && !p.contains(['/', '@']) && !p.trim().is_empty();
        if !(valid_part(publisher) && valid_part(name) && valid_part(version)) {
            return Err(invalid());
        }

        Ok(Self {
            publisher: publisher.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.publisher, self.name, self.version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigField {
    pub secret: bool,
    pub usage: String,
}

/// A provider release as published in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub config_schema: BTreeMap<String, ConfigField>,
    pub target_kinds: BTreeSet<String>,
    /// Catalog-side location of the deployable handler package.
    pub handler_asset: String,
    /// Catalog-side location of the infrastructure template.
    pub template_asset: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderDetail {
    publisher: String,
    name: String,
    version: String,
    #[serde(default)]
    lambda_asset_s3_arn: String,
    #[serde(default)]
    cfn_template_s3_arn: String,
    #[serde(default)]
    schema: ProviderSchema,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderSchema {
    #[serde(default)]
    config: Option<BTreeMap<String, ConfigFieldDetail>>,
    #[serde(default)]
    targets: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ConfigFieldDetail {
    #[serde(default)]
    secret: Option<bool>,
    #[serde(default)]
    usage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListProvidersResponse {
    #[serde(default)]
    providers: Vec<ProviderDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

impl From<ProviderDetail> for ProviderDescriptor {
    fn from(d: ProviderDetail) -> Self {
        let config_schema = d
            .schema
            .config
            .unwrap_or_default()
            .into_iter()
            .map(|(key, field)| {
                let field = ConfigField {
                    secret: field.secret.unwrap_or(false),
                    usage: field.usage.unwrap_or_default(),
                };
                (key, field)
            })
            .collect();
        let target_kinds = d.schema.targets.unwrap_or_default().into_keys().collect();

        Self {
            id: ProviderId {
                publisher: d.publisher,
                name: d.name,
                version: d.version,
            },
            config_schema,
            target_kinds,
            handler_asset: d.lambda_asset_s3_arn,
            template_asset: d.cfn_template_s3_arn,
        }
    }
}

/// Read access to the provider catalog.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn get_provider(&self, id: &ProviderId) -> Result<ProviderDescriptor, RegistryError>;

    async fn list_providers(&self) -> Result<Vec<ProviderDescriptor>, RegistryError>;
}

pub struct HttpRegistry {
    client: Client,
    base: Url,
}

impl HttpRegistry {
    pub fn new(base: Url) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("cf-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("v1alpha1")
            .push("providers")
            .extend(segments);
        Ok(url)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        what: &str,
    ) -> Result<T, RegistryError> {
        debug!(%url, "querying provider registry");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status == StatusCode::OK {
            return Ok(resp.json::<T>().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error);
        match (status, message) {
            (StatusCode::NOT_FOUND, msg) => {
                Err(RegistryError::NotFound(msg.unwrap_or_else(|| what.to_string())))
            }
            (StatusCode::INTERNAL_SERVER_ERROR, Some(msg)) => Err(RegistryError::Server(msg)),
            _ => Err(RegistryError::Unhandled {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn get_provider(&self, id: &ProviderId) -> Result<ProviderDescriptor, RegistryError> {
        let url = self.endpoint(&[&id.publisher, &id.name, &id.version])?;
        let detail: ProviderDetail = self.fetch(url, &id.to_string()).await?;
        Ok(detail.into())
    }

    async fn list_providers(&self) -> Result<Vec<ProviderDescriptor>, RegistryError> {
        let url = self.endpoint(&[])?;
        let list: ListProvidersResponse = self.fetch(url, "providers").await?;
        Ok(list.providers.into_iter().map(Into::into).collect())
    }
}

/// Groups releases by `publisher/name`.
///
/// Versions within a group are ordered newest first by plain string
/// comparison, so `v10` sorts before `v9`.
pub fn group_versions(
    providers: Vec<ProviderDescriptor>,
) -> BTreeMap<String, Vec<ProviderDescriptor>> {
    let mut groups: BTreeMap<String, Vec<ProviderDescriptor>> = BTreeMap::new();
    for provider in providers {
        groups.entry(provider.id.family()).or_default().push(provider);
    }
    for versions in groups.values_mut() {
        versions.sort_by(|a, b| b.id.version.cmp(&a.id.version));
    }
    groups
}

/// Fetches the descriptor for `id`, or prompts for a provider and version
/// when no id is given.
pub async fn resolve_provider(
    registry: &dyn Registry,
    id: Option<&str>,
    prompter: &dyn Prompter,
) -> Result<ProviderDescriptor, RegistryError> {
    if let Some(raw) = id {
        let id: ProviderId = raw.parse()?;
        info!(provider = %id, "retrieving provider details from the registry");
        return registry.get_provider(&id).await;
    }

    let mut groups = group_versions(registry.list_providers().await?);
    if groups.is_empty() {
        return Err(RegistryError::Empty);
    }

    let families: Vec<String> = groups.keys().cloned().collect();
    let index = prompter.select("The Provider to deploy", &families, 0)?;
    let family = families
        .get(index)
        .ok_or_else(|| PromptError::NoChoices("provider".to_string()))?;
    let mut versions = groups.remove(family).unwrap_or_default();

    let labels: Vec<String> = versions.iter().map(|p| p.id.version.clone()).collect();
    let index = prompter.select("The version of the Provider to deploy", &labels, 0)?;
    if index >= versions.len() {
        return Err(PromptError::NoChoices(family.clone()).into());
    }
    Ok(versions.swap_remove(index))
}

/// Picks which target kind the new target group will route.
pub fn select_target_kind(
    provider: &ProviderDescriptor,
    requested: Option<&str>,
    prompter: &dyn Prompter,
) -> Result<String, RegistryError> {
    let kinds: Vec<String> = provider.target_kinds.iter().cloned().collect();
    match (kinds.as_slice(), requested) {
        ([], _) => Err(RegistryError::NoTargetKinds),
        (_, Some(kind)) if provider.target_kinds.contains(kind) => Ok(kind.to_string()),
        (_, Some(kind)) => Err(RegistryError::UnknownTargetKind {
            kind: kind.to_string(),
            available: kinds.join(", "),
        }),
        ([only], None) => {
            info!(kind = %only, "this provider will grant access to {only} targets");
            Ok(only.clone())
        }
        (_, None) => {
            let index = prompter.select(
                "Select which Kind of target to use with this provider",
                &kinds,
                0,
            )?;
            kinds
                .get(index)
                .cloned()
                .ok_or_else(|| PromptError::NoChoices("target kind".to_string()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(id: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            id: id.parse().unwrap(),
            config_schema: BTreeMap::new(),
            target_kinds: BTreeSet::new(),
            handler_asset: String::new(),
            template_asset: String::new(),
        }
    }

    #[test]
    fn provider_id_round_trips() {
        let id: ProviderId = "common-fate/aws@v0.4.0".parse().unwrap();
        assert_eq!(id.publisher, "common-fate");
        assert_eq!(id.name, "aws");
        assert_eq!(id.version, "v0.4.0");
        assert_eq!(id.to_string(), "common-fate/aws@v0.4.0");
    }

    #[test]
    fn provider_id_rejects_malformed_input() {
        for raw in [
            "",
            "common-fate/aws",
            "common-fate@v1",
            "/aws@v1",
            "common-fate/@v1",
            "common-fate/aws@",
            "a/b/c@v1",
            "a/b@v1@v2",
        ] {
            assert!(
                matches!(raw.parse::<ProviderId>(), Err(RegistryError::InvalidId(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn groups_sort_versions_lexicographically_descending() {
        let groups = group_versions(vec![
            release("common-fate/aws@v9"),
            release("common-fate/okta@v1"),
            release("common-fate/aws@v10"),
            release("common-fate/aws@v2"),
        ]);

        let families: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(families, vec!["common-fate/aws", "common-fate/okta"]);

        let versions: Vec<_> = groups["common-fate/aws"]
            .iter()
            .map(|p| p.id.version.as_str())
            .collect();
        assert_eq!(versions, vec!["v9", "v2", "v10"]);
    }

    #[test]
    fn decodes_catalog_detail() {
        let raw = serde_json::json!({
            "publisher": "common-fate",
            "name": "aws",
            "version": "v0.4.0",
            "lambdaAssetS3Arn": "arn:aws:s3:::registry/common-fate/aws/v0.4.0/handler.zip",
            "cfnTemplateS3Arn": "arn:aws:s3:::registry/common-fate/aws/v0.4.0/cloudformation.json",
            "schema": {
                "config": {
                    "api_key": { "secret": true, "usage": "API key" },
                    "region": { "usage": "AWS region" }
                },
                "targets": { "Account": {}, "Group": {} }
            }
        });
        let detail: ProviderDetail = serde_json::from_value(raw).unwrap();
        let descriptor = ProviderDescriptor::from(detail);

        assert!(descriptor.config_schema["api_key"].secret);
        assert!(!descriptor.config_schema["region"].secret);
        assert_eq!(
            descriptor.target_kinds.iter().collect::<Vec<_>>(),
            vec!["Account", "Group"]
        );
        assert!(descriptor.handler_asset.ends_with("handler.zip"));
    }
}
