//! Control-plane API client.
//!
//! Every call returns an explicit outcome enum for the statuses the caller
//! is expected to branch on; anything else becomes a [`ControlPlaneError`].
use async_trait::async_trait;
use clap::Args;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("access denied: {0} (check that your API token is valid and has admin access)")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("control plane error: {0}")]
    Server(String),

    #[error("Unhandled response from the Common Fate API (status {status}): {body}")]
    Unhandled { status: u16, body: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl ControlPlaneError {
    /// Server-side and transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Server(_) => true,
            Self::Unhandled { status, .. } => *status >= 500,
            Self::Unauthorized(_) | Self::NotFound(_) | Self::InvalidConfig(_) => false,
        }
    }
}

/// An API token given either literally or as `file:<path>`.
#[derive(Debug, Clone)]
pub struct AuthToken {
    token: SecretString,
}

impl AuthToken {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }

    fn from_file(path: PathBuf) -> Result<Self, ControlPlaneError> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ControlPlaneError::InvalidConfig(format!("failed to read token file {path:?}: {e}"))
        })?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ControlPlaneError::InvalidConfig(format!(
                "token file {path:?} is empty"
            )));
        }
        Ok(Self::new(SecretString::from(trimmed.to_owned())))
    }
}

impl FromStr for AuthToken {
    type Err = ControlPlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("file:") {
            return Self::from_file(PathBuf::from(path));
        }
        if s.trim().is_empty() {
            return Err(ControlPlaneError::InvalidConfig(
                "API token literal is empty".to_string(),
            ));
        }
        Ok(Self::new(SecretString::from(s.to_owned())))
    }
}

impl ExposeSecret<str> for AuthToken {
    fn expose_secret(&self) -> &str {
        self.token.expose_secret()
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ControlPlaneArgs {
    /// Control plane API URL. Defaults to the current context in the config file
    #[arg(long = "api-url", env = "CF_API_URL", global = true)]
    pub api_url: Option<Url>,

    /// API token, or `file:<path>` to read it from a file
    #[arg(long = "api-token", env = "CF_API_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<AuthToken>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.level.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", self.level, self.message)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerDetail {
    pub id: String,
    #[serde(default)]
    pub aws_account: String,
    #[serde(default)]
    pub aws_region: String,
    #[serde(default)]
    pub runtime: String,
    #[serde(default)]
    pub healthy: bool,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterHandler {
    pub id: String,
    pub aws_account: String,
    pub aws_region: String,
    pub runtime: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetGroup {
    pub id: String,
    /// `publisher/name@version/kind`
    pub target_schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupLink {
    pub deployment_id: String,
    pub priority: i32,
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TargetSchemaRef {
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

impl fmt::Display for TargetSchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}/{}",
            self.publisher, self.name, self.version, self.kind
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetGroup {
    pub id: String,
    #[serde(default)]
    pub from: TargetSchemaRef,
}

/// A handler a target group routes requests to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRoute {
    pub target_group_id: String,
    pub handler_id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessRule {
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    AlreadyLinked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_handlers(&self) -> Result<Vec<HandlerDetail>, ControlPlaneError>;

    async fn get_handler(&self, id: &str) -> Result<HandlerDetail, ControlPlaneError>;

    async fn register_handler(
        &self,
        request: &RegisterHandler,
    ) -> Result<CreateOutcome, ControlPlaneError>;

    async fn delete_handler(&self, id: &str) -> Result<DeleteOutcome, ControlPlaneError>;

    async fn list_target_groups(&self) -> Result<Vec<TargetGroup>, ControlPlaneError>;

    async fn create_target_group(
        &self,
        request: &CreateTargetGroup,
    ) -> Result<CreateOutcome, ControlPlaneError>;

    async fn delete_target_group(&self, id: &str) -> Result<DeleteOutcome, ControlPlaneError>;

    async fn link_target_group(
        &self,
        target_group_id: &str,
        link: &TargetGroupLink,
    ) -> Result<LinkOutcome, ControlPlaneError>;

    async fn unlink_target_group(
        &self,
        target_group_id: &str,
        deployment_id: &str,
    ) -> Result<DeleteOutcome, ControlPlaneError>;

    async fn list_target_routes(
        &self,
        target_group_id: &str,
    ) -> Result<Vec<TargetRoute>, ControlPlaneError>;

    async fn list_access_rules(&self) -> Result<Vec<AccessRule>, ControlPlaneError>;
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListHandlersResponse {
    #[serde(default)]
    res: Vec<HandlerDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTargetGroupsResponse {
    #[serde(default)]
    target_groups: Vec<TargetGroup>,
}

#[derive(Debug, Deserialize)]
struct ListTargetRoutesResponse {
    #[serde(default)]
    routes: Vec<TargetRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAccessRulesResponse {
    #[serde(default)]
    access_rules: Vec<AccessRule>,
}

struct Response {
    status: StatusCode,
    body: String,
}

impl Response {
    fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, ControlPlaneError> {
        serde_json::from_str(&self.body).map_err(|e| ControlPlaneError::Unhandled {
            status: self.status.as_u16(),
            body: format!("failed to decode response ({e}): {}", self.body),
        })
    }

    /// Maps a status the caller did not expect to an error.
    fn unexpected(self) -> ControlPlaneError {
        let message = serde_json::from_str::<ErrorResponse>(&self.body)
            .ok()
            .and_then(|e| e.error);
        match (self.status, message) {
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, msg) => {
                ControlPlaneError::Unauthorized(msg.unwrap_or_else(|| self.status.to_string()))
            }
            (StatusCode::NOT_FOUND, Some(msg)) => ControlPlaneError::NotFound(msg),
            (StatusCode::INTERNAL_SERVER_ERROR, Some(msg)) => ControlPlaneError::Server(msg),
            _ => ControlPlaneError::Unhandled {
                status: self.status.as_u16(),
                body: self.body,
            },
        }
    }
}

/// Control plane over HTTPS with bearer auth.
pub struct HttpControlPlane {
    client: Client,
    base: Url,
    token: AuthToken,
}

impl HttpControlPlane {
    pub fn new(base: Url, token: AuthToken) -> Result<Self, ControlPlaneError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("cf-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base,
            token,
        })
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ControlPlaneError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ControlPlaneError::InvalidConfig(format!("API url {} cannot be a base", self.base))
            })?
            .pop_if_empty()
            .extend(segments);
        debug!(%method, %url, "control plane request");
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(self.token.expose_secret()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ControlPlaneError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(Response { status, body })
    }
}

const HANDLERS: [&str; 4] = ["api", "v1", "admin", "handlers"];
const TARGET_GROUPS: [&str; 4] = ["api", "v1", "admin", "target-groups"];

fn path<'a>(prefix: &[&'a str], rest: &[&'a str]) -> Vec<&'a str> {
    prefix.iter().chain(rest).copied().collect()
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn list_handlers(&self) -> Result<Vec<HandlerDetail>, ControlPlaneError> {
        let resp = self.send(self.request(Method::GET, &HANDLERS)?).await?;
        match resp.status {
            StatusCode::OK => Ok(resp.decode::<ListHandlersResponse>()?.res),
            _ => Err(resp.unexpected()),
        }
    }

    async fn get_handler(&self, id: &str) -> Result<HandlerDetail, ControlPlaneError> {
        let resp = self
            .send(self.request(Method::GET, &path(&HANDLERS, &[id]))?)
            .await?;
        match resp.status {
            StatusCode::OK => resp.decode(),
            _ => Err(resp.unexpected()),
        }
    }

    async fn register_handler(
        &self,
        request: &RegisterHandler,
    ) -> Result<CreateOutcome, ControlPlaneError> {
        let resp = self
            .send(self.request(Method::POST, &HANDLERS)?.json(request))
            .await?;
        match resp.status {
            StatusCode::CREATED => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            _ => Err(resp.unexpected()),
        }
    }

    async fn delete_handler(&self, id: &str) -> Result<DeleteOutcome, ControlPlaneError> {
        let resp = self
            .send(self.request(Method::DELETE, &path(&HANDLERS, &[id]))?)
            .await?;
        match resp.status {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::NotFound),
            _ => Err(resp.unexpected()),
        }
    }

    async fn list_target_groups(&self) -> Result<Vec<TargetGroup>, ControlPlaneError> {
        let resp = self.send(self.request(Method::GET, &TARGET_GROUPS)?).await?;
        match resp.status {
            StatusCode::OK => Ok(resp.decode::<ListTargetGroupsResponse>()?.target_groups),
            _ => Err(resp.unexpected()),
        }
    }

    async fn create_target_group(
        &self,
        request: &CreateTargetGroup,
    ) -> Result<CreateOutcome, ControlPlaneError> {
        let resp = self
            .send(self.request(Method::POST, &TARGET_GROUPS)?.json(request))
            .await?;
        match resp.status {
            StatusCode::CREATED => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            _ => Err(resp.unexpected()),
        }
    }

    async fn delete_target_group(&self, id: &str) -> Result<DeleteOutcome, ControlPlaneError> {
        let resp = self
            .send(self.request(Method::DELETE, &path(&TARGET_GROUPS, &[id]))?)
            .await?;
        match resp.status {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::NotFound),
            _ => Err(resp.unexpected()),
        }
    }

    async fn link_target_group(
        &self,
        target_group_id: &str,
        link: &TargetGroupLink,
    ) -> Result<LinkOutcome, ControlPlaneError> {
        let segments = path(&TARGET_GROUPS, &[target_group_id, "link"]);
        let resp = self
            .send(self.request(Method::POST, &segments)?.json(link))
            .await?;
        match resp.status {
            StatusCode::OK | StatusCode::CREATED => Ok(LinkOutcome::Linked),
            StatusCode::CONFLICT => Ok(LinkOutcome::AlreadyLinked),
            _ => Err(resp.unexpected()),
        }
    }

    async fn unlink_target_group(
        &self,
        target_group_id: &str,
        deployment_id: &str,
    ) -> Result<DeleteOutcome, ControlPlaneError> {
        let segments = path(&TARGET_GROUPS, &[target_group_id, "unlink"]);
        let request = self
            .request(Method::POST, &segments)?
            .query(&[("deploymentId", deployment_id)]);
        let resp = self.send(request).await?;
        match resp.status {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(DeleteOutcome::Deleted),
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::NotFound),
            _ => Err(resp.unexpected()),
        }
    }

    async fn list_target_routes(
        &self,
        target_group_id: &str,
    ) -> Result<Vec<TargetRoute>, ControlPlaneError> {
        let segments = path(&TARGET_GROUPS, &[target_group_id, "routes"]);
        let resp = self.send(self.request(Method::GET, &segments)?).await?;
        match resp.status {
            StatusCode::OK => Ok(resp.decode::<ListTargetRoutesResponse>()?.routes),
            _ => Err(resp.unexpected()),
        }
    }

    async fn list_access_rules(&self) -> Result<Vec<AccessRule>, ControlPlaneError> {
        let resp = self
            .send(self.request(Method::GET, &["api", "v1", "access-rules"])?)
            .await?;
        match resp.status {
            StatusCode::OK => Ok(resp.decode::<ListAccessRulesResponse>()?.access_rules),
            _ => Err(resp.unexpected()),
        }
    }
}
