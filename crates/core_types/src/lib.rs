use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub type TurnId = Uuid;
pub type ChatId = Uuid;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum UiLanguage {
    #[default]
    En,
    Es,
    Fr,
    De,
    Zh,
}

impl UiLanguage {
    pub const ALL: [UiLanguage; 5] = [
        UiLanguage::En,
        UiLanguage::Es,
        UiLanguage::Fr,
        UiLanguage::De,
        UiLanguage::Zh,
    ];

    pub fn code(self) -> &'static str {
        match self {
            UiLanguage::En => "en",
            UiLanguage::Es => "es",
            UiLanguage::Fr => "fr",
            UiLanguage::De => "de",
            UiLanguage::Zh => "zh",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(code.trim()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    ChatCompletions,
    GenerativeContent,
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::ChatCompletions => "chat_completions",
            ProviderId::GenerativeContent => "generative_content",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SecretRef {
    pub namespace: String,
    pub key: String,
}

impl SecretRef {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}:{}", self.namespace, self.key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub name: String,
    pub base_url: String,
    pub default_model: String,
    pub credential_ref: SecretRef,
    #[serde(default)]
    pub extra_headers: Vec<(String, String)>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            id: TurnId::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestConfig {
    pub model_id: String,
    pub temperature: f64,
    pub persona_prompt: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl From<TurnRole> for PromptRole {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => PromptRole::User,
            TurnRole::Assistant => PromptRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f64,
    pub messages: Vec<PromptMessage>,
    pub sampling: SamplingParams,
}

impl CompletionRequest {
    pub fn from_turns(
        turns: &[ConversationTurn],
        config: &RequestConfig,
        sampling: SamplingParams,
    ) -> Self {
        let persona = config.persona_prompt.trim();
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if !persona.is_empty() {
            messages.push(PromptMessage {
                role: PromptRole::System,
                content: persona.to_string(),
            });
        }
        messages.extend(turns.iter().map(|turn| PromptMessage {
            role: turn.role.into(),
            content: turn.content.clone(),
        }));
        Self {
            model: config.model_id.trim().to_string(),
            temperature: config.temperature,
            messages,
            sampling,
        }
    }
}

/// Ordered API keys for one provider tier. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSet {
    keys: Vec<String>,
}

impl CredentialSet {
    pub fn new<I, S>(keys: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(Into::into)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(ConfigError::EmptyCredentialSet);
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, index: usize) -> &str {
        &self.keys[index % self.keys.len()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    pub timeout: Duration,
}

impl OutboundRequest {
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Why a single (tier, credential) attempt failed. Every variant is retried
/// with the next credential, then the next tier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected request ({status}): {detail}")]
    ProviderRejection { status: u16, detail: String },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<TransportError> for AttemptError {
    fn from(err: TransportError) -> Self {
        AttemptError::Transport(err.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchFailure {
    #[error("all {attempts} provider attempts failed; last error: {last}")]
    Exhausted { attempts: usize, last: AttemptError },
    #[error("dispatch cancelled")]
    Cancelled,
    #[error("conversation is empty")]
    EmptyConversation,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("credential set must contain at least one key")]
    EmptyCredentialSet,
    #[error("no provider tiers configured")]
    NoTiers,
    #[error("no credentials configured for provider `{0}`")]
    MissingCredentials(String),
    #[error("rotation state tracks {actual} tiers but {expected} are configured")]
    RotationMismatch { expected: usize, actual: usize },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(&self, request: OutboundRequest) -> Result<HttpResponse, TransportError>;
}

pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn build_request(
        &self,
        provider: &ProviderConfig,
        credential: &str,
        request: &CompletionRequest,
    ) -> Result<OutboundRequest, AttemptError>;

    fn parse_response(&self, body: &str) -> Result<String, AttemptError>;

    fn reject(&self, status: u16, body: &str) -> AttemptError {
        AttemptError::ProviderRejection {
            status,
            detail: body.trim().to_string(),
        }
    }
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        turns: &[ConversationTurn],
        config: &RequestConfig,
    ) -> Result<String, DispatchFailure>;
}
