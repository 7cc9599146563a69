use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Credential;
use crate::constants::DEFAULT_CLI_TIMEOUT_MS;

/// A chat-completion request as received from the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Logical model identifier
    #[serde(default)]
    pub model: String,
    /// Conversation so far; the last entry is the prompt
    #[serde(default, alias = "input")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextConfig>,
    /// Tool definitions; their presence makes the remote reply a stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    /// Everything else the caller sent, forwarded untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Single user message request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::user(prompt)],
            ..Self::default()
        }
    }

    /// Whether the caller asked for tool use
    pub fn wants_tools(&self) -> bool {
        matches!(&self.tools, Some(tools) if !tools.is_null())
    }

    /// Prompt text handed to command-line backends.
    ///
    /// Uses the last message only: a plain string is taken as-is, a list of
    /// content items contributes its `text` items joined by newlines.
    pub fn prompt_text(&self) -> String {
        match self.messages.last().and_then(|m| m.content.as_ref()) {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Items(items)) => items
                .iter()
                .filter(|item| item.kind == "text")
                .filter_map(|item| item.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role("user", text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role("system", text)
    }

    fn with_role(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(MessageContent::Text(text.into())),
            extra: Map::new(),
        }
    }
}

/// Message content: one text span or a list of typed items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Items(Vec<ContentItem>),
}

/// Typed content item (`text`, `input_text`, `image_url`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            extra: Map::new(),
        }
    }
}

/// Reasoning directives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Output verbosity directive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
}

/// Reasoning/text options from configuration, global or per model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_verbosity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
}

/// Backend-specific settings resolved for one invocation
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Deadline for the whole invocation
    pub timeout: Duration,
    /// Bearer credential for remote backends
    pub credential: Option<Credential>,
    /// Account identifier header value
    pub account_id: Option<String>,
    /// Prelude replaces caller system prompts
    pub codex_mode: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_CLI_TIMEOUT_MS),
            credential: None,
            account_id: None,
            codex_mode: true,
        }
    }
}

/// Per-invocation bundle handed to an adapter. Never shared between requests.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Model name as the caller sent it
    pub original_model: String,
    /// Caller-level options applied to every model
    pub user_options: ModelOptions,
    /// Per-model option overrides
    pub model_options: HashMap<String, ModelOptions>,
    pub settings: BackendSettings,
}

/// What an adapter receives
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub body: ChatRequest,
    pub context: ExecutionContext,
}

/// Successful backend output
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub content: String,
    pub metadata: Option<Map<String, Value>>,
    pub is_streaming: bool,
}

/// Closed failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Auth,
    Network,
    Api,
    Validation,
    Process,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Auth => "auth",
            FailureKind::Network => "network",
            FailureKind::Api => "api",
            FailureKind::Validation => "validation",
            FailureKind::Process => "process",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure code: an HTTP status or a backend-specific tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FailureCode {
    Status(u16),
    Text(String),
}

/// Typed backend failure
#[derive(Debug, Clone)]
pub struct BackendFailure {
    pub kind: FailureKind,
    pub message: String,
    pub code: Option<FailureCode>,
    pub cause: Option<Arc<anyhow::Error>>,
}

impl BackendFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            cause: None,
        }
    }

    pub fn with_code(mut self, code: FailureCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }
}

impl PartialEq for BackendFailure {
    // causes are opaque; compare the observable shape
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message && self.code == other.code
    }
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Exactly one of these per invocation
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResult {
    Success(BackendResponse),
    Failure(BackendFailure),
}

impl BackendResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BackendResult::Success(_))
    }

    pub fn failure(&self) -> Option<&BackendFailure> {
        match self {
            BackendResult::Failure(failure) => Some(failure),
            BackendResult::Success(_) => None,
        }
    }
}

impl From<BackendFailure> for BackendResult {
    fn from(failure: BackendFailure) -> Self {
        BackendResult::Failure(failure)
    }
}

/// Answer of the optional authentication probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub details: Option<String>,
}
