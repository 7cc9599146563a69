use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::time::{timeout, Instant};

use super::classify::{classify_http_error, failure_from_error};
use super::traits::Backend;
use super::types::{
    AuthStatus, BackendFailure, BackendRequest, BackendResponse, BackendResult, ChatRequest,
    ExecutionContext, FailureCode, FailureKind, ReasoningConfig, TextConfig,
};
use crate::app::CodexConfig;
use crate::auth::CredentialProvider;
use crate::cache::InstructionCache;
use crate::constants::{
    ACCOUNT_ID_HEADER, CODEX_BACKEND_ID, CODEX_BACKEND_NAME, CODEX_RESPONSES_PATH,
    DEFAULT_INCLUDE, DEFAULT_REASONING_EFFORT, DEFAULT_REASONING_SUMMARY, DEFAULT_TEXT_VERBOSITY,
    MAX_ERROR_BODY_CHARS, OPENAI_BETA_HEADER, OPENAI_BETA_RESPONSES, ORIGINATOR_HEADER,
    ORIGINATOR_VALUE, STRIPPED_BODY_FIELDS,
};

const NO_TOKEN_MESSAGE: &str = "No valid OAuth token available";

/// Remote backend speaking the ChatGPT codex responses endpoint
pub struct CodexBackend {
    client: Client,
    config: CodexConfig,
    instructions: Arc<InstructionCache>,
    credentials: Arc<dyn CredentialProvider>,
}

impl CodexBackend {
    pub fn new(
        config: CodexConfig,
        instructions: Arc<InstructionCache>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> crate::utils::Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            config,
            instructions,
            credentials,
        })
    }

    /// Logical endpoint the caller's request targets
    fn logical_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Prelude fetch and POST share one deadline
    async fn send(
        &self,
        request: &BackendRequest,
        access_token: &str,
        deadline: Instant,
    ) -> anyhow::Result<BackendResult> {
        let context = &request.context;
        let instructions = self
            .instructions
            .get()
            .await
            .context("Failed to fetch codex instructions")?;

        let body = transform_request(&request.body, &instructions, context)
            .context("Failed to transform request body: invalid request shape")?;
        let url = rewrite_url(&self.logical_url(), &self.config.backend_url);
        let headers = codex_headers(access_token, context.settings.account_id.as_deref())?;

        tracing::debug!("codex: POST {} (model {})", url, request.body.model);
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .timeout(deadline.saturating_duration_since(Instant::now()))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Network request to {} failed", url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read codex response body")?;

        if !status.is_success() {
            let excerpt: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            tracing::error!("Codex API returned {}", status);
            return Ok(BackendFailure::new(
                FailureKind::Api,
                format!("Codex API error: {} {}", status.as_u16(), excerpt),
            )
            .with_code(FailureCode::Status(status.as_u16()))
            .into());
        }

        let mut metadata = Map::new();
        metadata.insert("provider".to_string(), json!(CODEX_BACKEND_ID));
        metadata.insert("model".to_string(), json!(request.body.model));
        metadata.insert("url".to_string(), json!(url));

        Ok(BackendResult::Success(BackendResponse {
            content: text,
            metadata: Some(metadata),
            is_streaming: request.body.wants_tools(),
        }))
    }
}

#[async_trait]
impl Backend for CodexBackend {
    fn id(&self) -> &str {
        CODEX_BACKEND_ID
    }

    fn name(&self) -> &str {
        CODEX_BACKEND_NAME
    }

    async fn execute(&self, request: &BackendRequest) -> BackendResult {
        let access_token = match &request.context.settings.credential {
            Some(credential) if credential.is_usable() => credential.access.clone(),
            _ => return BackendFailure::new(FailureKind::Auth, NO_TOKEN_MESSAGE).into(),
        };

        let budget = request.context.settings.timeout;
        let deadline = Instant::now() + budget;
        match timeout(budget, self.send(request, &access_token, deadline)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!("Codex backend error: {:#}", e);
                failure_from_error(e, classify_http_error).into()
            }
            Err(_) => {
                tracing::error!("Codex request exceeded {} ms", budget.as_millis());
                BackendFailure::new(
                    FailureKind::Network,
                    format!("Codex request timeout after {} ms", budget.as_millis()),
                )
                .into()
            }
        }
    }

    async fn validate_config(&self, context: &ExecutionContext) -> Option<bool> {
        Some(
            context
                .settings
                .credential
                .as_ref()
                .is_some_and(|credential| credential.is_usable()),
        )
    }

    async fn auth_status(&self) -> Option<AuthStatus> {
        let status = match self.credentials.credential().await {
            Ok(Some(credential)) if credential.is_usable() => AuthStatus {
                authenticated: true,
                details: Some("OAuth token valid".to_string()),
            },
            Ok(_) => AuthStatus {
                authenticated: false,
                details: Some("No valid OAuth token".to_string()),
            },
            Err(e) => AuthStatus {
                authenticated: false,
                details: Some(e.to_string()),
            },
        };
        Some(status)
    }
}

/// Map the logical chat endpoint onto the concrete codex responses endpoint.
/// URLs that are neither chat-completions nor responses pass through.
pub fn rewrite_url(url: &str, backend_url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url).trim_end_matches('/');
    if path.ends_with("/chat/completions") || path.ends_with("/responses") {
        format!("{}{}", backend_url.trim_end_matches('/'), CODEX_RESPONSES_PATH)
    } else {
        url.to_string()
    }
}

/// Build the body the codex endpoint expects from a caller request.
///
/// Reasoning and text options resolve request > per-model > caller-global >
/// built-in defaults.
pub fn transform_request(
    request: &ChatRequest,
    instructions: &str,
    context: &ExecutionContext,
) -> serde_json::Result<Value> {
    let mut request = request.clone();
    if context.settings.codex_mode {
        request.messages.retain(|message| message.role != "system");
    }

    let per_model = context.model_options.get(&request.model);
    let global = &context.user_options;

    let reasoning = request.reasoning.take().unwrap_or_default();
    request.reasoning = Some(ReasoningConfig {
        effort: Some(resolve_option(
            reasoning.effort,
            per_model.and_then(|o| o.reasoning_effort.as_ref()),
            global.reasoning_effort.as_ref(),
            DEFAULT_REASONING_EFFORT,
        )),
        summary: Some(resolve_option(
            reasoning.summary,
            per_model.and_then(|o| o.reasoning_summary.as_ref()),
            global.reasoning_summary.as_ref(),
            DEFAULT_REASONING_SUMMARY,
        )),
    });

    let text = request.text.take().unwrap_or_default();
    request.text = Some(TextConfig {
        verbosity: Some(resolve_option(
            text.verbosity,
            per_model.and_then(|o| o.text_verbosity.as_ref()),
            global.text_verbosity.as_ref(),
            DEFAULT_TEXT_VERBOSITY,
        )),
    });

    if request.include.is_none() {
        request.include = Some(
            per_model
                .and_then(|o| o.include.clone())
                .or_else(|| global.include.clone())
                .unwrap_or_else(|| DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect()),
        );
    }

    let mut body = serde_json::to_value(&request)?;
    if let Value::Object(fields) = &mut body {
        if let Some(messages) = fields.remove("messages") {
            fields.insert("input".to_string(), messages);
        }
        for field in STRIPPED_BODY_FIELDS {
            fields.remove(*field);
        }
        fields.insert("instructions".to_string(), json!(instructions));
        fields.insert("store".to_string(), json!(false));
        fields.insert("stream".to_string(), json!(true));
    }
    Ok(body)
}

fn resolve_option(
    from_request: Option<String>,
    per_model: Option<&String>,
    global: Option<&String>,
    default: &str,
) -> String {
    from_request
        .or_else(|| per_model.or(global).cloned())
        .unwrap_or_else(|| default.to_string())
}

fn codex_headers(access_token: &str, account_id: Option<&str>) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", access_token))
            .context("invalid bearer token header value")?,
    );
    if let Some(account_id) = account_id.filter(|id| !id.is_empty()) {
        headers.insert(
            HeaderName::from_static(ACCOUNT_ID_HEADER),
            HeaderValue::from_str(account_id).context("invalid account id header value")?,
        );
    }
    headers.insert(
        HeaderName::from_static(OPENAI_BETA_HEADER),
        HeaderValue::from_static(OPENAI_BETA_RESPONSES),
    );
    headers.insert(
        HeaderName::from_static(ORIGINATOR_HEADER),
        HeaderValue::from_static(ORIGINATOR_VALUE),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    Ok(headers)
}
