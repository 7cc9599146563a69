use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::classify::{classify_command_error, failure_from_error};
use super::process::{run_buffered, run_streaming, CommandSpec};
use super::traits::Backend;
use super::types::{
    AuthStatus, BackendRequest, BackendResponse, BackendResult, ChatRequest, ExecutionContext,
};
use crate::app::CommandConfig;
use crate::constants::{
    AUGMENT_BACKEND_ID, AUGMENT_BACKEND_NAME, CURSOR_BACKEND_ID, CURSOR_BACKEND_NAME,
    DEFAULT_MODEL_NAME, VERSION_PROBE_TIMEOUT_MS,
};

/// Subcommand every supported CLI answers prompts with
const ASK_VERB: &str = "ask";

/// How stdout is turned into content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Wait for exit, use trimmed stdout
    Buffered,
    /// Decode JSON/text lines as they arrive
    Streaming,
}

/// Backend that shells out to an external command-line tool
#[derive(Debug, Clone)]
pub struct CommandBackend {
    id: String,
    name: String,
    config: CommandConfig,
    mode: OutputMode,
}

impl CommandBackend {
    pub fn new(id: &str, name: &str, config: CommandConfig) -> Self {
        let mode = if config.streaming {
            OutputMode::Streaming
        } else {
            OutputMode::Buffered
        };
        Self {
            id: id.to_string(),
            name: name.to_string(),
            config,
            mode,
        }
    }

    /// Augment CLI, buffered output
    pub fn augment(config: CommandConfig) -> Self {
        Self::new(AUGMENT_BACKEND_ID, AUGMENT_BACKEND_NAME, config)
    }

    /// Cursor CLI, streaming output unless configured otherwise
    pub fn cursor(config: CommandConfig) -> Self {
        Self::new(CURSOR_BACKEND_ID, CURSOR_BACKEND_NAME, config)
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// `[defaults.., ask, prompt, --model m?, --reasoning-effort e?, --reasoning-summary s?]`
    pub fn build_args(&self, body: &ChatRequest) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push(ASK_VERB.to_string());
        args.push(body.prompt_text());

        if !body.model.is_empty() {
            args.push("--model".to_string());
            args.push(body.model.clone());
        }

        if let Some(reasoning) = &body.reasoning {
            if let Some(effort) = reasoning.effort.as_deref().filter(|e| !e.is_empty()) {
                args.push("--reasoning-effort".to_string());
                args.push(effort.to_string());
            }
            if let Some(summary) = reasoning.summary.as_deref().filter(|s| !s.is_empty()) {
                args.push("--reasoning-summary".to_string());
                args.push(summary.to_string());
            }
        }

        args
    }

    fn command_spec(&self, args: Vec<String>, timeout: Duration) -> CommandSpec {
        CommandSpec {
            program: self.config.executable.clone(),
            args,
            cwd: self.config.cwd.clone(),
            env: self.config.env.clone(),
            timeout,
        }
    }

    fn metadata(&self, model: &str, spec: &CommandSpec, exit_code: i32) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("provider".to_string(), json!(self.id));
        metadata.insert(
            "model".to_string(),
            json!(if model.is_empty() { DEFAULT_MODEL_NAME } else { model }),
        );
        metadata.insert("command".to_string(), json!(spec.command_line()));
        metadata.insert("exitCode".to_string(), json!(exit_code));
        if self.mode == OutputMode::Streaming {
            metadata.insert("streaming".to_string(), json!(true));
        }
        metadata
    }

    /// Whether `<executable> --version` runs and exits 0
    async fn probe_version(&self) -> bool {
        if which::which(&self.config.executable).is_err() {
            return false;
        }
        let spec = self.command_spec(
            vec!["--version".to_string()],
            Duration::from_millis(VERSION_PROBE_TIMEOUT_MS),
        );
        matches!(run_buffered(&spec).await, Ok(output) if output.exit_code == 0)
    }
}

#[async_trait]
impl Backend for CommandBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: &BackendRequest) -> BackendResult {
        let body = &request.body;
        let spec = self.command_spec(self.build_args(body), request.context.settings.timeout);
        tracing::debug!("{}: running {}", self.id, spec.program);

        let output = match self.mode {
            OutputMode::Buffered => run_buffered(&spec).await,
            OutputMode::Streaming => run_streaming(&spec).await,
        };

        match output {
            Ok(output) => {
                if output.exit_code != 0 {
                    tracing::warn!(
                        "{} exited with code {}: {}",
                        self.name,
                        output.exit_code,
                        output.stderr
                    );
                }
                BackendResult::Success(BackendResponse {
                    metadata: Some(self.metadata(&body.model, &spec, output.exit_code)),
                    content: output.stdout,
                    is_streaming: self.mode == OutputMode::Streaming,
                })
            }
            Err(e) => {
                tracing::error!("{} backend error: {:#}", self.name, e);
                BackendResult::Failure(failure_from_error(e, classify_command_error))
            }
        }
    }

    async fn validate_config(&self, _context: &ExecutionContext) -> Option<bool> {
        Some(self.probe_version().await)
    }

    async fn auth_status(&self) -> Option<AuthStatus> {
        let available = self.probe_version().await;
        Some(AuthStatus {
            authenticated: available,
            details: Some(if available {
                format!("{} available", self.name)
            } else {
                format!("{} not found", self.name)
            }),
        })
    }
}
