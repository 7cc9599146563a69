use serde_json::json;

use super::dispatcher::{DispatchOutcome, Dispatcher};
use crate::backends::{BackendResult, ChatRequest, FailureCode};
use crate::constants::{DEFAULT_MODEL_NAME, METADATA_HEADER, MODEL_HEADER, PROVIDER_HEADER};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Transport-neutral HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpReply {
    fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())],
            body: body.to_string(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Map a dispatch outcome to an HTTP reply.
///
/// Success is always 200. A failure uses its numeric code as the status
/// when that is a valid HTTP status, else 500.
pub fn into_http_reply(outcome: &DispatchOutcome, model: &str) -> HttpReply {
    match &outcome.result {
        BackendResult::Success(response) => {
            let model = if model.is_empty() { DEFAULT_MODEL_NAME } else { model };
            let mut headers = vec![
                ("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()),
                (PROVIDER_HEADER.to_string(), outcome.backend_id.clone()),
                (MODEL_HEADER.to_string(), model.to_string()),
            ];
            if let Some(metadata) = &response.metadata {
                headers.push((
                    METADATA_HEADER.to_string(),
                    serde_json::Value::Object(metadata.clone()).to_string(),
                ));
            }
            HttpReply {
                status: 200,
                headers,
                body: response.content.clone(),
            }
        }
        BackendResult::Failure(failure) => {
            let status = match failure.code {
                Some(FailureCode::Status(code)) if (100..=599).contains(&code) => code,
                _ => 500,
            };
            HttpReply::json(
                status,
                json!({
                    "error": failure.message,
                    "provider": outcome.backend_id,
                    "code": failure.code,
                }),
            )
        }
    }
}

/// Entry point for a raw request body, as an HTTP handler would receive it
pub async fn handle_request_body(
    dispatcher: &Dispatcher,
    raw: Option<&str>,
    backend: Option<&str>,
) -> HttpReply {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return HttpReply::json(400, json!({"error": "Missing request body"}));
    };

    let request: ChatRequest = match serde_json::from_str(raw) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("Failed to parse request body: {}", e);
            return HttpReply::json(400, json!({"error": "Invalid request body"}));
        }
    };

    let outcome = dispatcher.dispatch(&request, backend).await;
    into_http_reply(&outcome, &request.model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{
        Backend, BackendFailure, BackendRegistry, BackendRequest, BackendResponse, FailureKind,
    };
    use crate::runtime::DispatchPolicy;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    fn outcome(result: BackendResult) -> DispatchOutcome {
        DispatchOutcome {
            backend_id: "augment".to_string(),
            result,
        }
    }

    fn body_json(reply: &HttpReply) -> Value {
        serde_json::from_str(&reply.body).unwrap()
    }

    #[test]
    fn test_success_reply_headers() {
        let mut metadata = Map::new();
        metadata.insert("exitCode".to_string(), json!(0));
        let reply = into_http_reply(
            &outcome(BackendResult::Success(BackendResponse {
                content: "answer".to_string(),
                metadata: Some(metadata),
                is_streaming: false,
            })),
            "gpt-4o",
        );

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, "answer");
        assert_eq!(reply.header("content-type"), Some("application/json"));
        assert_eq!(reply.header("X-Provider"), Some("augment"));
        assert_eq!(reply.header("X-Model"), Some("gpt-4o"));
        assert_eq!(reply.header("X-Metadata"), Some(r#"{"exitCode":0}"#));
    }

    #[test]
    fn test_success_without_metadata_or_model() {
        let reply = into_http_reply(
            &outcome(BackendResult::Success(BackendResponse {
                content: String::new(),
                metadata: None,
                is_streaming: true,
            })),
            "",
        );
        assert_eq!(reply.header("X-Model"), Some("default"));
        assert_eq!(reply.header("X-Metadata"), None);
    }

    #[test]
    fn test_failure_status_from_numeric_code() {
        let failure = BackendFailure::new(FailureKind::Api, "Codex API error: 429 slow down")
            .with_code(FailureCode::Status(429));
        let reply = into_http_reply(&outcome(failure.into()), "m");

        assert_eq!(reply.status, 429);
        assert_eq!(
            body_json(&reply),
            json!({"error": "Codex API error: 429 slow down", "provider": "augment", "code": 429})
        );
    }

    #[test]
    fn test_failure_without_usable_code_is_500() {
        let cases = [
            BackendFailure::new(FailureKind::Process, "spawn failed"),
            BackendFailure::new(FailureKind::Api, "odd").with_code(FailureCode::Text("E42".into())),
            BackendFailure::new(FailureKind::Api, "odd").with_code(FailureCode::Status(42)),
        ];
        for failure in cases {
            let reply = into_http_reply(&outcome(failure.clone().into()), "m");
            assert_eq!(reply.status, 500, "{}", failure);
            assert_eq!(body_json(&reply)["error"], json!(failure.message));
        }

        let reply = into_http_reply(
            &outcome(BackendFailure::new(FailureKind::Process, "x").into()),
            "m",
        );
        assert_eq!(body_json(&reply)["code"], Value::Null);
    }

    struct Echo;

    #[async_trait]
    impl Backend for Echo {
        fn id(&self) -> &str {
            "augment"
        }

        fn name(&self) -> &str {
            "Echo"
        }

        async fn execute(&self, request: &BackendRequest) -> BackendResult {
            BackendResult::Success(BackendResponse {
                content: request.body.prompt_text(),
                metadata: None,
                is_streaming: false,
            })
        }
    }

    fn echo_dispatcher() -> Dispatcher {
        let registry = Arc::new(BackendRegistry::new());
        registry.register("augment", "Echo", Arc::new(Echo));
        Dispatcher::new(
            registry,
            DispatchPolicy {
                default: "augment".to_string(),
                fallback: None,
                auto_fallback: false,
                priority: vec!["augment".to_string()],
            },
        )
    }

    #[tokio::test]
    async fn test_raw_body_errors() {
        let dispatcher = echo_dispatcher();

        let reply = handle_request_body(&dispatcher, None, None).await;
        assert_eq!(reply.status, 400);
        assert_eq!(body_json(&reply), json!({"error": "Missing request body"}));

        let reply = handle_request_body(&dispatcher, Some("{oops"), None).await;
        assert_eq!(reply.status, 400);
        assert_eq!(body_json(&reply), json!({"error": "Invalid request body"}));
    }

    #[tokio::test]
    async fn test_raw_body_dispatches() {
        let dispatcher = echo_dispatcher();
        let raw = r#"{"model":"local","messages":[{"role":"user","content":"ping"}]}"#;

        let reply = handle_request_body(&dispatcher, Some(raw), None).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, "ping");
        assert_eq!(reply.header("X-Model"), Some("local"));

        let reply = handle_request_body(&dispatcher, Some(raw), Some("missing")).await;
        assert_eq!(reply.status, 500);
        assert_eq!(body_json(&reply)["provider"], json!("missing"));
    }
}
