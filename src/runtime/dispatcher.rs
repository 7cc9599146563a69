use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::app::ProvidersConfig;
use crate::auth::{CredentialProvider, StaticCredentials};
use crate::backends::{
    select_backend, AuthStatus, Backend, BackendFailure, BackendRegistry, BackendRequest,
    BackendResult, BackendSettings, ChatRequest, ExecutionContext, FailureKind, ModelOptions,
};
use crate::constants::DISPATCH_TIMEOUT_GRACE_MS;

/// Routing policy: who runs a request and who stands in when it fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub default: String,
    pub fallback: Option<String>,
    pub auto_fallback: bool,
    pub priority: Vec<String>,
}

impl From<&ProvidersConfig> for DispatchPolicy {
    fn from(providers: &ProvidersConfig) -> Self {
        Self {
            default: providers.default.clone(),
            fallback: providers.fallback.clone(),
            auto_fallback: providers.auto_fallback,
            priority: providers.priority.clone(),
        }
    }
}

/// Final result of one dispatch, tagged with the backend that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub backend_id: String,
    pub result: BackendResult,
}

/// Auth probe answer for one registered backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub id: String,
    pub name: String,
    pub authenticated: bool,
    pub details: Option<String>,
}

/// Runs one request end to end.
///
/// At most two adapter invocations happen per dispatch: the selected
/// backend, then (if it failed) the configured fallback, provided that is a
/// different backend.
pub struct Dispatcher {
    registry: Arc<BackendRegistry>,
    policy: DispatchPolicy,
    credentials: Arc<dyn CredentialProvider>,
    settings: HashMap<String, BackendSettings>,
    user_options: ModelOptions,
    model_options: HashMap<String, ModelOptions>,
}

impl Dispatcher {
    pub fn new(registry: Arc<BackendRegistry>, policy: DispatchPolicy) -> Self {
        Self {
            registry,
            policy,
            credentials: Arc::new(StaticCredentials::none()),
            settings: HashMap::new(),
            user_options: ModelOptions::default(),
            model_options: HashMap::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_backend_settings(mut self, id: &str, settings: BackendSettings) -> Self {
        self.settings.insert(id.to_string(), settings);
        self
    }

    pub fn with_options(
        mut self,
        global: ModelOptions,
        models: HashMap<String, ModelOptions>,
    ) -> Self {
        self.user_options = global;
        self.model_options = models;
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Backend id the selector picks for `model`
    pub fn select(&self, model: &str) -> String {
        select_backend(model, &self.policy.priority, &self.policy.default, |id| {
            self.registry.contains(id)
        })
    }

    /// Run `request` on `backend` (or the selected backend), falling back once
    pub async fn dispatch(&self, request: &ChatRequest, backend: Option<&str>) -> DispatchOutcome {
        let primary_id = match backend {
            Some(id) => id.to_string(),
            None => self.select(&request.model),
        };

        let Some(primary) = self.registry.get(&primary_id) else {
            tracing::warn!("Backend not found: {}", primary_id);
            return not_found(primary_id);
        };

        tracing::debug!(
            "Dispatching model {:?} to backend {}",
            request.model,
            primary_id
        );
        let result = self.invoke(&primary_id, primary, request).await;

        if result.is_success() {
            return DispatchOutcome {
                backend_id: primary_id,
                result,
            };
        }
        if let Some(failure) = result.failure() {
            tracing::error!("Backend {} failed: {}", primary_id, failure);
        }

        let Some(fallback_id) = self.fallback_for(&primary_id) else {
            return DispatchOutcome {
                backend_id: primary_id,
                result,
            };
        };

        tracing::info!("Falling back from {} to {}", primary_id, fallback_id);
        let Some(fallback) = self.registry.get(&fallback_id) else {
            tracing::warn!("Fallback backend not found: {}", fallback_id);
            return not_found(fallback_id);
        };

        let result = self.invoke(&fallback_id, fallback, request).await;
        if let Some(failure) = result.failure() {
            tracing::error!("Fallback backend {} failed: {}", fallback_id, failure);
        }
        DispatchOutcome {
            backend_id: fallback_id,
            result,
        }
    }

    /// Auth probe of every registered backend, in registration order
    pub async fn backend_statuses(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::new();
        for registration in self.registry.list() {
            let status = registration
                .backend
                .auth_status()
                .await
                .unwrap_or(AuthStatus {
                    authenticated: false,
                    details: None,
                });
            statuses.push(BackendStatus {
                id: registration.id,
                name: registration.name,
                authenticated: status.authenticated,
                details: status.details,
            });
        }
        statuses
    }

    /// The one permitted substitute for a failed backend, if any
    fn fallback_for(&self, failed_id: &str) -> Option<String> {
        if !self.policy.auto_fallback {
            return None;
        }
        self.policy
            .fallback
            .as_deref()
            .filter(|fallback| !fallback.is_empty() && *fallback != failed_id)
            .map(str::to_string)
    }

    async fn context_for(&self, backend_id: &str, request: &ChatRequest) -> ExecutionContext {
        let mut settings = self.settings.get(backend_id).cloned().unwrap_or_default();
        match self.credentials.credential().await {
            Ok(credential) => settings.credential = credential,
            Err(e) => tracing::warn!("Credential provider failed: {}", e),
        }

        ExecutionContext {
            original_model: request.model.clone(),
            user_options: self.user_options.clone(),
            model_options: self.model_options.clone(),
            settings,
        }
    }

    async fn invoke(
        &self,
        backend_id: &str,
        backend: Arc<dyn Backend>,
        request: &ChatRequest,
    ) -> BackendResult {
        let context = self.context_for(backend_id, request).await;
        let deadline = context.settings.timeout + Duration::from_millis(DISPATCH_TIMEOUT_GRACE_MS);
        let backend_request = BackendRequest {
            body: request.clone(),
            context,
        };

        let call = AssertUnwindSafe(backend.execute(&backend_request)).catch_unwind();
        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let message = format!(
                    "Unexpected error from {}: {}",
                    backend.name(),
                    panic_message(panic.as_ref())
                );
                tracing::error!("{}", message);
                BackendFailure::new(FailureKind::Process, message.clone())
                    .with_cause(anyhow::anyhow!(message))
                    .into()
            }
            Err(_) => {
                let message = format!(
                    "{}: dispatch timeout after {} ms",
                    backend_id,
                    deadline.as_millis()
                );
                tracing::error!("{}", message);
                BackendFailure::new(FailureKind::Network, message).into()
            }
        }
    }
}

fn not_found(backend_id: String) -> DispatchOutcome {
    let result =
        BackendFailure::new(FailureKind::Validation, format!("Backend not found: {}", backend_id))
            .into();
    DispatchOutcome { backend_id, result }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, MockCredentialProvider};
    use crate::backends::{run_buffered, BackendResponse, CommandSpec};
    use crate::utils::SwitchyardError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Succeed(&'static str),
        Fail(FailureKind),
        Panic,
        Hang,
        EchoCredential,
        /// Runs a shell script with its own one minute deadline
        Spawn(String),
    }

    struct FakeBackend {
        id: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(id: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                id,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn success(content: &str) -> BackendResult {
        BackendResult::Success(BackendResponse {
            content: content.to_string(),
            metadata: None,
            is_streaming: false,
        })
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn id(&self) -> &str {
            self.id
        }

        fn name(&self) -> &str {
            self.id
        }

        async fn execute(&self, request: &BackendRequest) -> BackendResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(content) => success(content),
                Behavior::Fail(kind) => {
                    BackendFailure::new(*kind, format!("{} failed", self.id)).into()
                }
                Behavior::Panic => panic!("adapter blew up"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    success("too late")
                }
                Behavior::EchoCredential => success(
                    request
                        .context
                        .settings
                        .credential
                        .as_ref()
                        .map(|c| c.access.as_str())
                        .unwrap_or("none"),
                ),
                Behavior::Spawn(script) => {
                    let spec = CommandSpec {
                        program: "sh".to_string(),
                        args: vec!["-c".to_string(), script.clone()],
                        cwd: None,
                        env: HashMap::new(),
                        timeout: Duration::from_secs(60),
                    };
                    match run_buffered(&spec).await {
                        Ok(output) => success(&output.stdout),
                        Err(e) => BackendFailure::new(FailureKind::Process, e.to_string()).into(),
                    }
                }
            }
        }
    }

    fn policy(default: &str, fallback: Option<&str>) -> DispatchPolicy {
        DispatchPolicy {
            default: default.to_string(),
            fallback: fallback.map(str::to_string),
            auto_fallback: true,
            priority: vec![default.to_string()],
        }
    }

    fn dispatcher(backends: &[Arc<FakeBackend>], policy: DispatchPolicy) -> Dispatcher {
        let registry = Arc::new(BackendRegistry::new());
        for backend in backends {
            registry.register(backend.id, backend.id, backend.clone());
        }
        Dispatcher::new(registry, policy)
    }

    fn request() -> ChatRequest {
        ChatRequest::new("unrelated-model", "hello")
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let a = FakeBackend::new("augment", Behavior::Succeed("from a"));
        let b = FakeBackend::new("cursor", Behavior::Succeed("from b"));
        let dispatcher = dispatcher(&[a.clone(), b.clone()], policy("augment", Some("cursor")));

        let outcome = dispatcher.dispatch(&request(), None).await;
        assert_eq!(outcome.backend_id, "augment");
        assert_eq!(outcome.result, success("from a"));
        assert_eq!((a.calls(), b.calls()), (1, 0));
    }

    #[tokio::test]
    async fn test_failure_falls_back_once() {
        let a = FakeBackend::new("augment", Behavior::Fail(FailureKind::Process));
        let b = FakeBackend::new("cursor", Behavior::Succeed("from b"));
        let dispatcher = dispatcher(&[a.clone(), b.clone()], policy("augment", Some("cursor")));

        let outcome = dispatcher.dispatch(&request(), None).await;
        assert_eq!(outcome.backend_id, "cursor");
        assert_eq!(outcome.result, success("from b"));
        assert_eq!((a.calls(), b.calls()), (1, 1));
    }

    #[tokio::test]
    async fn test_both_failing_returns_fallback_result_without_third_call() {
        let a = FakeBackend::new("augment", Behavior::Fail(FailureKind::Api));
        let b = FakeBackend::new("cursor", Behavior::Fail(FailureKind::Network));
        let dispatcher = dispatcher(&[a.clone(), b.clone()], policy("augment", Some("cursor")));

        let outcome = dispatcher.dispatch(&request(), None).await;
        assert_eq!(
            outcome.result,
            BackendResult::Failure(BackendFailure::new(FailureKind::Network, "cursor failed"))
        );
        assert_eq!((a.calls(), b.calls()), (1, 1));
    }

    #[tokio::test]
    async fn test_failing_fallback_backend_is_not_retried() {
        let b = FakeBackend::new("cursor", Behavior::Fail(FailureKind::Api));
        let dispatcher = dispatcher(&[b.clone()], policy("cursor", Some("cursor")));

        let outcome = dispatcher.dispatch(&request(), Some("cursor")).await;
        assert_eq!(outcome.result.failure().unwrap().kind, FailureKind::Api);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_validation_failures_also_fall_back() {
        let a = FakeBackend::new("augment", Behavior::Fail(FailureKind::Validation));
        let b = FakeBackend::new("cursor", Behavior::Succeed("ok"));
        let dispatcher = dispatcher(&[a.clone(), b.clone()], policy("augment", Some("cursor")));

        let outcome = dispatcher.dispatch(&request(), None).await;
        assert!(outcome.result.is_success());
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_auto_fallback_disabled() {
        let a = FakeBackend::new("augment", Behavior::Fail(FailureKind::Api));
        let b = FakeBackend::new("cursor", Behavior::Succeed("unused"));
        let mut policy = policy("augment", Some("cursor"));
        policy.auto_fallback = false;
        let dispatcher = dispatcher(&[a.clone(), b.clone()], policy);

        let outcome = dispatcher.dispatch(&request(), None).await;
        assert_eq!(outcome.backend_id, "augment");
        assert!(!outcome.result.is_success());
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_backend_is_validation_failure_without_invocation() {
        let a = FakeBackend::new("augment", Behavior::Succeed("a"));
        let b = FakeBackend::new("cursor", Behavior::Succeed("b"));
        let dispatcher = dispatcher(&[a.clone(), b.clone()], policy("augment", Some("cursor")));

        let outcome = dispatcher.dispatch(&request(), Some("nonexistent")).await;
        let failure = outcome.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(failure.message, "Backend not found: nonexistent");
        assert_eq!((a.calls(), b.calls()), (0, 0));
    }

    #[tokio::test]
    async fn test_unregistered_fallback_reports_validation() {
        let a = FakeBackend::new("augment", Behavior::Fail(FailureKind::Api));
        let dispatcher = dispatcher(&[a.clone()], policy("augment", Some("cursor")));

        let outcome = dispatcher.dispatch(&request(), None).await;
        assert_eq!(outcome.backend_id, "cursor");
        assert_eq!(outcome.result.failure().unwrap().kind, FailureKind::Validation);
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_process_failure() {
        let a = FakeBackend::new("augment", Behavior::Panic);
        let dispatcher = dispatcher(&[a.clone()], policy("augment", None));

        let outcome = dispatcher.dispatch(&request(), None).await;
        let failure = outcome.result.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Process);
        assert!(failure.message.contains("adapter blew up"), "{}", failure.message);
        assert!(failure.cause.is_some());
    }

    #[tokio::test]
    async fn test_hung_backend_times_out_and_falls_back() {
        let a = FakeBackend::new("augment", Behavior::Hang);
        let b = FakeBackend::new("cursor", Behavior::Succeed("rescued"));
        let dispatcher = dispatcher(&[a.clone(), b.clone()], policy("augment", Some("cursor")))
            .with_backend_settings(
                "augment",
                BackendSettings {
                    timeout: Duration::from_millis(50),
                    ..BackendSettings::default()
                },
            );

        let outcome = tokio::time::timeout(Duration::from_secs(10), dispatcher.dispatch(&request(), None))
            .await
            .unwrap();
        assert_eq!(outcome.result, success("rescued"));
        assert_eq!((a.calls(), b.calls()), (1, 1));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_outer_deadline_leaves_no_subprocess_behind() {
        use crate::backends::liveness::{read_pid, wait_until_gone, wrapper_script};

        let temp_dir = tempfile::TempDir::new().unwrap();
        let a = FakeBackend::new("augment", Behavior::Spawn(wrapper_script(temp_dir.path())));
        let b = FakeBackend::new("cursor", Behavior::Succeed("rescued"));
        let dispatcher = dispatcher(&[a.clone(), b.clone()], policy("augment", Some("cursor")))
            .with_backend_settings(
                "augment",
                BackendSettings {
                    timeout: Duration::from_millis(200),
                    ..BackendSettings::default()
                },
            );

        let outcome = tokio::time::timeout(Duration::from_secs(10), dispatcher.dispatch(&request(), None))
            .await
            .unwrap();
        assert_eq!(outcome.result, success("rescued"));

        let leader = read_pid(&temp_dir.path().join("leader"));
        let worker = read_pid(&temp_dir.path().join("worker"));
        assert!(wait_until_gone(leader).await, "leader {leader} still running");
        assert!(wait_until_gone(worker).await, "worker {worker} still running");
    }

    #[tokio::test]
    async fn test_selection_routes_hard_tokens_to_codex() {
        let codex = FakeBackend::new("codex", Behavior::Succeed("codex"));
        let cursor = FakeBackend::new("cursor", Behavior::Succeed("cursor"));
        let mut policy = policy("cursor", None);
        policy.priority = vec!["cursor".to_string(), "codex".to_string()];
        let dispatcher = dispatcher(&[codex.clone(), cursor.clone()], policy);

        let outcome = dispatcher
            .dispatch(&ChatRequest::new("gpt-5-codex", "hi"), None)
            .await;
        assert_eq!(outcome.backend_id, "codex");

        let outcome = dispatcher.dispatch(&request(), None).await;
        assert_eq!(outcome.backend_id, "cursor");
    }

    #[tokio::test]
    async fn test_credential_flows_into_context() {
        let a = FakeBackend::new("augment", Behavior::EchoCredential);
        let mut credentials = MockCredentialProvider::new();
        credentials
            .expect_credential()
            .times(1)
            .returning(|| Ok(Some(Credential::oauth("tok-9"))));
        let dispatcher =
            dispatcher(&[a], policy("augment", None)).with_credentials(Arc::new(credentials));

        let outcome = dispatcher.dispatch(&request(), None).await;
        assert_eq!(outcome.result, success("tok-9"));
    }

    #[tokio::test]
    async fn test_credential_errors_mean_no_credential() {
        let a = FakeBackend::new("augment", Behavior::EchoCredential);
        let mut credentials = MockCredentialProvider::new();
        credentials
            .expect_credential()
            .returning(|| Err(SwitchyardError::Credential("corrupt".to_string())));
        let dispatcher =
            dispatcher(&[a], policy("augment", None)).with_credentials(Arc::new(credentials));

        let outcome = dispatcher.dispatch(&request(), None).await;
        assert_eq!(outcome.result, success("none"));
    }

    #[tokio::test]
    async fn test_backend_statuses_default_to_unauthenticated() {
        let a = FakeBackend::new("augment", Behavior::Succeed("a"));
        let dispatcher = dispatcher(&[a], policy("augment", None));

        assert_eq!(
            dispatcher.backend_statuses().await,
            vec![BackendStatus {
                id: "augment".to_string(),
                name: "augment".to_string(),
                authenticated: false,
                details: None,
            }]
        );
    }
}
