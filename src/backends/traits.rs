use async_trait::async_trait;

use super::types::{AuthStatus, BackendRequest, BackendResult, ExecutionContext};

/// Core trait that all backends must implement.
///
/// `execute` never fails in the `Result` sense: every fault is folded into
/// [`BackendResult::Failure`]. The two probes are optional capabilities;
/// `None` means the backend cannot answer them.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Unique registry identifier
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Run one request against this backend
    async fn execute(&self, request: &BackendRequest) -> BackendResult;

    /// Check whether the backend could serve requests with this context
    async fn validate_config(&self, _context: &ExecutionContext) -> Option<bool> {
        None
    }

    /// Report authentication / availability
    async fn auth_status(&self) -> Option<AuthStatus> {
        None
    }
}
