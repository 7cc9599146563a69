// Gateway module for backends - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod classify;
mod codex;
mod command;
mod decoder;
mod process;
mod registry;
mod selector;
mod traits;
mod types;

// Public re-exports - the ONLY way to access backends functionality
pub use classify::{classify_command_error, classify_http_error, failure_from_error};
pub use codex::{rewrite_url, transform_request, CodexBackend};
pub use command::{CommandBackend, OutputMode};
pub use decoder::StreamDecoder;
pub use process::{run_buffered, run_streaming, CommandSpec, ProcessOutput};
#[cfg(all(test, target_os = "linux"))]
pub use process::liveness;
pub use registry::{BackendRegistration, BackendRegistry};
pub use selector::select_backend;
pub use traits::Backend;
pub use types::{
    AuthStatus, BackendFailure, BackendRequest, BackendResponse, BackendResult, BackendSettings,
    ChatRequest, ContentItem, ExecutionContext, FailureCode, FailureKind, Message,
    MessageContent, ModelOptions, ReasoningConfig, TextConfig,
};
