// Gateway module for runtime - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod bootstrap;
mod dispatcher;
mod http;

// Public re-exports - the ONLY way to access runtime functionality
pub use bootstrap::{build_services, Services};
pub use dispatcher::{BackendStatus, DispatchOutcome, DispatchPolicy, Dispatcher};
pub use http::{handle_request_body, into_http_reply, HttpReply};
