pub mod app;
pub mod auth;
pub mod backends;
pub mod cache;
pub mod cli;
pub mod constants;
pub mod runtime;
pub mod utils;

pub use app::{load_config, Config};
pub use backends::{Backend, BackendRegistry, BackendResult, ChatRequest};
pub use runtime::{Dispatcher, DispatchOutcome, DispatchPolicy};
pub use utils::SwitchyardError;
