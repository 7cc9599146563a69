// Gateway module for utils - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod errors;
mod logger;

// Public re-exports - the ONLY way to access utils functionality
pub use errors::SwitchyardError;
pub use logger::init_logger;

/// Result alias for fallible library I/O
pub type Result<T> = std::result::Result<T, SwitchyardError>;
