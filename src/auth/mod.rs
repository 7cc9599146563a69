// Gateway module for auth - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod credentials;

// Public re-exports - the ONLY way to access auth functionality
pub use credentials::{
    Credential, CredentialKind, CredentialProvider, FileCredentials, StaticCredentials,
};

#[cfg(test)]
pub use credentials::MockCredentialProvider;
