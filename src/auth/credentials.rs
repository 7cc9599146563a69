use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{Result, SwitchyardError};

/// Kind of credential stored in the auth file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Oauth,
    Api,
}

/// Bearer credential as written by the host's login flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    #[serde(default)]
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    /// Expiry in epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

impl Credential {
    pub fn oauth(access: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::Oauth,
            access: access.into(),
            refresh: None,
            expires: None,
        }
    }

    /// Only an OAuth credential with a non-empty access token can be sent
    pub fn is_usable(&self) -> bool {
        self.kind == CredentialKind::Oauth && !self.access.is_empty()
    }
}

/// Source of the bearer credential used by remote backends.
///
/// Token acquisition and refresh happen elsewhere; implementations only
/// hand out whatever is current.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self) -> Result<Option<Credential>>;
}

/// Fixed credential, or none
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    credential: Option<Credential>,
}

impl StaticCredentials {
    pub fn new(credential: Option<Credential>) -> Self {
        Self { credential }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credential(&self) -> Result<Option<Credential>> {
        Ok(self.credential.clone())
    }
}

/// Reads a JSON auth file on every call so refreshed tokens are picked up
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl CredentialProvider for FileCredentials {
    async fn credential(&self) -> Result<Option<Credential>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let credential = serde_json::from_str(&raw).map_err(|e| {
            SwitchyardError::Credential(format!(
                "Corrupt auth file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(credential))
    }
}
