use parking_lot::RwLock;
use std::sync::Arc;

use super::traits::Backend;

/// One registered adapter
#[derive(Clone)]
pub struct BackendRegistration {
    pub id: String,
    pub name: String,
    pub backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for BackendRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistration")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Table of backend adapters keyed by identifier.
///
/// Entries are never removed. Registering an existing identifier replaces
/// the adapter in place and keeps its original position.
#[derive(Default)]
pub struct BackendRegistry {
    entries: RwLock<Vec<BackendRegistration>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &str, name: &str, backend: Arc<dyn Backend>) {
        let registration = BackendRegistration {
            id: id.to_string(),
            name: name.to_string(),
            backend,
        };

        let mut entries = self.entries.write();
        match entries.iter_mut().find(|entry| entry.id == id) {
            Some(existing) => {
                tracing::debug!("Replacing backend registration: {}", id);
                *existing = registration;
            }
            None => {
                tracing::debug!("Registered backend: {} ({})", id, name);
                entries.push(registration);
            }
        }
    }

    /// Adapter for `id`, or `None` when nothing is registered under it
    pub fn get(&self, id: &str) -> Option<Arc<dyn Backend>> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| Arc::clone(&entry.backend))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().iter().any(|entry| entry.id == id)
    }

    /// Snapshot of all registrations in registration order
    pub fn list(&self) -> Vec<BackendRegistration> {
        self.entries.read().clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.read().iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
