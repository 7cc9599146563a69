use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use super::dispatcher::{DispatchPolicy, Dispatcher};
use crate::app::Config;
use crate::auth::{CredentialProvider, FileCredentials, StaticCredentials};
use crate::backends::{BackendRegistry, BackendSettings, CodexBackend, CommandBackend};
use crate::cache::InstructionCache;
use crate::constants::{
    AUGMENT_BACKEND_ID, AUGMENT_BACKEND_NAME, CODEX_BACKEND_ID, CODEX_BACKEND_NAME,
    CURSOR_BACKEND_ID, CURSOR_BACKEND_NAME,
};

/// Everything the command layer needs, wired from one configuration
pub struct Services {
    pub dispatcher: Dispatcher,
    pub instructions: Arc<InstructionCache>,
}

/// Build the registry, adapters and dispatcher described by `config`
pub fn build_services(config: &Config) -> Result<Services> {
    let cache_dir = config.cache.resolve_dir()?;
    let instructions = Arc::new(
        InstructionCache::new(
            config.cache.instructions_url.clone(),
            &cache_dir,
            Duration::from_millis(config.cache.ttl_ms),
        )
        .context("Failed to create instruction cache")?,
    );

    let credentials: Arc<dyn CredentialProvider> = match &config.credentials.path {
        Some(path) => Arc::new(FileCredentials::new(path)),
        None => Arc::new(StaticCredentials::none()),
    };

    let providers = &config.providers;
    let registry = Arc::new(BackendRegistry::new());
    registry.register(
        CODEX_BACKEND_ID,
        CODEX_BACKEND_NAME,
        Arc::new(
            CodexBackend::new(
                providers.codex.clone(),
                Arc::clone(&instructions),
                Arc::clone(&credentials),
            )
            .context("Failed to create codex backend")?,
        ),
    );
    registry.register(
        AUGMENT_BACKEND_ID,
        AUGMENT_BACKEND_NAME,
        Arc::new(CommandBackend::augment(providers.augment.clone())),
    );
    registry.register(
        CURSOR_BACKEND_ID,
        CURSOR_BACKEND_NAME,
        Arc::new(CommandBackend::cursor(providers.cursor.clone())),
    );

    let account_id = Some(providers.codex.account_id.clone()).filter(|id| !id.is_empty());
    let codex_mode = config.codex_mode();

    let mut dispatcher = Dispatcher::new(registry, DispatchPolicy::from(providers))
        .with_credentials(credentials)
        .with_options(config.options.global.clone(), config.options.models.clone());
    for id in [CODEX_BACKEND_ID, AUGMENT_BACKEND_ID, CURSOR_BACKEND_ID] {
        dispatcher = dispatcher.with_backend_settings(
            id,
            BackendSettings {
                timeout: providers.timeout_for(id),
                credential: None,
                account_id: account_id.clone(),
                codex_mode,
            },
        );
    }

    Ok(Services {
        dispatcher,
        instructions,
    })
}
