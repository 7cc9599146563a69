use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backends::ModelOptions;
use crate::utils::SwitchyardError;
use crate::constants::{
    AUGMENT_BACKEND_ID, CODEX_BACKEND_ID, CURSOR_BACKEND_ID, DEFAULT_BACKEND_ID,
    DEFAULT_CLI_TIMEOUT_MS, DEFAULT_CODEX_BACKEND_URL, DEFAULT_CODEX_BASE_URL,
    DEFAULT_CODEX_TIMEOUT_MS, DEFAULT_FALLBACK_BACKEND_ID, DEFAULT_INSTRUCTIONS_URL,
    INSTRUCTIONS_CACHE_TTL_MS,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend routing and per-backend settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Reasoning/text options, global and per model
    #[serde(default)]
    pub options: OptionsConfig,

    /// Instruction prelude cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Where credentials come from
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl Config {
    /// Effective codex mode. `CODEX_MODE` in the environment beats the file.
    pub fn codex_mode(&self) -> bool {
        codex_mode_from(
            std::env::var("CODEX_MODE").ok().as_deref(),
            self.providers.codex.codex_mode,
        )
    }
}

/// Resolve codex mode from an optional `CODEX_MODE` value and the configured flag
pub fn codex_mode_from(env_value: Option<&str>, configured: bool) -> bool {
    match env_value {
        Some(value) => value == "1",
        None => configured,
    }
}

/// Routing policy and backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Backend used when the selector has nothing better
    pub default: String,
    /// Backend substituted once when the primary fails
    pub fallback: Option<String>,
    /// Master switch for the fallback hop
    pub auto_fallback: bool,
    /// Preference order for model-based selection
    pub priority: Vec<String>,
    #[serde(default)]
    pub codex: CodexConfig,
    #[serde(default = "CommandConfig::augment")]
    pub augment: CommandConfig,
    #[serde(default = "CommandConfig::cursor")]
    pub cursor: CommandConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_BACKEND_ID.to_string(),
            fallback: Some(DEFAULT_FALLBACK_BACKEND_ID.to_string()),
            auto_fallback: true,
            priority: vec![
                CODEX_BACKEND_ID.to_string(),
                AUGMENT_BACKEND_ID.to_string(),
                CURSOR_BACKEND_ID.to_string(),
            ],
            codex: CodexConfig::default(),
            augment: CommandConfig::augment(),
            cursor: CommandConfig::cursor(),
        }
    }
}

impl ProvidersConfig {
    /// Per-invocation deadline for a backend id
    pub fn timeout_for(&self, backend_id: &str) -> Duration {
        let millis = match backend_id {
            CODEX_BACKEND_ID => self.codex.timeout_ms,
            AUGMENT_BACKEND_ID => self.augment.timeout_ms,
            CURSOR_BACKEND_ID => self.cursor.timeout_ms,
            _ => DEFAULT_CLI_TIMEOUT_MS,
        };
        Duration::from_millis(millis)
    }
}

/// Remote API backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodexConfig {
    /// Logical endpoint base the request is written against
    pub base_url: String,
    /// Concrete backend base the logical endpoint is rewritten to
    pub backend_url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Account identifier sent with every request
    pub account_id: String,
    /// Replace caller system prompts with the fetched instruction prelude
    pub codex_mode: bool,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CODEX_BASE_URL.to_string(),
            backend_url: DEFAULT_CODEX_BACKEND_URL.to_string(),
            timeout_ms: DEFAULT_CODEX_TIMEOUT_MS,
            account_id: String::new(),
            codex_mode: true,
        }
    }
}

/// External command backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Path or name of the executable
    pub executable: String,
    /// Default arguments, placed before the verb
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child process
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Deadline for one invocation in milliseconds
    pub timeout_ms: u64,
    /// Decode stdout incrementally instead of buffering it
    #[serde(default)]
    pub streaming: bool,
    /// Environment overrides for the child process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CommandConfig {
    fn new(executable: &str, streaming: bool) -> Self {
        Self {
            executable: executable.to_string(),
            args: Vec::new(),
            cwd: None,
            timeout_ms: DEFAULT_CLI_TIMEOUT_MS,
            streaming,
            env: HashMap::new(),
        }
    }

    pub fn augment() -> Self {
        Self::new("augment", false)
    }

    pub fn cursor() -> Self {
        Self::new("cursor", true)
    }
}

/// Reasoning and text options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Applied to every model
    #[serde(default)]
    pub global: ModelOptions,
    /// Per-model overrides keyed by model name
    #[serde(default)]
    pub models: HashMap<String, ModelOptions>,
}

/// Instruction prelude cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory (platform cache dir when unset)
    pub dir: Option<PathBuf>,
    /// Where the instruction prelude is fetched from
    pub instructions_url: String,
    /// Freshness window in milliseconds
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            instructions_url: DEFAULT_INSTRUCTIONS_URL.to_string(),
            ttl_ms: INSTRUCTIONS_CACHE_TTL_MS,
        }
    }
}

impl CacheConfig {
    /// Configured directory, or ~/.cache/switchyard equivalent
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        if let Some(proj_dirs) = ProjectDirs::from("", "", "switchyard") {
            return Ok(proj_dirs.cache_dir().to_path_buf());
        }
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        Ok(PathBuf::from(home).join(".cache").join("switchyard"))
    }
}

/// Credential source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// JSON auth file holding the OAuth credential
    pub path: Option<PathBuf>,
}

/// Load configuration from multiple sources
pub fn load_config() -> Result<Config> {
    let global_config = get_config_dir()?.join("config.toml");
    let local_config = PathBuf::from(".switchyard/config.toml");

    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if global_config.exists() {
        figment = figment.merge(Toml::file(&global_config));
    }

    if local_config.exists() {
        figment = figment.merge(Toml::file(&local_config));
    }

    extract(figment)
}

/// Load configuration from an explicit file on top of the defaults
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(
            SwitchyardError::Config(format!("file not found: {}", path.display())).into(),
        );
    }
    let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(path));
    extract(figment)
}

fn extract(figment: Figment) -> Result<Config> {
    // SWITCHYARD_PROVIDERS__DEFAULT=cursor style overrides
    figment
        .merge(Env::prefixed("SWITCHYARD_").split("__"))
        .extract()
        .map_err(|e| SwitchyardError::Config(e.to_string()).into())
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "switchyard") {
        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        Ok(config_dir.to_path_buf())
    } else {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        let config_dir = PathBuf::from(home).join(".config").join("switchyard");
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = if let Some(p) = path {
        p
    } else {
        get_config_dir()?.join("config.toml")
    };

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default configuration file if it doesn't exist
pub fn init_config() -> Result<PathBuf> {
    let config_file = get_config_dir()?.join("config.toml");

    if !config_file.exists() {
        save_config(&Config::default(), Some(config_file.clone()))?;
    }

    Ok(config_file)
}
