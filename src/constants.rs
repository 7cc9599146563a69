/// Constants module to avoid magic numbers in the codebase

// Backend Identifiers
pub const CODEX_BACKEND_ID: &str = "codex";
pub const AUGMENT_BACKEND_ID: &str = "augment";
pub const CURSOR_BACKEND_ID: &str = "cursor";
pub const KNOWN_BACKEND_IDS: &[&str] = &[CODEX_BACKEND_ID, AUGMENT_BACKEND_ID, CURSOR_BACKEND_ID];

pub const CODEX_BACKEND_NAME: &str = "OpenAI Codex (ChatGPT Backend)";
pub const AUGMENT_BACKEND_NAME: &str = "Augment CLI";
pub const CURSOR_BACKEND_NAME: &str = "Cursor CLI";

// Model names containing one of these are always routed to the codex backend
pub const HARD_ROUTED_MODEL_TOKENS: &[&str] = &["codex", "gpt-5"];
pub const ULTIMATE_FALLBACK_BACKEND_ID: &str = CODEX_BACKEND_ID;

// Routing Defaults
pub const DEFAULT_BACKEND_ID: &str = CODEX_BACKEND_ID;
pub const DEFAULT_FALLBACK_BACKEND_ID: &str = AUGMENT_BACKEND_ID;
pub const DEFAULT_MODEL_NAME: &str = "default";

// Network Configuration
pub const DEFAULT_CODEX_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CODEX_BACKEND_URL: &str = "https://chatgpt.com/backend-api";
pub const CODEX_RESPONSES_PATH: &str = "/codex/responses";
pub const DEFAULT_INSTRUCTIONS_URL: &str =
    "https://raw.githubusercontent.com/sst/opencode/main/packages/opencode/src/session/prompt/codex.txt";

// Headers
pub const ACCOUNT_ID_HEADER: &str = "chatgpt-account-id";
pub const OPENAI_BETA_HEADER: &str = "openai-beta";
pub const OPENAI_BETA_RESPONSES: &str = "responses=experimental";
pub const ORIGINATOR_HEADER: &str = "originator";
pub const ORIGINATOR_VALUE: &str = "codex_cli_rs";
pub const PROVIDER_HEADER: &str = "X-Provider";
pub const MODEL_HEADER: &str = "X-Model";
pub const METADATA_HEADER: &str = "X-Metadata";

// Timeouts
pub const DEFAULT_CODEX_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CLI_TIMEOUT_MS: u64 = 120_000;
pub const INSTRUCTIONS_FETCH_TIMEOUT_SECS: u64 = 15;
pub const VERSION_PROBE_TIMEOUT_MS: u64 = 10_000;
// Added to a backend's own deadline before the dispatcher gives up on it
pub const DISPATCH_TIMEOUT_GRACE_MS: u64 = 1_000;

// Instruction Cache
pub const INSTRUCTIONS_CACHE_FILE: &str = "codex-instructions.txt";
pub const INSTRUCTIONS_META_FILE: &str = "codex-instructions-meta.json";
pub const INSTRUCTIONS_CACHE_TTL_MS: u64 = 15 * 60 * 1000;

// Request Shaping
pub const DEFAULT_REASONING_EFFORT: &str = "medium";
pub const DEFAULT_REASONING_SUMMARY: &str = "auto";
pub const DEFAULT_TEXT_VERBOSITY: &str = "medium";
pub const DEFAULT_INCLUDE: &[&str] = &["reasoning.encrypted_content"];
pub const STRIPPED_BODY_FIELDS: &[&str] = &["max_output_tokens", "max_completion_tokens"];

// Error Reporting
pub const MAX_ERROR_BODY_CHARS: usize = 2000;
pub const PROCESS_READ_CHUNK_BYTES: usize = 8 * 1024;
