use crate::constants::{
    CODEX_BACKEND_ID, HARD_ROUTED_MODEL_TOKENS, KNOWN_BACKEND_IDS, ULTIMATE_FALLBACK_BACKEND_ID,
};

/// Pick a backend id for `model`. Always returns something.
///
/// 1. models carrying a hard-routed token go to codex
/// 2. first entry of `priority` that `is_registered` accepts
/// 3. `default_id` if it is a known backend id
/// 4. the ultimate fallback
pub fn select_backend(
    model: &str,
    priority: &[String],
    default_id: &str,
    is_registered: impl Fn(&str) -> bool,
) -> String {
    // Token match is case-sensitive
    if HARD_ROUTED_MODEL_TOKENS
        .iter()
        .any(|token| model.contains(token))
    {
        return CODEX_BACKEND_ID.to_string();
    }

    if let Some(id) = priority.iter().find(|id| is_registered(id)) {
        return id.clone();
    }

    if KNOWN_BACKEND_IDS.contains(&default_id) {
        return default_id.to_string();
    }

    ULTIMATE_FALLBACK_BACKEND_ID.to_string()
}
