use super::types::{BackendFailure, FailureKind};

/// Map a command-line backend fault message to a failure kind.
///
/// Heuristic substring match on the lower-cased message.
pub fn classify_command_error(message: &str) -> FailureKind {
    let message = message.to_lowercase();
    if contains_any(&message, &["not found", "enoent", "permission", "eacces"]) {
        FailureKind::Process
    } else if contains_any(&message, &["timeout", "etimedout"]) {
        FailureKind::Network
    } else if contains_any(&message, &["invalid", "usage"]) {
        FailureKind::Validation
    } else {
        FailureKind::Api
    }
}

/// Map a remote API fault message to a failure kind
pub fn classify_http_error(message: &str) -> FailureKind {
    let message = message.to_lowercase();
    if contains_any(&message, &["unauthorized", "auth"]) {
        FailureKind::Auth
    } else if contains_any(&message, &["network", "fetch", "timeout", "connect"]) {
        FailureKind::Network
    } else if contains_any(&message, &["parse", "invalid", "validation"]) {
        FailureKind::Validation
    } else {
        FailureKind::Api
    }
}

/// Build a failure from a fault, keeping the full error chain as the message
pub fn failure_from_error(
    error: anyhow::Error,
    classify: fn(&str) -> FailureKind,
) -> BackendFailure {
    let message = format!("{:#}", error);
    BackendFailure::new(classify(&message), message).with_cause(error)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_table() {
        let cases = [
            ("spawn augment: command not found (ENOENT)", FailureKind::Process),
            ("ENOENT", FailureKind::Process),
            ("Permission denied (EACCES)", FailureKind::Process),
            ("process timeout after 500 ms", FailureKind::Network),
            ("connect ETIMEDOUT", FailureKind::Network),
            ("Invalid model name", FailureKind::Validation),
            ("Usage: cursor ask <prompt>", FailureKind::Validation),
            ("something odd happened", FailureKind::Api),
        ];
        for (message, expected) in cases {
            assert_eq!(classify_command_error(message), expected, "{message}");
        }
    }

    #[test]
    fn test_http_error_table() {
        let cases = [
            ("401 Unauthorized", FailureKind::Auth),
            ("missing auth header", FailureKind::Auth),
            ("error sending request: connection refused (connect)", FailureKind::Network),
            ("operation timeout", FailureKind::Network),
            ("failed to fetch instructions", FailureKind::Network),
            ("could not parse body", FailureKind::Validation),
            ("server said no", FailureKind::Api),
        ];
        for (message, expected) in cases {
            assert_eq!(classify_http_error(message), expected, "{message}");
        }
    }

    #[test]
    fn test_failure_keeps_cause_and_context_chain() {
        let error = anyhow::anyhow!("EACCES").context("Failed to start cursor");
        let failure = failure_from_error(error, classify_command_error);
        assert_eq!(failure.kind, FailureKind::Process);
        assert_eq!(failure.message, "Failed to start cursor: EACCES");
        assert!(failure.cause.is_some());
    }
}
