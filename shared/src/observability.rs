use crate::error::BoxError;
use tracing::Level;

/// Installs a JSON `tracing` subscriber for the whole process.
///
/// Timestamps are left to the Lambda log sink; span fields such as the request id
/// are attached to every event.
pub fn init_tracing(log_level: &str) -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .json()
        .with_max_level(parse_log_level(log_level))
        .with_target(false)
        .without_time()
        .try_init()
}

/// Maps `LOG_LEVEL` to a `tracing` level, falling back to `INFO` for unknown names.
pub fn parse_log_level(log_level: &str) -> Level {
    match log_level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" | "CRITICAL" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_log_level;
    use tracing::Level;

    #[test]
    fn should_parse_levels_case_insensitively() {
        assert_eq!(parse_log_level("debug"), Level::DEBUG);
        assert_eq!(parse_log_level("WARNING"), Level::WARN);
        assert_eq!(parse_log_level("Critical"), Level::ERROR);
        assert_eq!(parse_log_level("TRACE"), Level::TRACE);
    }

    #[test]
    fn when_level_is_unknown_should_default_to_info() {
        assert_eq!(parse_log_level("verbose"), Level::INFO);
        assert_eq!(parse_log_level(""), Level::INFO);
        assert_eq!(parse_log_level("10"), Level::INFO);
    }
}
