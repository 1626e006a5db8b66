//! Logging helpers
//!
//! Thin wrapper around `env_logger` so the binary and tests set up logging the
//! same way.

/// Initialize the global logger
///
/// `RUST_LOG`, when set, takes precedence over `level`.
///
/// # Parameters
///
/// * `level` - Default log filter, e.g. `info` or `mitm_proxy=debug`
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    env_logger::init_from_env(env);
}

/// Initialize the logger if no logger has been installed yet
///
/// Useful from tests, where several cases may race to set up logging.
pub fn try_init_logger(level: &str) -> bool {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .is_test(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_logger_is_idempotent() {
        // Only the first call may install the logger; the second must not panic
        let _ = try_init_logger("debug");
        assert!(!try_init_logger("debug"));
    }
}
