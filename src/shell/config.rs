//! Configuration resolution for shell sessions.
//!
//! Values resolve with a two-tier priority: environment variable first, then
//! the built-in default. Unparsable environment values are ignored.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_CONNECT_TIMEOUT` | 30s | Connection timeout in seconds |
//! | `SSH_MAX_RETRIES` | 3 | Maximum retry attempts for transient failures |
//! | `SSH_RETRY_DELAY_MS` | 1000ms | Initial retry delay in milliseconds |
//! | `SSH_COMPRESSION` | true | Enable zlib compression |
//! | `SSH_OUTPUT_LIMIT` | 1 MiB | Unread shell output kept per session, in bytes |
//! | `SHELL_COMMAND_TIMEOUT` | 10s | Bound on waiting for a command's prompt |
//! | `SHELL_POLL_INTERVAL_MS` | 100ms | Sleep between channel polls |
//! | `SHELL_SETTLE_MS` | 500ms | Wait before discarding the login banner |
//! | `SHELL_PROMPT_MARKER` | `__PROMPT__` | Sentinel installed as the shell prompt |

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default maximum retry attempts for SSH connection
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default retry delay in milliseconds
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Default bound on unread shell output in bytes
pub(crate) const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

/// Maximum retry delay cap
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Default bound on a single command execution in seconds
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

/// Default sleep between channel polls in milliseconds
pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default wait before discarding the login banner in milliseconds
pub(crate) const DEFAULT_SETTLE_MS: u64 = 500;

/// Default sentinel installed as the shell prompt
pub const DEFAULT_PROMPT_MARKER: &str = "__PROMPT__";

/// Default SSH port used when the user supplies none (or garbage)
pub const DEFAULT_SSH_PORT: u16 = 22;

pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";
pub(crate) const MAX_RETRIES_ENV_VAR: &str = "SSH_MAX_RETRIES";
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "SSH_RETRY_DELAY_MS";
pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_COMPRESSION";
pub(crate) const OUTPUT_LIMIT_ENV_VAR: &str = "SSH_OUTPUT_LIMIT";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "SHELL_COMMAND_TIMEOUT";
pub(crate) const POLL_INTERVAL_MS_ENV_VAR: &str = "SHELL_POLL_INTERVAL_MS";
pub(crate) const SETTLE_MS_ENV_VAR: &str = "SHELL_SETTLE_MS";
pub(crate) const PROMPT_MARKER_ENV_VAR: &str = "SHELL_PROMPT_MARKER";

/// Resolve a parsable value with priority: env var -> default
fn resolve_env<T: FromStr>(env_var: &str, default: T) -> T {
    if let Ok(raw) = env::var(env_var)
        && let Ok(value) = raw.trim().parse::<T>()
    {
        return value;
    }

    default
}

/// Resolve a boolean flag: "true" (any case) or "1" enable it
pub(crate) fn resolve_flag(env_var: &str, default: bool) -> bool {
    match env::var(env_var) {
        Ok(raw) => raw.eq_ignore_ascii_case("true") || raw == "1",
        Err(_) => default,
    }
}

/// Settings used when opening SSH connections.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub compress: bool,
    /// Unread shell output kept per channel; older bytes are dropped
    pub output_limit: usize,
}

impl ConnectSettings {
    /// Build settings from the environment.
    pub fn from_env() -> Self {
        Self {
            connect_timeout: Duration::from_secs(resolve_env(
                CONNECT_TIMEOUT_ENV_VAR,
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            max_retries: resolve_env(MAX_RETRIES_ENV_VAR, DEFAULT_MAX_RETRIES),
            retry_delay: Duration::from_millis(resolve_env(
                RETRY_DELAY_MS_ENV_VAR,
                DEFAULT_RETRY_DELAY_MS,
            )),
            compress: resolve_flag(COMPRESSION_ENV_VAR, true),
            output_limit: match resolve_env(OUTPUT_LIMIT_ENV_VAR, DEFAULT_OUTPUT_LIMIT) {
                0 => DEFAULT_OUTPUT_LIMIT,
                limit => limit,
            },
        }
    }
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            compress: true,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }
}

/// Settings governing shell sessions and command execution.
///
/// The command timeout is one global bound; it is not configurable per call.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub command_timeout: Duration,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub prompt_marker: String,
}

impl SessionConfig {
    /// Build settings from the environment.
    pub fn from_env() -> Self {
        let marker = resolve_env(PROMPT_MARKER_ENV_VAR, DEFAULT_PROMPT_MARKER.to_string());
        // An empty marker would match every buffer
        let prompt_marker = if marker.is_empty() {
            DEFAULT_PROMPT_MARKER.to_string()
        } else {
            marker
        };

        Self {
            command_timeout: Duration::from_secs(resolve_env(
                COMMAND_TIMEOUT_ENV_VAR,
                DEFAULT_COMMAND_TIMEOUT_SECS,
            )),
            poll_interval: Duration::from_millis(resolve_env(
                POLL_INTERVAL_MS_ENV_VAR,
                DEFAULT_POLL_INTERVAL_MS,
            )),
            settle_delay: Duration::from_millis(resolve_env(SETTLE_MS_ENV_VAR, DEFAULT_SETTLE_MS)),
            prompt_marker,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            prompt_marker: DEFAULT_PROMPT_MARKER.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // Serializes every test that touches process environment variables
    pub(crate) static ENV_TEST_MUTEX: once_cell::sync::Lazy<StdMutex<()>> =
        once_cell::sync::Lazy::new(|| StdMutex::new(()));

    /// SAFETY: Must be called while holding ENV_TEST_MUTEX.
    pub(crate) unsafe fn set_env(key: &str, value: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::set_var(key, value) };
    }

    /// SAFETY: Must be called while holding ENV_TEST_MUTEX.
    pub(crate) unsafe fn remove_env(key: &str) {
        // SAFETY: Caller ensures ENV_TEST_MUTEX is held
        unsafe { env::remove_var(key) };
    }

    mod connect_settings {
        use super::*;

        #[test]
        fn test_defaults_without_env() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(CONNECT_TIMEOUT_ENV_VAR);
                remove_env(MAX_RETRIES_ENV_VAR);
                remove_env(RETRY_DELAY_MS_ENV_VAR);
                remove_env(COMPRESSION_ENV_VAR);
                remove_env(OUTPUT_LIMIT_ENV_VAR);
            }
            let settings = ConnectSettings::from_env();
            assert_eq!(settings.connect_timeout, Duration::from_secs(30));
            assert_eq!(settings.max_retries, 3);
            assert_eq!(settings.retry_delay, Duration::from_millis(1000));
            assert!(settings.compress);
            assert_eq!(settings.output_limit, 1024 * 1024);
        }

        #[test]
        fn test_output_limit_override() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(OUTPUT_LIMIT_ENV_VAR, "65536");
            }
            let custom = ConnectSettings::from_env().output_limit;
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(OUTPUT_LIMIT_ENV_VAR, "0");
            }
            let zero = ConnectSettings::from_env().output_limit;
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(OUTPUT_LIMIT_ENV_VAR);
            }
            assert_eq!(custom, 65536);
            assert_eq!(zero, DEFAULT_OUTPUT_LIMIT);
        }

        #[test]
        fn test_env_overrides() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(CONNECT_TIMEOUT_ENV_VAR, "5");
                set_env(MAX_RETRIES_ENV_VAR, "0");
                set_env(COMPRESSION_ENV_VAR, "false");
            }
            let settings = ConnectSettings::from_env();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(CONNECT_TIMEOUT_ENV_VAR);
                remove_env(MAX_RETRIES_ENV_VAR);
                remove_env(COMPRESSION_ENV_VAR);
            }
            assert_eq!(settings.connect_timeout, Duration::from_secs(5));
            assert_eq!(settings.max_retries, 0);
            assert!(!settings.compress);
        }

        #[test]
        fn test_ignores_invalid_env() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(RETRY_DELAY_MS_ENV_VAR, "soon");
                set_env(MAX_RETRIES_ENV_VAR, "-1");
            }
            let settings = ConnectSettings::from_env();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(RETRY_DELAY_MS_ENV_VAR);
                remove_env(MAX_RETRIES_ENV_VAR);
            }
            assert_eq!(settings.retry_delay, Duration::from_millis(DEFAULT_RETRY_DELAY_MS));
            assert_eq!(settings.max_retries, DEFAULT_MAX_RETRIES);
        }

        #[test]
        fn test_compression_flag_accepts_one() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(COMPRESSION_ENV_VAR, "1");
            }
            let enabled = resolve_flag(COMPRESSION_ENV_VAR, false);
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMPRESSION_ENV_VAR);
            }
            assert!(enabled);
        }
    }

    mod session_config {
        use super::*;

        #[test]
        fn test_defaults_without_env() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(COMMAND_TIMEOUT_ENV_VAR);
                remove_env(POLL_INTERVAL_MS_ENV_VAR);
                remove_env(SETTLE_MS_ENV_VAR);
                remove_env(PROMPT_MARKER_ENV_VAR);
            }
            let config = SessionConfig::from_env();
            assert_eq!(config.command_timeout, Duration::from_secs(10));
            assert_eq!(config.poll_interval, Duration::from_millis(100));
            assert_eq!(config.settle_delay, Duration::from_millis(500));
            assert_eq!(config.prompt_marker, "__PROMPT__");
        }

        #[test]
        fn test_custom_marker() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(PROMPT_MARKER_ENV_VAR, "@@READY@@");
                set_env(COMMAND_TIMEOUT_ENV_VAR, "25");
            }
            let config = SessionConfig::from_env();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(PROMPT_MARKER_ENV_VAR);
                remove_env(COMMAND_TIMEOUT_ENV_VAR);
            }
            assert_eq!(config.prompt_marker, "@@READY@@");
            assert_eq!(config.command_timeout, Duration::from_secs(25));
        }

        #[test]
        fn test_blank_marker_falls_back() {
            let _guard = ENV_TEST_MUTEX.lock().unwrap();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                set_env(PROMPT_MARKER_ENV_VAR, "   ");
            }
            let config = SessionConfig::from_env();
            // SAFETY: Holding ENV_TEST_MUTEX, no concurrent env access
            unsafe {
                remove_env(PROMPT_MARKER_ENV_VAR);
            }
            assert_eq!(config.prompt_marker, DEFAULT_PROMPT_MARKER);
        }
    }

    #[test]
    fn test_max_retry_delay_is_reasonable() {
        assert!(MAX_RETRY_DELAY.as_secs() >= 5);
        assert!(MAX_RETRY_DELAY.as_secs() <= 60);
    }
}
