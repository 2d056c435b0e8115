//! Per-connection hook configuration.

use crate::connection::AuthorizerDecision;

/// Configuration applied to the hooks of one [`SqliteConnection`].
///
/// Passed to [`SqliteConnection::establish_with_config`]. The defaults match
/// what [`SqliteConnection::establish`] uses.
///
/// ```rust
/// use sqlite_hooks::{AuthorizerDecision, HookConfig};
///
/// let config = HookConfig::default()
///     .with_authorizer_fallback(AuthorizerDecision::Deny)
///     .with_failure_log_capacity(8);
/// assert_eq!(config.authorizer_fallback, AuthorizerDecision::Deny);
/// ```
///
/// [`SqliteConnection`]: crate::SqliteConnection
/// [`SqliteConnection::establish`]: crate::SqliteConnection::establish
/// [`SqliteConnection::establish_with_config`]: crate::SqliteConnection::establish_with_config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct HookConfig {
    /// Decision handed to SQLite when the authorizer callback panics or is
    /// re-entered. Defaults to [`AuthorizerDecision::Allow`].
    pub authorizer_fallback: AuthorizerDecision,
    /// How many contained callback failures are kept per connection.
    /// The oldest entries are dropped first. `0` disables recording.
    pub failure_log_capacity: usize,
}

impl HookConfig {
    /// Default number of recorded hook failures.
    pub const DEFAULT_FAILURE_LOG_CAPACITY: usize = 64;

    /// Sets [`authorizer_fallback`](Self::authorizer_fallback).
    pub fn with_authorizer_fallback(mut self, decision: AuthorizerDecision) -> Self {
        self.authorizer_fallback = decision;
        self
    }

    /// Sets [`failure_log_capacity`](Self::failure_log_capacity).
    pub fn with_failure_log_capacity(mut self, capacity: usize) -> Self {
        self.failure_log_capacity = capacity;
        self
    }
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            authorizer_fallback: AuthorizerDecision::Allow,
            failure_log_capacity: Self::DEFAULT_FAILURE_LOG_CAPACITY,
        }
    }
}
