//! Reconnect configuration and exponential backoff.

use std::time::Duration;

use socket_tester_core::Settings;

/// Reconnect behavior of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub auto_reconnect: bool,
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ReconnectConfig {
    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            auto_reconnect: settings.auto_reconnect,
            base_delay: Duration::from_millis(settings.reconnect_delay),
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Delay before reconnect attempt `attempt` (1-indexed).
///
/// The formula is `base * 2^(attempt-1)`, saturating instead of overflowing.
#[must_use]
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.saturating_mul(multiplier)
}
