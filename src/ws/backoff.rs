//! Reconnection backoff schedule.

use std::time::Duration;

use crate::ws::RegistryConfig;

// Shifts past this would overflow any realistic base delay anyway.
const MAX_EXPONENT: u32 = 20;

/// Delay before reconnect attempt number `attempt` (0-based).
///
/// `min(base * 2^attempt, max)`, plus up to `jitter_ms` of random jitter,
/// never exceeding `max_delay_ms`.
pub fn reconnect_delay(config: &RegistryConfig, attempt: u32) -> Duration {
    let exp = attempt.min(MAX_EXPONENT);
    let base = config.base_delay_ms.saturating_mul(1u64 << exp);

    let jitter = if config.jitter_ms > 0 {
        rand::random::<u64>() % (config.jitter_ms + 1)
    } else {
        0
    };

    let delay = base
        .min(config.max_delay_ms)
        .saturating_add(jitter)
        .min(config.max_delay_ms);
    Duration::from_millis(delay)
}

/// Whether another automatic attempt is allowed after `attempts` failures.
pub fn can_retry(config: &RegistryConfig, attempts: u32) -> bool {
    config.auto_reconnect && attempts < config.max_reconnect_attempts
}
