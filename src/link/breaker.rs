//! Circuit breaker and exponential backoff gate
//!
//! Shared by every outbound channel (poller, roster, server info, shutdown).
//! Consulted before each opportunity to call out; fed by the outcome of each
//! call.
//!
//! ```text
//! open, cool-down running      -> skip
//! open, cool-down elapsed      -> close, zero counter, allow (trial call)
//! closed, n > 0 failures       -> skip while now - last_failure < backoff(n)
//! closed, no failures          -> allow
//!
//! backoff(n) = min(base * 2^(n-1), max)
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;

/// Breaker tuning, resolved to `Duration`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(cfg: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: cfg.failure_threshold.max(1),
            cooldown: Duration::from_secs(cfg.cooldown_secs),
            backoff_base: Duration::from_secs(cfg.backoff_base_secs),
            backoff_max: Duration::from_secs(cfg.backoff_max_secs),
        }
    }
}

impl BreakerSettings {
    /// `min(base * 2^(failures-1), max)`; zero when there are no failures.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        // 2^31 * base already overflows any sane max; clamp the shift.
        let shift = (failures - 1).min(31);
        self.backoff_base
            .checked_mul(1u32 << shift)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}

#[derive(Debug, Default)]
struct CircuitState {
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    circuit_open: bool,
    /// Set after the first successful exchange (for the one-time connect log).
    ever_connected: bool,
}

/// Read-only copy of the breaker state for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub consecutive_failures: u32,
    pub circuit_open: bool,
}

/// Mutex-guarded failure counter with open/closed state.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    state: Mutex<CircuitState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(CircuitState::default()),
        }
    }

    // The state is plain counters, so a panic mid-update leaves nothing torn.
    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the caller should skip this outbound opportunity.
    pub fn should_skip(&self) -> bool {
        self.should_skip_at(Instant::now())
    }

    pub(crate) fn should_skip_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        let since_failure = state
            .last_failure_at
            .map_or(Duration::MAX, |t| now.saturating_duration_since(t));

        if state.circuit_open {
            if since_failure < self.settings.cooldown {
                return true;
            }
            state.circuit_open = false;
            state.consecutive_failures = 0;
            info!("🔄 Control plane cool-down over — retrying connection");
            return false;
        }

        if state.consecutive_failures > 0 {
            return since_failure < self.settings.backoff_for(state.consecutive_failures);
        }

        false
    }

    /// Record a successful exchange. Always closes the circuit.
    pub fn record_success(&self) {
        let mut state = self.lock();

        if !state.ever_connected {
            state.ever_connected = true;
            info!("✓ Connected to control plane");
        } else if state.consecutive_failures > 0 || state.circuit_open {
            info!(
                failures = state.consecutive_failures,
                "✓ Control plane connection recovered"
            );
        }

        state.consecutive_failures = 0;
        state.circuit_open = false;
    }

    /// Record a failed exchange; opens the circuit at the threshold.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub(crate) fn record_failure_at(&self, now: Instant) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = Some(now);

        if !state.circuit_open && state.consecutive_failures >= self.settings.failure_threshold {
            state.circuit_open = true;
            warn!(
                failures = state.consecutive_failures,
                cooldown_secs = self.settings.cooldown.as_secs(),
                "⚠️  Control plane unreachable — pausing outbound calls for {}s",
                self.settings.cooldown.as_secs()
            );
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            consecutive_failures: state.consecutive_failures,
            circuit_open: state.circuit_open,
        }
    }
}
