//! # Circuit Breaker
//!
//! Purpose: Stop probing and rebuilding against a host that keeps failing its
//! liveness check, so an outage degrades into fast failures instead of a
//! reconnect storm.
//!
//! ## States
//!
//! ```text
//!            F consecutive failures
//!   Closed ─────────────────────────▶ Open
//!     ▲                                │ cooldown elapsed
//!     │ trial succeeds                 ▼ (checked lazily on access)
//!     └─────────────────────────── HalfOpen ── trial fails ──▶ Open
//! ```
//!
//! ## Design Principles
//! 1. **Lazy Cooldown**: No timer thread; the trip time is compared against the
//!    injected `Clock` whenever the breaker is consulted.
//! 2. **Single Trial**: While half-open, exactly one permit is outstanding.
//! 3. **RAII Permits**: An unsettled permit frees its trial slot on drop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;

/// Default consecutive failures before the breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

/// Default time the breaker stays open before allowing a trial.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive probe failures that open the breaker.
    pub failure_threshold: u32,
    /// Time spent open before a half-open trial is allowed.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { trial_in_flight: bool },
}

/// Per-host failure gate.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    phase: Mutex<Phase>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        CircuitBreaker {
            config,
            clock,
            phase: Mutex::new(Phase::Closed { failures: 0 }),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, with an elapsed cooldown reported as half-open.
    pub fn state(&self) -> BreakerState {
        match *self.phase.lock() {
            Phase::Closed { .. } => BreakerState::Closed,
            Phase::Open { since } if self.cooled_down(since) => BreakerState::HalfOpen,
            Phase::Open { .. } => BreakerState::Open,
            Phase::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Consecutive failures counted while closed.
    pub fn consecutive_failures(&self) -> u32 {
        match *self.phase.lock() {
            Phase::Closed { failures } => failures,
            _ => 0,
        }
    }

    /// Asks to run one probe.
    ///
    /// Returns `None` while open (cooldown not elapsed) or while another
    /// caller holds the half-open trial.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { .. } => Some(BreakerPermit::new(self, false)),
            Phase::Open { since } if self.cooled_down(since) => {
                debug!("breaker cooldown elapsed, allowing trial probe");
                *phase = Phase::HalfOpen {
                    trial_in_flight: true,
                };
                Some(BreakerPermit::new(self, true))
            }
            Phase::Open { .. } => None,
            Phase::HalfOpen {
                trial_in_flight: true,
            } => None,
            Phase::HalfOpen {
                trial_in_flight: false,
            } => {
                *phase = Phase::HalfOpen {
                    trial_in_flight: true,
                };
                Some(BreakerPermit::new(self, true))
            }
        }
    }

    /// Forces the breaker back to closed.
    pub fn reset(&self) {
        *self.phase.lock() = Phase::Closed { failures: 0 };
    }

    fn cooled_down(&self, since: Instant) -> bool {
        self.clock.now().saturating_duration_since(since) >= self.config.cooldown
    }

    fn on_success(&self, trial: bool) {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { .. } => *phase = Phase::Closed { failures: 0 },
            Phase::HalfOpen { .. } if trial => {
                debug!("trial probe succeeded, closing breaker");
                *phase = Phase::Closed { failures: 0 };
            }
            // Stale success from a permit granted before the breaker opened.
            _ => {}
        }
    }

    /// Records a failure; returns true when this failure opened the breaker.
    fn on_failure(&self, trial: bool) -> bool {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { failures } => {
                let failures = failures.saturating_add(1);
                if failures >= self.config.failure_threshold {
                    debug!(failures, "failure threshold reached, opening breaker");
                    *phase = Phase::Open {
                        since: self.clock.now(),
                    };
                    true
                } else {
                    *phase = Phase::Closed { failures };
                    false
                }
            }
            Phase::HalfOpen { .. } if trial => {
                debug!("trial probe failed, reopening breaker");
                *phase = Phase::Open {
                    since: self.clock.now(),
                };
                true
            }
            _ => false,
        }
    }

    fn abandon_trial(&self) {
        let mut phase = self.phase.lock();
        if let Phase::HalfOpen { .. } = *phase {
            *phase = Phase::HalfOpen {
                trial_in_flight: false,
            };
        }
    }
}

/// Admission ticket for one probe.
///
/// Settle it with `success` or `failure`. Dropping it unsettled leaves the
/// breaker state unchanged and, for a half-open trial, lets the next caller
/// try instead.
#[must_use = "settle the permit with success() or failure()"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        BreakerPermit {
            breaker,
            trial,
            settled: false,
        }
    }

    /// True when this permit is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    /// Records the failure; returns true when it opened the breaker.
    pub fn failure(mut self) -> bool {
        self.settled = true;
        self.breaker.on_failure(self.trial)
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.abandon_trial();
        }
    }
}
