//! Reconnection controller.
//!
//! Explicit state machine owning connection lifecycle policy: exponential
//! backoff with a cap, a bounded number of consecutive attempts, a one-shot
//! user-facing error report, and an auth short-circuit (an invalid
//! credential is never retried with the same token).
//!
//! State lives in fields, transitions are methods, and the pending backoff
//! timer is owned by the client event loop as a cancellable deadline — the
//! controller itself never sleeps.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::NotifyError;

/// Connection lifecycle states.
///
/// `Exhausted` is reached after the attempt ceiling or an auth failure;
/// leaving it requires manual intervention ([`ReconnectController::reset`],
/// driven by re-authentication).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Exhausted,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Exhausted => "EXHAUSTED",
        }
    }
}

/// What the caller should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Schedule another attempt after the next backoff delay.
    Retry,
    /// Stop retrying (ceiling hit, or auth-class failure).
    GiveUp,
}

/// Backoff tuning.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(crate::config::DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(crate::config::DEFAULT_MAX_DELAY_MS),
            max_attempts: crate::config::DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// `min(base_delay * 2^attempts, max_delay)`, saturating.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempts.min(32));
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(multiplier);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}

/// Connection lifecycle state machine.
pub struct ReconnectController {
    policy: ReconnectPolicy,
    state: ConnectionState,
    /// Consecutive failed attempts. Resets to 0 on success.
    attempts: u32,
    /// First-occurrence-only flag for the user-facing error report.
    error_reported: bool,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
            error_reported: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Ask for the delay before the next connect attempt, entering
    /// `Connecting`. Returns `None` once exhausted — nothing further may
    /// be scheduled.
    pub fn next_attempt(&mut self) -> Option<Duration> {
        if self.state == ConnectionState::Exhausted {
            return None;
        }
        self.state = ConnectionState::Connecting;
        let delay = self.policy.delay_for(self.attempts);
        debug!(
            attempts = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling connect attempt"
        );
        Some(delay)
    }

    /// A connect attempt succeeded: counter resets immediately.
    pub fn on_connected(&mut self) {
        info!(attempts = self.attempts, "push channel connected");
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    /// A connect attempt failed. Auth failures and the attempt ceiling
    /// both land in `Exhausted`.
    pub fn on_failure(&mut self, error: &NotifyError) -> FailureDisposition {
        self.attempts += 1;
        if error.is_auth() {
            warn!(error = %error, "auth failure, will not retry with the same credential");
            self.state = ConnectionState::Exhausted;
            return FailureDisposition::GiveUp;
        }
        if self.attempts >= self.policy.max_attempts {
            warn!(
                attempts = self.attempts,
                max = self.policy.max_attempts,
                "reconnect attempts exhausted"
            );
            self.state = ConnectionState::Exhausted;
            return FailureDisposition::GiveUp;
        }
        self.state = ConnectionState::Disconnected;
        FailureDisposition::Retry
    }

    /// An established connection dropped.
    pub fn on_disconnected(&mut self) {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Disconnected;
        }
    }

    /// One-shot gate for the user-facing error toast: true exactly once
    /// per session.
    pub fn should_report_error(&mut self) -> bool {
        !std::mem::replace(&mut self.error_reported, true)
    }

    /// Manual intervention (re-authentication): back to square one.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.attempts = 0;
        self.error_reported = false;
    }
}

/// Heuristic classification of server-sent error payloads. The push
/// endpoint reports auth problems as free-text protocol errors.
pub fn is_auth_error_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("auth")
        || lower.contains("credential")
        || lower.contains("token")
        || lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
}
