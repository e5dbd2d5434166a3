//! Controller tuning

use std::time::Duration;

use kube::runtime::controller::Action;

use crate::retry::backoff_delay;

/// Fixed requeue period while Keycloak is unreachable
pub const CONNECTION_RETRY_PERIOD: Duration = Duration::from_secs(10);

/// First delay after a failed reconciliation
pub const FAILURE_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Upper bound for the failure backoff
pub const FAILURE_BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Attempts per record write before a conflict is surfaced
pub const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// Reconciliations running in parallel per kind
pub const DEFAULT_CONCURRENCY: u16 = 4;

/// Window in which repeated triggers for one record are coalesced
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Settings shared by every reconciler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Requeue period while disconnected
    pub connection_retry_period: Duration,
    /// First failure backoff
    pub failure_backoff_base: Duration,
    /// Failure backoff cap
    pub failure_backoff_max: Duration,
    /// Attempts per record write
    pub conflict_retries: u32,
    /// Periodic re-sync after success; `None` waits for the next change
    pub success_requeue: Option<Duration>,
    /// Parallel reconciliations per kind
    pub concurrency: u16,
    /// Trigger coalescing window
    pub debounce: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            connection_retry_period: CONNECTION_RETRY_PERIOD,
            failure_backoff_base: FAILURE_BACKOFF_BASE,
            failure_backoff_max: FAILURE_BACKOFF_MAX,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            success_requeue: None,
            concurrency: DEFAULT_CONCURRENCY,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl ControllerConfig {
    /// Action after a successful reconciliation
    pub fn success_action(&self) -> Action {
        match self.success_requeue {
            Some(period) => Action::requeue(period),
            None => Action::await_change(),
        }
    }

    /// Action while Keycloak is unreachable
    pub fn disconnected_action(&self) -> Action {
        Action::requeue(self.connection_retry_period)
    }

    /// Delay before retrying a record that already failed `failures` times
    pub fn failure_backoff(&self, failures: i64) -> Duration {
        let attempt = u32::try_from(failures.max(0)).unwrap_or(u32::MAX);
        backoff_delay(
            self.failure_backoff_base,
            2.0,
            attempt,
            self.failure_backoff_max,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_requeues_after_ten_seconds() {
        let config = ControllerConfig::default();
        assert_eq!(
            config.disconnected_action(),
            Action::requeue(Duration::from_secs(10))
        );
    }

    #[test]
    fn success_waits_for_change_unless_resync_configured() {
        let config = ControllerConfig::default();
        assert_eq!(config.success_action(), Action::await_change());

        let config = ControllerConfig {
            success_requeue: Some(Duration::from_secs(600)),
            ..Default::default()
        };
        assert_eq!(
            config.success_action(),
            Action::requeue(Duration::from_secs(600))
        );
    }

    #[test]
    fn failure_backoff_doubles_and_caps() {
        let config = ControllerConfig::default();
        assert_eq!(config.failure_backoff(0), Duration::from_secs(1));
        assert_eq!(config.failure_backoff(1), Duration::from_secs(2));
        assert_eq!(config.failure_backoff(4), Duration::from_secs(16));
        assert_eq!(config.failure_backoff(9), Duration::from_secs(300));
        assert_eq!(config.failure_backoff(i64::MAX), Duration::from_secs(300));
        assert_eq!(config.failure_backoff(-3), Duration::from_secs(1));
    }
}
