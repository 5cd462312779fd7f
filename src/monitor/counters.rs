//! Per-backend poll counters.

/// Log failures on every Nth poll only.
pub const LOG_EVERY: u64 = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecisionCounters {
    dials: u64,
    consecutive_unhealthy_checks: u64,
}

impl DecisionCounters {
    /// Count one poll. Returns whether this poll should log its failures.
    pub fn record_dial(&mut self) -> bool {
        let should_log = self.dials % LOG_EVERY == 0;
        self.dials = self.dials.wrapping_add(1);
        should_log
    }

    pub fn record_unhealthy(&mut self) {
        self.consecutive_unhealthy_checks = self.consecutive_unhealthy_checks.saturating_add(1);
    }

    pub fn reset_unhealthy(&mut self) {
        self.consecutive_unhealthy_checks = 0;
    }

    #[must_use]
    pub fn dials(&self) -> u64 {
        self.dials
    }

    #[must_use]
    pub fn consecutive_unhealthy_checks(&self) -> u64 {
        self.consecutive_unhealthy_checks
    }
}
