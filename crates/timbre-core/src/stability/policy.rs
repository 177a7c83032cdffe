//! Degrade/restore decision policy
//!
//! Pure decision logic, fed one latency sample at a time by the watchdog:
//!
//! - latency > fatal threshold → degrade, streak reset
//! - latency ≤ budget → streak + 1; `restore_after` consecutive in-budget
//!   packets while degraded → restore
//! - budget < latency ≤ fatal → streak reset (not bad enough to degrade,
//!   not good enough to count toward recovery)

use std::time::Duration;

use crate::types::{FATAL_LATENCY, LATENCY_BUDGET};

/// Default stabilization window: consecutive in-budget packets before restoring
pub const DEFAULT_RESTORE_AFTER_PACKETS: u32 = 50;

/// A state change requested by the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Degrade,
    Restore,
}

/// Debounced latency policy
#[derive(Debug, Clone)]
pub struct DegradePolicy {
    budget: Duration,
    fatal: Duration,
    restore_after: u32,
    streak: u32,
}

impl DegradePolicy {
    /// Policy with the standard 20 ms budget / 30 ms fatal thresholds
    pub fn new() -> Self {
        Self::with_thresholds(LATENCY_BUDGET, FATAL_LATENCY, DEFAULT_RESTORE_AFTER_PACKETS)
    }

    /// Policy with custom thresholds. `restore_after` is clamped to at least 1.
    pub fn with_thresholds(budget: Duration, fatal: Duration, restore_after: u32) -> Self {
        Self {
            budget,
            fatal: fatal.max(budget),
            restore_after: restore_after.max(1),
            streak: 0,
        }
    }

    /// Feed one measured packet latency.
    ///
    /// `degraded` is the currently committed mode; it decides whether an
    /// in-budget streak can trigger a restore.
    pub fn observe(&mut self, latency: Duration, degraded: bool) -> Option<Transition> {
        if latency > self.fatal {
            self.streak = 0;
            return if degraded { None } else { Some(Transition::Degrade) };
        }

        if latency > self.budget {
            self.streak = 0;
            return None;
        }

        self.streak = self.streak.saturating_add(1);
        if degraded && self.streak >= self.restore_after {
            self.streak = 0;
            return Some(Transition::Restore);
        }
        None
    }

    /// Current consecutive in-budget count
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Configured stabilization window
    pub fn restore_after(&self) -> u32 {
        self.restore_after
    }
}

impl Default for DegradePolicy {
    fn default() -> Self {
        Self::new()
    }
}
