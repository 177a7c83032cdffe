//! Latency report

use std::fmt;
use std::time::Duration;

/// Per-run packet statistics
#[derive(Debug, Default)]
pub struct LatencyReport {
    latencies: Vec<Duration>,
    converted: usize,
    budget: Duration,
    fatal: Duration,
    /// Degrade/restore transitions seen by the stability controller
    pub transitions: u64,
    /// Mode at the end of the run
    pub final_mode: String,
}

impl LatencyReport {
    pub fn new(budget: Duration, fatal: Duration) -> Self {
        Self {
            budget,
            fatal,
            ..Default::default()
        }
    }

    pub fn record(&mut self, latency: Duration, converted: bool) {
        self.latencies.push(latency);
        if converted {
            self.converted += 1;
        }
    }

    pub fn packets(&self) -> usize {
        self.latencies.len()
    }

    pub fn converted(&self) -> usize {
        self.converted
    }

    pub fn over_budget(&self) -> usize {
        self.latencies.iter().filter(|&&l| l > self.budget).count()
    }

    pub fn over_fatal(&self) -> usize {
        self.latencies.iter().filter(|&&l| l > self.fatal).count()
    }

    /// Latency at quantile `q` (0.0..=1.0), nearest-rank
    pub fn percentile(&self, q: f64) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        let rank = (q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[rank]
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "packets      {}", self.packets())?;
        writeln!(
            f,
            "converted    {} ({} pass-through)",
            self.converted,
            self.packets() - self.converted
        )?;
        writeln!(
            f,
            "latency ms   min {:.3}  p50 {:.3}  p99 {:.3}  max {:.3}",
            ms(self.percentile(0.0)),
            ms(self.percentile(0.5)),
            ms(self.percentile(0.99)),
            ms(self.percentile(1.0))
        )?;
        writeln!(
            f,
            "over budget  {} (> {} ms), over fatal {} (> {} ms)",
            self.over_budget(),
            self.budget.as_millis(),
            self.over_fatal(),
            self.fatal.as_millis()
        )?;
        write!(
            f,
            "stability    {} transitions, final mode {}",
            self.transitions, self.final_mode
        )
    }
}
