//! Delegate tiers and benchmark-based selection

use std::fmt;
use std::time::Duration;

/// Compute target a backend runs on, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delegate {
    /// Dedicated signal processor / NPU
    Dsp,
    Gpu,
    /// Always available
    Cpu,
}

impl Delegate {
    /// All tiers in priority order
    pub const ALL: [Delegate; 3] = [Delegate::Dsp, Delegate::Gpu, Delegate::Cpu];

    /// Tie-break rank (higher wins)
    pub fn priority(&self) -> u8 {
        match self {
            Delegate::Dsp => 2,
            Delegate::Gpu => 1,
            Delegate::Cpu => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Delegate::Dsp => "DSP",
            Delegate::Gpu => "GPU",
            Delegate::Cpu => "CPU",
        }
    }
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A delegate with its measured benchmark latency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegateCandidate {
    pub delegate: Delegate,
    pub latency: Duration,
}

impl DelegateCandidate {
    pub fn new(delegate: Delegate, latency: Duration) -> Self {
        Self { delegate, latency }
    }
}

/// Pick the fastest candidate within `cutoff`.
///
/// Equal latencies go to the higher-priority tier. When nothing qualifies
/// the CPU tier is returned unconditionally (with its measured latency if
/// it was benchmarked, zero otherwise).
pub fn select_delegate(candidates: &[DelegateCandidate], cutoff: Duration) -> DelegateCandidate {
    candidates
        .iter()
        .filter(|c| c.latency <= cutoff)
        .min_by(|a, b| {
            a.latency
                .cmp(&b.latency)
                .then_with(|| b.delegate.priority().cmp(&a.delegate.priority()))
        })
        .copied()
        .unwrap_or_else(|| {
            candidates
                .iter()
                .find(|c| c.delegate == Delegate::Cpu)
                .copied()
                .unwrap_or(DelegateCandidate::new(Delegate::Cpu, Duration::ZERO))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUTOFF: Duration = Duration::from_millis(20);

    fn ms(delegate: Delegate, millis: u64) -> DelegateCandidate {
        DelegateCandidate::new(delegate, Duration::from_millis(millis))
    }

    #[test]
    fn test_all_over_cutoff_selects_cpu() {
        let candidates = [ms(Delegate::Dsp, 25), ms(Delegate::Gpu, 22), ms(Delegate::Cpu, 25)];
        let selected = select_delegate(&candidates, CUTOFF);
        assert_eq!(selected.delegate, Delegate::Cpu);
        assert_eq!(selected.latency, Duration::from_millis(25));
    }

    #[test]
    fn test_fastest_within_cutoff_wins() {
        let candidates = [ms(Delegate::Dsp, 15), ms(Delegate::Gpu, 18), ms(Delegate::Cpu, 25)];
        assert_eq!(select_delegate(&candidates, CUTOFF).delegate, Delegate::Dsp);

        let candidates = [ms(Delegate::Dsp, 19), ms(Delegate::Gpu, 12), ms(Delegate::Cpu, 14)];
        assert_eq!(select_delegate(&candidates, CUTOFF).delegate, Delegate::Gpu);
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let candidates = [ms(Delegate::Gpu, 20), ms(Delegate::Cpu, 30)];
        assert_eq!(select_delegate(&candidates, CUTOFF).delegate, Delegate::Gpu);
    }

    #[test]
    fn test_ties_resolved_by_priority() {
        let candidates = [ms(Delegate::Cpu, 10), ms(Delegate::Gpu, 10), ms(Delegate::Dsp, 10)];
        assert_eq!(select_delegate(&candidates, CUTOFF).delegate, Delegate::Dsp);

        let candidates = [ms(Delegate::Cpu, 10), ms(Delegate::Gpu, 10)];
        assert_eq!(select_delegate(&candidates, CUTOFF).delegate, Delegate::Gpu);
    }

    #[test]
    fn test_no_candidates_falls_back_to_cpu() {
        let selected = select_delegate(&[], CUTOFF);
        assert_eq!(selected.delegate, Delegate::Cpu);
        assert_eq!(selected.latency, Duration::ZERO);
    }
}
