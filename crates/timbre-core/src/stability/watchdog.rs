//! Latency watchdog - the low-priority monitoring loop
//!
//! The audio thread posts each packet's measured latency into a wait-free
//! `rtrb` queue through a [`LatencyReporter`]. A dedicated thread drains the
//! queue every poll interval (~10 ms), runs the samples through a
//! [`DegradePolicy`] and commits transitions on the [`StabilityController`].
//!
//! ```text
//! audio thread ──push──► rtrb ──pop──► watchdog ──► StabilityController
//!                                                        │
//! audio thread ◄──────────── state() on next packet ─────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::{Consumer, Producer, RingBuffer};

use super::controller::StabilityController;
use super::policy::{DegradePolicy, Transition};

/// Default watchdog poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Latency samples buffered between polls (far more than one poll's worth of packets)
pub const LATENCY_QUEUE_CAPACITY: usize = 1024;

/// Create the audio-thread → watchdog latency queue
pub fn latency_channel(capacity: usize) -> (LatencyReporter, Consumer<Duration>) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    (
        LatencyReporter {
            producer,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        consumer,
    )
}

/// Audio-thread side of the latency queue. Never blocks.
pub struct LatencyReporter {
    producer: Producer<Duration>,
    dropped: Arc<AtomicU64>,
}

impl LatencyReporter {
    /// Post one packet latency. Returns false if the queue was full and the
    /// sample was dropped.
    #[inline]
    pub fn post(&mut self, latency: Duration) -> bool {
        match self.producer.push(latency) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Samples dropped because the watchdog fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drain every queued sample through the policy and commit transitions.
///
/// Returns the number of samples consumed.
pub fn drain_latencies(
    consumer: &mut Consumer<Duration>,
    policy: &mut DegradePolicy,
    controller: &StabilityController,
) -> usize {
    let mut consumed = 0;
    while let Ok(latency) = consumer.pop() {
        consumed += 1;
        match policy.observe(latency, controller.is_degraded()) {
            Some(Transition::Degrade) => {
                log::warn!(
                    "[WATCHDOG] Packet took {:.2}ms, forcing degradation",
                    latency.as_secs_f64() * 1000.0
                );
                controller.force_degradation();
            }
            Some(Transition::Restore) => {
                log::info!(
                    "[WATCHDOG] {} consecutive packets within budget, restoring",
                    policy.restore_after()
                );
                controller.restore_performance();
            }
            None => {}
        }
    }
    consumed
}

/// Handle to the running monitoring thread. Stops and joins on drop.
pub struct Watchdog {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawn the monitoring loop
    pub fn spawn(
        controller: Arc<StabilityController>,
        mut consumer: Consumer<Duration>,
        mut policy: DegradePolicy,
        poll_interval: Duration,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("timbre-watchdog".to_string())
                .spawn(move || {
                    // spawned from the (possibly elevated) engine thread
                    let _ = controller.set_background_priority();
                    log::info!(
                        "[WATCHDOG] Started (poll {:?}, restore after {} packets)",
                        poll_interval,
                        policy.restore_after()
                    );
                    while running.load(Ordering::Relaxed) {
                        drain_latencies(&mut consumer, &mut policy, &controller);
                        thread::sleep(poll_interval);
                    }
                    log::info!("[WATCHDOG] Stopped");
                })?
        };

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the loop is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signal the loop to stop and wait for it
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[WATCHDOG] Monitoring thread panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stability::EngineState;
    use std::time::Instant;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_drain_degrades_on_fatal_sample() {
        let controller = StabilityController::new();
        let (mut reporter, mut consumer) = latency_channel(16);
        let mut policy = DegradePolicy::new();

        reporter.post(ms(5));
        reporter.post(ms(42));
        assert_eq!(drain_latencies(&mut consumer, &mut policy, &controller), 2);
        assert!(controller.is_degraded());
    }

    #[test]
    fn test_drain_restores_after_window() {
        let controller = StabilityController::new();
        controller.force_degradation();
        let (mut reporter, mut consumer) = latency_channel(16);
        let mut policy = DegradePolicy::with_thresholds(ms(20), ms(30), 4);

        for _ in 0..4 {
            reporter.post(ms(8));
        }
        drain_latencies(&mut consumer, &mut policy, &controller);
        assert_eq!(controller.state(), EngineState::INITIAL);
    }

    #[test]
    fn test_reporter_drops_when_full() {
        let (mut reporter, _consumer) = latency_channel(2);
        assert!(reporter.post(ms(1)));
        assert!(reporter.post(ms(1)));
        assert!(!reporter.post(ms(1)));
        assert_eq!(reporter.dropped(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_watchdog_runs_below_elevated_spawner() {
        use std::os::unix::thread::JoinHandleExt;

        use crate::stability::scheduling_of;

        thread::spawn(|| {
            let controller = Arc::new(StabilityController::new());
            if controller.set_realtime_priority().is_err() {
                // unprivileged: the spawner cannot be elevated in the first place
                return;
            }
            let (_reporter, consumer) = latency_channel(4);
            let mut watchdog = Watchdog::spawn(
                Arc::clone(&controller),
                consumer,
                DegradePolicy::new(),
                Duration::from_millis(1),
            )
            .unwrap();
            let watchdog_thread = watchdog.handle.as_ref().unwrap().as_pthread_t();

            let deadline = Instant::now() + Duration::from_secs(2);
            while scheduling_of(watchdog_thread).0 == libc::SCHED_FIFO && Instant::now() < deadline
            {
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(scheduling_of(watchdog_thread), (libc::SCHED_OTHER, 0));

            // SAFETY: querying the calling thread
            let spawner = unsafe { libc::pthread_self() };
            assert_eq!(scheduling_of(spawner).0, libc::SCHED_FIFO);
            watchdog.stop();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_watchdog_thread_commits_degradation() {
        let controller = Arc::new(StabilityController::new());
        let (mut reporter, consumer) = latency_channel(16);
        let mut watchdog = Watchdog::spawn(
            Arc::clone(&controller),
            consumer,
            DegradePolicy::new(),
            Duration::from_millis(1),
        )
        .unwrap();

        reporter.post(ms(35));

        let deadline = Instant::now() + Duration::from_secs(2);
        while !controller.is_degraded() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(controller.is_degraded());

        watchdog.stop();
        assert!(!watchdog.is_running());
    }
}
