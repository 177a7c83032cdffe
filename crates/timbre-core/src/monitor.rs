//! Sidetone monitor - processed voice routed back to the user's headphones
//!
//! The audio thread pushes every processed packet into a lock-free SPSC
//! ring; a playback callback on another thread drains it. Neither side
//! blocks: the sender drops samples the ring cannot hold, the tap pads
//! underruns with silence.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::types::Sample;

/// Default ring capacity in samples (~85 ms at 48 kHz)
pub const DEFAULT_SIDETONE_CAPACITY: usize = 4096;

/// Create a connected sender/tap pair
pub fn sidetone_channel(capacity: usize) -> (SidetoneSender, SidetoneTap) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    (
        SidetoneSender {
            producer,
            dropped: 0,
        },
        SidetoneTap { consumer },
    )
}

/// Audio-thread end
pub struct SidetoneSender {
    producer: Producer<Sample>,
    dropped: u64,
}

impl SidetoneSender {
    /// Push as much of `samples` as fits; returns the number pushed
    pub fn push(&mut self, samples: &[Sample]) -> usize {
        let count = samples.len().min(self.producer.slots());
        if let Ok(chunk) = self.producer.write_chunk_uninit(count) {
            chunk.fill_from_iter(samples[..count].iter().copied());
        }
        self.dropped += (samples.len() - count) as u64;
        count
    }

    /// Samples discarded because the ring was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Whether the tap has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

/// Playback-thread end
pub struct SidetoneTap {
    consumer: Consumer<Sample>,
}

impl SidetoneTap {
    /// Fill `out` from the ring, padding with silence on underrun.
    ///
    /// Returns how many samples came from the ring.
    pub fn fill(&mut self, out: &mut [Sample]) -> usize {
        let count = out.len().min(self.consumer.slots());
        if let Ok(chunk) = self.consumer.read_chunk(count) {
            let (first, second) = chunk.as_slices();
            out[..first.len()].copy_from_slice(first);
            out[first.len()..count].copy_from_slice(second);
            chunk.commit_all();
        }
        out[count..].iter_mut().for_each(|s| *s = 0.0);
        count
    }

    /// Samples waiting in the ring
    pub fn available(&self) -> usize {
        self.consumer.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_reads_pushed_samples() {
        let (mut tx, mut rx) = sidetone_channel(16);
        assert_eq!(tx.push(&[0.1, 0.2, 0.3]), 3);
        assert_eq!(rx.available(), 3);

        let mut out = [9.0; 3];
        assert_eq!(rx.fill(&mut out), 3);
        assert_eq!(out, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_underrun_pads_with_silence() {
        let (mut tx, mut rx) = sidetone_channel(16);
        tx.push(&[0.5, 0.5]);
        let mut out = [9.0; 5];
        assert_eq!(rx.fill(&mut out), 2);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_overflow_drops_without_blocking() {
        let (mut tx, mut rx) = sidetone_channel(4);
        assert_eq!(tx.push(&[1.0; 6]), 4);
        assert_eq!(tx.dropped(), 2);

        let mut out = [0.0; 4];
        rx.fill(&mut out);
        assert_eq!(out, [1.0; 4]);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let (mut tx, mut rx) = sidetone_channel(4);
        let mut out = [0.0; 3];
        tx.push(&[1.0, 2.0, 3.0]);
        rx.fill(&mut out);

        tx.push(&[4.0, 5.0, 6.0]);
        rx.fill(&mut out);
        assert_eq!(out, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_abandoned_when_tap_dropped() {
        let (tx, rx) = sidetone_channel(4);
        drop(rx);
        assert!(tx.is_abandoned());
    }
}
