//! Packet-loss concealment
//!
//! Active only while the engine is degraded. Each concealed packet is faded
//! from the current gain to half of it, never below the floor, so a run of
//! late packets settles at a quieter but audible level instead of clicking
//! or muting. The result is interpolated from the last emitted sample to
//! hide the discontinuity at the packet boundary. Leaving concealment
//! resets the fade.

use super::{Stage, StageKind};
use crate::types::Sample;

/// Gain multiplier applied across each concealed packet
const FADE_PER_PACKET: f32 = 0.5;
/// Interpolation weight toward the new sample
const INTERPOLATION: f32 = 0.5;
/// Default lowest fade gain
pub const DEFAULT_FLOOR: f32 = 0.25;

pub struct PacketLossConcealer {
    /// `None` until the first concealed packet (unity)
    gain: Option<f32>,
    floor: f32,
    last_output: f32,
}

impl PacketLossConcealer {
    pub fn new() -> Self {
        Self::with_floor(DEFAULT_FLOOR)
    }

    /// Concealer whose fade stops at `floor`, clamped to 0..=1
    pub fn with_floor(floor: f32) -> Self {
        let floor = if floor.is_finite() {
            floor.clamp(0.0, 1.0)
        } else {
            DEFAULT_FLOOR
        };
        Self {
            gain: None,
            floor,
            last_output: 0.0,
        }
    }

    /// Lowest gain the fade reaches
    pub fn floor(&self) -> f32 {
        self.floor
    }

    /// Gain the next concealed packet starts from
    pub fn gain(&self) -> f32 {
        self.gain.unwrap_or(1.0)
    }
}

impl Default for PacketLossConcealer {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for PacketLossConcealer {
    fn process(&mut self, buffer: &mut [Sample]) {
        if buffer.is_empty() {
            return;
        }
        let start = self.gain();
        let end = (start * FADE_PER_PACKET).max(self.floor);
        let step = (end - start) / buffer.len() as f32;

        let mut last = self.last_output;
        for (i, s) in buffer.iter_mut().enumerate() {
            let input = if s.is_finite() { *s } else { 0.0 };
            let faded = input * (start + step * i as f32);
            last += INTERPOLATION * (faded - last);
            *s = last;
        }
        self.last_output = last;
        self.gain = Some(end);
    }

    fn kind(&self) -> StageKind {
        StageKind::Concealment
    }

    fn reset(&mut self) {
        self.gain = None;
    }

    fn observe_output(&mut self, output: &[Sample]) {
        if let Some(&last) = output.last() {
            self.last_output = last;
        }
    }
}
