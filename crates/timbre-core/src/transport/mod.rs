//! Shared buffer transport - samples across the capture/engine boundary
//!
//! At most one copy in each direction: `write_in` copies the captured packet
//! into the region, processing happens in place through [`AudioPacket`],
//! `read_out` copies the result back. The region is single-buffered, so
//! packets must be delivered one at a time.

mod error;
mod region;

pub use error::{TransportError, TransportResult};
pub use region::SharedRegion;

use crate::stability::StabilityController;
use crate::types::{AudioPacket, Sample, SAMPLE_RATE, SAMPLE_SIZE};

/// Owns the shared region and moves packets in and out of it
#[derive(Debug)]
pub struct SharedBufferTransport {
    region: SharedRegion,
    pinned: bool,
}

impl SharedBufferTransport {
    /// Allocate an anonymous region of exactly `capacity` bytes and try to pin it
    pub fn create(capacity: usize, stability: &StabilityController) -> TransportResult<Self> {
        let region = SharedRegion::anonymous(capacity)?;
        Ok(Self::init(region, stability))
    }

    /// Wrap an already-mapped region and try to pin it.
    ///
    /// A pinning failure is logged by the controller and processing
    /// continues un-pinned.
    pub fn init(region: SharedRegion, stability: &StabilityController) -> Self {
        let pinned = stability.pin_memory(region.as_bytes()).is_ok();
        log::info!(
            "[TRANSPORT] Shared region ready: {} bytes ({} samples), pinned={}",
            region.capacity(),
            region.capacity_samples(),
            pinned
        );
        Self { region, pinned }
    }

    /// Wrap a region without attempting to pin it
    pub fn unpinned(region: SharedRegion) -> Self {
        log::info!(
            "[TRANSPORT] Shared region ready: {} bytes ({} samples), pinning disabled",
            region.capacity(),
            region.capacity_samples()
        );
        Self {
            region,
            pinned: false,
        }
    }

    fn check(&self, count: usize) -> TransportResult<()> {
        let requested_bytes = count.saturating_mul(SAMPLE_SIZE);
        if requested_bytes > self.region.capacity() {
            return Err(TransportError::Overflow {
                requested_bytes,
                capacity: self.region.capacity(),
            });
        }
        Ok(())
    }

    /// Copy `source` into the region starting at offset 0.
    ///
    /// Rejected atomically (nothing copied) if it does not fit.
    pub fn write_in(&mut self, source: &[Sample]) -> TransportResult<()> {
        self.check(source.len())?;
        self.region.samples_mut()[..source.len()].copy_from_slice(source);
        Ok(())
    }

    /// Copy the first `dest.len()` samples of the region into `dest`
    pub fn read_out(&self, dest: &mut [Sample]) -> TransportResult<()> {
        self.check(dest.len())?;
        dest.copy_from_slice(&self.region.samples()[..dest.len()]);
        Ok(())
    }

    /// Borrow the first `count` samples for in-place processing
    pub fn packet(&mut self, count: usize) -> TransportResult<AudioPacket<'_>> {
        self.check(count)?;
        Ok(AudioPacket::new(
            &mut self.region.samples_mut()[..count],
            SAMPLE_RATE,
        ))
    }

    /// Capacity in bytes
    pub fn capacity_bytes(&self) -> usize {
        self.region.capacity()
    }

    /// Capacity in samples
    pub fn capacity_samples(&self) -> usize {
        self.region.capacity_samples()
    }

    /// Whether the region is locked in physical memory
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// The underlying region
    pub fn region(&self) -> &SharedRegion {
        &self.region
    }
}
