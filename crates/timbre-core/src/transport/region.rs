//! The shared sample region
//!
//! One fixed-capacity buffer of `f32` samples, mapped by both the capture
//! layer and the engine. No header, no framing: capacity and sample format
//! are negotiated out-of-band when the engine is initialized.

use std::fs::File;

use memmap2::{MmapMut, MmapOptions};

use super::error::{TransportError, TransportResult};
use crate::types::{Sample, SAMPLE_SIZE};

/// Fixed-capacity shared memory region. Capacity is immutable after creation.
pub struct SharedRegion {
    map: MmapMut,
    capacity: usize,
}

fn validate_capacity(capacity: usize) -> TransportResult<()> {
    if capacity == 0 || capacity % SAMPLE_SIZE != 0 {
        return Err(TransportError::InvalidCapacity(capacity));
    }
    Ok(())
}

impl SharedRegion {
    /// Map an anonymous region (engine and capture layer share an address space)
    pub fn anonymous(capacity: usize) -> TransportResult<Self> {
        validate_capacity(capacity)?;
        let map = MmapMut::map_anon(capacity).map_err(|e| TransportError::Mapping {
            capacity,
            reason: e.to_string(),
        })?;
        Ok(Self { map, capacity })
    }

    /// Map a shared file descriptor handed over by the capture layer
    /// (memfd / ashmem / shm file).
    ///
    /// A regular file must be at least `capacity` bytes. Device-backed
    /// descriptors such as ashmem report no size, so their length is left
    /// to the mapping call.
    pub fn from_file(file: &File, capacity: usize) -> TransportResult<Self> {
        validate_capacity(capacity)?;
        let mapping_err = |reason: String| TransportError::Mapping { capacity, reason };

        let metadata = file.metadata().map_err(|e| mapping_err(e.to_string()))?;
        if metadata.is_file() && metadata.len() < capacity as u64 {
            return Err(mapping_err(format!(
                "backing file is only {} bytes",
                metadata.len()
            )));
        }

        // SAFETY: the mapping is shared with the capture process. Only one
        // packet is in flight at a time, so the two sides never touch the
        // same bytes concurrently.
        let map = unsafe { MmapOptions::new().len(capacity).map_mut(file) }
            .map_err(|e| mapping_err(e.to_string()))?;
        Ok(Self { map, capacity })
    }

    /// Capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Capacity in samples
    #[inline]
    pub fn capacity_samples(&self) -> usize {
        self.capacity / SAMPLE_SIZE
    }

    /// Raw bytes (used for pinning)
    pub fn as_bytes(&self) -> &[u8] {
        &self.map[..]
    }

    /// Whole region as samples.
    ///
    /// Mappings are page aligned and the capacity is a multiple of the
    /// sample size, so the cast cannot fail.
    #[inline]
    pub fn samples(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.map[..])
    }

    /// Whole region as mutable samples
    #[inline]
    pub fn samples_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.map[..])
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("capacity", &self.capacity)
            .field("ptr", &self.map.as_ptr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_anonymous_region_is_zeroed() {
        let region = SharedRegion::anonymous(1024).unwrap();
        assert_eq!(region.capacity(), 1024);
        assert_eq!(region.capacity_samples(), 256);
        assert!(region.samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_invalid_capacity_rejected() {
        assert_eq!(
            SharedRegion::anonymous(0).unwrap_err(),
            TransportError::InvalidCapacity(0)
        );
        assert_eq!(
            SharedRegion::anonymous(1023).unwrap_err(),
            TransportError::InvalidCapacity(1023)
        );
    }

    #[test]
    fn test_file_backed_region_shares_bytes() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[0u8; 64]).unwrap();

        let mut writer = SharedRegion::from_file(&file, 64).unwrap();
        writer.samples_mut()[3] = 0.25;

        let reader = SharedRegion::from_file(&file, 64).unwrap();
        assert_eq!(reader.samples()[3], 0.25);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sizeless_device_descriptor_maps() {
        // like ashmem, /dev/zero reports a size of 0
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/zero")
            .unwrap();
        assert_eq!(file.metadata().unwrap().len(), 0);

        let mut region = SharedRegion::from_file(&file, 4096).unwrap();
        assert_eq!(region.capacity_samples(), 1024);
        region.samples_mut()[1023] = 0.5;
        assert_eq!(region.samples()[1023], 0.5);
    }

    #[test]
    fn test_short_file_is_a_mapping_error() {
        let file = tempfile::tempfile().unwrap();
        assert!(matches!(
            SharedRegion::from_file(&file, 64),
            Err(TransportError::Mapping { capacity: 64, .. })
        ));
    }
}
