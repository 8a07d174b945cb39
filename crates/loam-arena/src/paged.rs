//! The arena's backing buffer.
//!
//! A [`PagedRegion`] is one contiguous byte range, either a [`RawRegion`]
//! from the memory provider or a mapped file. The arena carves offsets out
//! of it and never resizes or moves it; growing the arena means releasing
//! the region and building a new one.

use loam_core::{MemoryProvider, RawRegion};
use memmap2::MmapMut;

/// Slack added past the usable capacity of provider-backed buffers.
pub const SAFETY_OFFSET: usize = 1024;

enum Backing {
    Region(RawRegion),
    Mapped(MmapMut),
}

/// A contiguous backing buffer with a usable capacity.
pub struct PagedRegion {
    backing: Backing,
    capacity: usize,
}

impl PagedRegion {
    /// Wrap a provider region. The usable capacity is the region length
    /// minus [`SAFETY_OFFSET`].
    pub(crate) fn from_region(region: RawRegion) -> Self {
        let capacity = region.len().saturating_sub(SAFETY_OFFSET);
        Self {
            backing: Backing::Region(region),
            capacity,
        }
    }

    /// Wrap a file mapping. The whole mapping is usable.
    pub(crate) fn from_mapping(map: MmapMut) -> Self {
        let capacity = map.len();
        Self {
            backing: Backing::Mapped(map),
            capacity,
        }
    }

    fn data(&self) -> &[u8] {
        match &self.backing {
            Backing::Region(region) => region.as_bytes(),
            Backing::Mapped(map) => map,
        }
    }

    fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.backing {
            Backing::Region(region) => region.as_bytes_mut(),
            Backing::Mapped(map) => map,
        }
    }

    /// Shared slice at `offset..offset + len`, or `None` if out of range.
    pub fn slice(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.data().get(offset..end)
    }

    /// Mutable slice at `offset..offset + len`, or `None` if out of range.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        self.data_mut().get_mut(offset..end)
    }

    /// Zero `offset..offset + len`. Out-of-range requests are clamped.
    pub fn zero(&mut self, offset: usize, len: usize) {
        let data = self.data_mut();
        let start = offset.min(data.len());
        let end = offset.saturating_add(len).min(data.len());
        data[start..end].fill(0);
    }

    /// Usable capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Physical length including any safety slack.
    pub fn physical_len(&self) -> usize {
        self.data().len()
    }

    /// Whether the buffer is a file mapping.
    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    /// Hand the buffer back. Provider regions return to `provider`;
    /// mappings are unmapped.
    pub(crate) fn release(self, provider: &dyn MemoryProvider) {
        match self.backing {
            Backing::Region(region) => provider.release(region),
            Backing::Mapped(map) => drop(map),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_core::{HostMemory, MemoryKind};

    fn region(mem: &HostMemory, usable: usize) -> PagedRegion {
        PagedRegion::from_region(
            mem.allocate(usable + SAFETY_OFFSET, MemoryKind::Host, true)
                .unwrap(),
        )
    }

    #[test]
    fn capacity_excludes_safety_offset() {
        let mem = HostMemory::new();
        let buf = region(&mem, 4096);
        assert_eq!(buf.capacity(), 4096);
        assert_eq!(buf.physical_len(), 4096 + SAFETY_OFFSET);
        assert!(!buf.is_mapped());
    }

    #[test]
    fn slices_read_back_writes() {
        let mem = HostMemory::new();
        let mut buf = region(&mem, 256);
        buf.slice_mut(32, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buf.slice(32, 4).unwrap(), &[1, 2, 3, 4]);
        buf.zero(32, 4);
        assert_eq!(buf.slice(32, 4).unwrap(), &[0, 0, 0, 0]);
    }

    #[test]
    fn out_of_range_slice_is_none() {
        let mem = HostMemory::new();
        let buf = region(&mem, 64);
        assert!(buf.slice(usize::MAX, 2).is_none());
        assert!(buf.slice(64 + SAFETY_OFFSET, 1).is_none());
    }

    #[test]
    fn release_returns_region_to_provider() {
        let mem = HostMemory::new();
        let buf = region(&mem, 128);
        assert_eq!(mem.live_regions(), 1);
        buf.release(&mem);
        assert_eq!(mem.live_regions(), 0);
        assert_eq!(mem.allocated_bytes(), 0);
    }
}
