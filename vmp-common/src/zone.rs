//! Memory zones
//!
//! Buffers are carved out of named physical regions. A [`ZoneProvider`]
//! hands out [`ZoneBuffer`]s and takes them back; [`ZoneLease`] ties a buffer
//! to its provider so it is returned exactly once, when the lease is dropped.
//!
//! [`ZoneHeap`] is the reference provider: it keeps a byte budget per region
//! and fails allocations that would exceed it.
//!
//! **Responsibilities:**
//! - Zone naming and the "default" zone
//! - Capacity accounting shared by every subsystem in the process
//! - Scoped release of buffers

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Allocation granularity of the reference heap
pub const ALLOCATION_ALIGN: usize = 4;

/// Named memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Whatever region the caller itself lives in
    Default,
    /// High work RAM (fast, main CPU bus)
    HighWorkRam,
    /// Low work RAM
    LowWorkRam,
    /// Cartridge expansion RAM
    CartRam,
    /// Sound CPU RAM; fixed windows only, never managed by a heap
    SoundRam,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Default => write!(f, "default"),
            Zone::HighWorkRam => write!(f, "hwram"),
            Zone::LowWorkRam => write!(f, "lwram"),
            Zone::CartRam => write!(f, "cartram"),
            Zone::SoundRam => write!(f, "sndram"),
        }
    }
}

/// Block of memory handed out by a [`ZoneProvider`]
pub struct ZoneBuffer {
    zone: Zone,
    address: usize,
    bytes: Box<[u8]>,
}

impl ZoneBuffer {
    /// Zero-filled buffer of `len` bytes at `address` in `zone`
    pub fn new(zone: Zone, address: usize, len: usize) -> Self {
        Self {
            zone,
            address,
            bytes: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Region the buffer was carved from
    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Start address inside the region's address space
    pub fn address(&self) -> usize {
        self.address
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl fmt::Debug for ZoneBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneBuffer")
            .field("zone", &self.zone)
            .field("address", &format_args!("{:#010x}", self.address))
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Allocate/free capability over memory zones
///
/// Implementations are shared process-wide and must tolerate concurrent
/// calls from unrelated subsystems. Each call is treated as atomic.
pub trait ZoneProvider: Send + Sync {
    /// Allocate `len` bytes from `zone`, or `None` when the zone is exhausted
    fn allocate(&self, zone: Zone, len: usize) -> Option<ZoneBuffer>;

    /// Return a buffer previously handed out by this provider
    fn free(&self, buffer: ZoneBuffer);
}

// ============================================================================
// Scoped ownership
// ============================================================================

/// A buffer that returns itself to its provider when dropped
pub struct ZoneLease {
    buffer: Option<ZoneBuffer>,
    provider: Arc<dyn ZoneProvider>,
}

impl ZoneLease {
    /// Allocate from `provider`, or `None` when the zone is exhausted
    pub fn acquire(provider: &Arc<dyn ZoneProvider>, zone: Zone, len: usize) -> Option<Self> {
        let buffer = provider.allocate(zone, len)?;
        Some(Self {
            buffer: Some(buffer),
            provider: Arc::clone(provider),
        })
    }

    pub fn zone(&self) -> Zone {
        self.buffer().zone()
    }

    pub fn address(&self) -> usize {
        self.buffer().address()
    }

    fn buffer(&self) -> &ZoneBuffer {
        match &self.buffer {
            Some(buffer) => buffer,
            None => unreachable!("lease buffer is only taken on drop"),
        }
    }

    fn buffer_mut(&mut self) -> &mut ZoneBuffer {
        match &mut self.buffer {
            Some(buffer) => buffer,
            None => unreachable!("lease buffer is only taken on drop"),
        }
    }
}

impl Deref for ZoneLease {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer().as_slice()
    }
}

impl DerefMut for ZoneLease {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer_mut().as_mut_slice()
    }
}

impl Drop for ZoneLease {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.provider.free(buffer);
        }
    }
}

impl fmt::Debug for ZoneLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ZoneLease").field(&self.buffer).finish()
    }
}

// ============================================================================
// Reference heap
// ============================================================================

/// Snapshot of one region's accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ZoneUsage {
    pub capacity: usize,
    pub used: usize,
    pub live_blocks: usize,
}

impl ZoneUsage {
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }
}

#[derive(Debug)]
struct Region {
    base: usize,
    capacity: usize,
    used: usize,
    live_blocks: usize,
    /// Next address handed out; rewinds when the region empties
    cursor: usize,
}

/// Capacity-accounted allocator over a fixed set of regions
///
/// `Zone::Default` is served from a configurable fallback region.
#[derive(Debug)]
pub struct ZoneHeap {
    regions: Mutex<HashMap<Zone, Region>>,
    default_zone: Zone,
}

impl ZoneHeap {
    /// Empty heap; add regions with [`ZoneHeap::with_region`]
    pub fn new(default_zone: Zone) -> Self {
        Self {
            regions: Mutex::new(HashMap::new()),
            default_zone,
        }
    }

    /// Console-like layout: 1 MiB high work RAM, 1 MiB low work RAM,
    /// 4 MiB cartridge RAM; `Default` maps to high work RAM
    pub fn console() -> Self {
        Self::new(Zone::HighWorkRam)
            .with_region(Zone::HighWorkRam, 0x0600_0000, 1024 * 1024)
            .with_region(Zone::LowWorkRam, 0x0020_0000, 1024 * 1024)
            .with_region(Zone::CartRam, 0x0240_0000, 4 * 1024 * 1024)
    }

    /// Add or replace a region
    pub fn with_region(self, zone: Zone, base: usize, capacity: usize) -> Self {
        {
            let mut regions = self.lock();
            regions.insert(
                zone,
                Region {
                    base,
                    capacity,
                    used: 0,
                    live_blocks: 0,
                    cursor: 0,
                },
            );
        }
        self
    }

    /// Region that serves `Zone::Default`
    pub fn default_zone(&self) -> Zone {
        self.default_zone
    }

    /// Accounting for a zone (`Default` reports its fallback region)
    pub fn usage(&self, zone: Zone) -> ZoneUsage {
        let zone = self.resolve(zone);
        self.lock()
            .get(&zone)
            .map(|r| ZoneUsage {
                capacity: r.capacity,
                used: r.used,
                live_blocks: r.live_blocks,
            })
            .unwrap_or_default()
    }

    /// Bytes in use across every region
    pub fn total_used(&self) -> usize {
        self.lock().values().map(|r| r.used).sum()
    }

    fn resolve(&self, zone: Zone) -> Zone {
        match zone {
            Zone::Default => self.default_zone,
            other => other,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Zone, Region>> {
        // Accounting stays consistent even if a holder panicked
        self.regions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `None` when the rounded length does not fit in `usize`
fn align_up(len: usize) -> Option<usize> {
    len.div_ceil(ALLOCATION_ALIGN).checked_mul(ALLOCATION_ALIGN)
}

impl ZoneProvider for ZoneHeap {
    fn allocate(&self, zone: Zone, len: usize) -> Option<ZoneBuffer> {
        let zone = self.resolve(zone);
        let Some(size) = align_up(len) else {
            debug!("Allocation of {} bytes in {} overflows", len, zone);
            return None;
        };
        let mut regions = self.lock();

        let Some(region) = regions.get_mut(&zone) else {
            warn!("Allocation from unmapped zone {}", zone);
            return None;
        };

        let fits = region
            .used
            .checked_add(size)
            .is_some_and(|end| end <= region.capacity);
        if size == 0 || !fits {
            debug!(
                "Zone {} exhausted: requested {} bytes, {} of {} in use",
                zone, size, region.used, region.capacity
            );
            return None;
        }

        if region.cursor.checked_add(size).map_or(true, |end| end > region.capacity) {
            // Addresses are informational; wrap rather than track holes
            region.cursor = 0;
        }
        let address = region.base + region.cursor;
        region.cursor += size;
        region.used += size;
        region.live_blocks += 1;

        Some(ZoneBuffer::new(zone, address, len))
    }

    fn free(&self, buffer: ZoneBuffer) {
        // Live buffers were rounded successfully when allocated
        let size = align_up(buffer.len()).unwrap_or(usize::MAX);
        let mut regions = self.lock();

        let Some(region) = regions.get_mut(&buffer.zone()) else {
            warn!("Free of buffer from unmapped zone {}", buffer.zone());
            return;
        };

        region.used = region.used.saturating_sub(size);
        region.live_blocks = region.live_blocks.saturating_sub(1);
        if region.live_blocks == 0 {
            region.cursor = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_heap() -> Arc<dyn ZoneProvider> {
        Arc::new(
            ZoneHeap::new(Zone::HighWorkRam)
                .with_region(Zone::HighWorkRam, 0x0600_0000, 1024)
                .with_region(Zone::LowWorkRam, 0x0020_0000, 256),
        )
    }

    #[test]
    fn test_allocation_accounting() {
        let heap = ZoneHeap::console();
        let a = heap.allocate(Zone::LowWorkRam, 1000).unwrap();
        assert_eq!(a.len(), 1000);
        assert_eq!(a.address(), 0x0020_0000);
        assert_eq!(heap.usage(Zone::LowWorkRam).used, 1000);

        let b = heap.allocate(Zone::LowWorkRam, 3).unwrap();
        assert_eq!(b.address(), 0x0020_0000 + 1000);
        assert_eq!(heap.usage(Zone::LowWorkRam).used, 1004);
        assert_eq!(heap.usage(Zone::LowWorkRam).live_blocks, 2);

        heap.free(a);
        heap.free(b);
        assert_eq!(heap.usage(Zone::LowWorkRam), ZoneUsage {
            capacity: 1024 * 1024,
            used: 0,
            live_blocks: 0,
        });
    }

    #[test]
    fn test_default_zone_maps_to_fallback() {
        let heap = ZoneHeap::console();
        let buffer = heap.allocate(Zone::Default, 64).unwrap();
        assert_eq!(buffer.zone(), Zone::HighWorkRam);
        assert_eq!(heap.usage(Zone::Default).used, 64);
        heap.free(buffer);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let heap = small_heap();
        assert!(heap.allocate(Zone::LowWorkRam, 257).is_none());
        assert!(heap.allocate(Zone::CartRam, 4).is_none());
        assert!(heap.allocate(Zone::LowWorkRam, 0).is_none());
        assert!(heap.allocate(Zone::LowWorkRam, 256).is_some());
    }

    #[test]
    fn test_oversized_request_fails_without_overflow() {
        let heap = Arc::new(ZoneHeap::console());
        let provider: Arc<dyn ZoneProvider> = heap.clone();
        let _held = ZoneLease::acquire(&provider, Zone::LowWorkRam, 64).unwrap();

        assert!(provider.allocate(Zone::LowWorkRam, usize::MAX).is_none());
        assert!(provider.allocate(Zone::LowWorkRam, usize::MAX - 2).is_none());
        assert!(provider.allocate(Zone::LowWorkRam, usize::MAX / 2).is_none());
        assert_eq!(heap.usage(Zone::LowWorkRam).used, 64);
        assert_eq!(heap.usage(Zone::LowWorkRam).live_blocks, 1);
    }

    #[test]
    fn test_lease_returns_buffer_on_drop() {
        let heap = Arc::new(ZoneHeap::console());
        let provider: Arc<dyn ZoneProvider> = heap.clone();

        {
            let mut lease = ZoneLease::acquire(&provider, Zone::CartRam, 128).unwrap();
            lease[0] = 0xAB;
            assert_eq!(lease.len(), 128);
            assert_eq!(lease.zone(), Zone::CartRam);
            assert_eq!(heap.usage(Zone::CartRam).used, 128);
        }

        assert_eq!(heap.usage(Zone::CartRam).used, 0);
        assert_eq!(heap.total_used(), 0);
    }
}
