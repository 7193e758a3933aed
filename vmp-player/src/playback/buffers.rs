//! Session buffer allocation
//!
//! Every session holds four buffers: the decoder work area, the streaming
//! ring buffer, the PCM window and the frame (decode) buffer. Work, ring and
//! decode buffers come from memory zones as [`ZoneLease`]s, so a partially
//! built set releases itself when dropped on a failed load.
//!
//! **Responsibilities:**
//! - Zone selection (`Zone::Default` means "the player's own zone")
//! - Size computation per color depth and resolution
//! - Reporting exactly which buffer could not be allocated

use crate::decoder::SessionMemory;
use crate::error::{BufferKind, LoadError};
use crate::playback::params::{DecodeParams, PcmWindow};
use std::sync::Arc;
use tracing::{debug, warn};
use vmp_common::{Resolution, Zone, ZoneLease, ZoneProvider};

/// Zone selection policy, resolved once per load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonePolicy {
    home: Zone,
}

impl ZonePolicy {
    /// Policy for a player living in `home`
    pub fn new(home: Zone) -> Self {
        Self { home }
    }

    pub fn home(&self) -> Zone {
        self.home
    }

    /// Zone a buffer requested in `requested` is actually placed in
    pub fn resolve(&self, requested: Zone) -> Zone {
        match requested {
            Zone::Default => self.home,
            zone => zone,
        }
    }
}

impl Default for ZonePolicy {
    fn default() -> Self {
        Self::new(Zone::Default)
    }
}

/// Sound RAM window backing store
pub struct PcmBuffer {
    window: PcmWindow,
    bytes: Box<[u8]>,
}

impl PcmBuffer {
    /// `None` when the window reaches outside sound RAM
    pub fn new(window: PcmWindow) -> Option<Self> {
        if !window.fits_sound_ram() {
            return None;
        }
        Some(Self {
            window,
            bytes: vec![0u8; window.size as usize].into_boxed_slice(),
        })
    }

    pub fn window(&self) -> PcmWindow {
        self.window
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Buffers needed before the header is known
pub struct StreamBuffers {
    pub work: ZoneLease,
    pub ring: ZoneLease,
    pub pcm: PcmBuffer,
}

impl StreamBuffers {
    /// Lend the buffers to the decoder (no frame buffer yet)
    pub fn memory(&mut self) -> SessionMemory<'_> {
        SessionMemory {
            work: &mut self.work,
            ring: &mut self.ring,
            pcm: self.pcm.as_mut_slice(),
            decode: None,
        }
    }

    /// Complete the set with the frame buffer
    pub fn with_decode(self, decode: ZoneLease) -> SessionBuffers {
        SessionBuffers {
            work: self.work,
            ring: self.ring,
            pcm: self.pcm,
            decode,
        }
    }
}

/// Full buffer set of a loaded session
pub struct SessionBuffers {
    pub work: ZoneLease,
    pub ring: ZoneLease,
    pub pcm: PcmBuffer,
    pub decode: ZoneLease,
}

impl SessionBuffers {
    /// Lend every buffer to the decoder
    pub fn memory(&mut self) -> SessionMemory<'_> {
        SessionMemory {
            work: &mut self.work,
            ring: &mut self.ring,
            pcm: self.pcm.as_mut_slice(),
            decode: Some(&mut *self.decode),
        }
    }

    pub fn frame(&self) -> &[u8] {
        &self.decode
    }
}

/// Allocates session buffers from a zone provider under a policy
pub struct BufferAllocator<'a> {
    zones: &'a Arc<dyn ZoneProvider>,
    policy: ZonePolicy,
}

impl<'a> BufferAllocator<'a> {
    pub fn new(zones: &'a Arc<dyn ZoneProvider>, policy: ZonePolicy) -> Self {
        Self { zones, policy }
    }

    fn lease(&self, buffer: BufferKind, zone: Zone, bytes: usize) -> Result<ZoneLease, LoadError> {
        match ZoneLease::acquire(self.zones, zone, bytes) {
            Some(lease) => {
                debug!(
                    "Allocated {} buffer: {} bytes in {} at {:#010x}",
                    buffer,
                    bytes,
                    lease.zone(),
                    lease.address()
                );
                Ok(lease)
            }
            None => {
                warn!("Not enough space for {} buffer ({} bytes in {})", buffer, bytes, zone);
                Err(LoadError::OutOfMemory {
                    buffer,
                    zone,
                    bytes,
                })
            }
        }
    }

    /// Work area (home zone), ring buffer and PCM window
    pub fn stream_buffers(&self, params: &DecodeParams) -> Result<StreamBuffers, LoadError> {
        let pcm = PcmBuffer::new(params.pcm).ok_or_else(|| {
            warn!(
                "PCM window {:#010x}+{} lies outside sound RAM",
                params.pcm.address, params.pcm.size
            );
            LoadError::OutOfMemory {
                buffer: BufferKind::Pcm,
                zone: Zone::SoundRam,
                bytes: params.pcm.size as usize,
            }
        })?;

        let work = self.lease(
            BufferKind::Work,
            self.policy.home(),
            params.color_depth.work_buffer_size(),
        )?;

        let ring_zone = self.policy.resolve(params.ring_buffer_zone);
        let ring_size = params.aligned_ring_size().ok_or_else(|| {
            warn!(
                "Ring buffer of {} bytes cannot be rounded to whole sectors",
                params.ring_buffer_size
            );
            LoadError::OutOfMemory {
                buffer: BufferKind::Ring,
                zone: ring_zone,
                bytes: params.ring_buffer_size,
            }
        })?;
        let ring = self.lease(BufferKind::Ring, ring_zone, ring_size)?;

        Ok(StreamBuffers { work, ring, pcm })
    }

    /// Frame buffer sized for `resolution` at the requested depth
    pub fn decode_buffer(
        &self,
        params: &DecodeParams,
        resolution: Resolution,
    ) -> Result<ZoneLease, LoadError> {
        self.lease(
            BufferKind::Decode,
            self.policy.resolve(params.decode_buffer_zone),
            params.color_depth.decode_buffer_size(resolution),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::params::{ColorDepth, WORK_SIZE_RGB15};
    use vmp_common::ZoneHeap;

    #[test]
    fn test_policy_resolves_default_to_home() {
        let policy = ZonePolicy::new(Zone::CartRam);
        assert_eq!(policy.resolve(Zone::Default), Zone::CartRam);
        assert_eq!(policy.resolve(Zone::LowWorkRam), Zone::LowWorkRam);
    }

    #[test]
    fn test_stream_buffers_sizes_and_zones() {
        let zones: Arc<dyn ZoneProvider> = Arc::new(ZoneHeap::console());
        let allocator = BufferAllocator::new(&zones, ZonePolicy::new(Zone::HighWorkRam));
        let params = DecodeParams::default().with_ring_buffer(10_000, Zone::Default);

        let buffers = allocator.stream_buffers(&params).unwrap();
        assert_eq!(buffers.work.len(), ColorDepth::Rgb15.work_buffer_size());
        assert_eq!(buffers.work.zone(), Zone::HighWorkRam);
        assert_eq!(buffers.ring.len(), 10_240);
        assert_eq!(buffers.ring.zone(), Zone::HighWorkRam);
    }

    #[test]
    fn test_ring_failure_releases_work_buffer() {
        let heap = Arc::new(
            ZoneHeap::new(Zone::HighWorkRam)
                .with_region(Zone::HighWorkRam, 0x0600_0000, 64 * 1024)
                .with_region(Zone::LowWorkRam, 0x0020_0000, 4096),
        );
        let zones: Arc<dyn ZoneProvider> = heap.clone();
        let allocator = BufferAllocator::new(&zones, ZonePolicy::default());

        let err = allocator.stream_buffers(&DecodeParams::default()).err().unwrap();
        assert_eq!(
            err,
            LoadError::OutOfMemory {
                buffer: BufferKind::Ring,
                zone: Zone::LowWorkRam,
                bytes: 204_800,
            }
        );
        assert_eq!(heap.total_used(), 0);
    }

    #[test]
    fn test_work_failure_leaves_nothing_allocated() {
        let heap = Arc::new(
            ZoneHeap::new(Zone::HighWorkRam)
                .with_region(Zone::HighWorkRam, 0x0600_0000, WORK_SIZE_RGB15 - 4)
                .with_region(Zone::LowWorkRam, 0x0020_0000, 1024 * 1024),
        );
        let zones: Arc<dyn ZoneProvider> = heap.clone();
        let allocator = BufferAllocator::new(&zones, ZonePolicy::new(Zone::HighWorkRam));

        let err = allocator.stream_buffers(&DecodeParams::default()).err().unwrap();
        assert_eq!(
            err,
            LoadError::OutOfMemory {
                buffer: BufferKind::Work,
                zone: Zone::HighWorkRam,
                bytes: WORK_SIZE_RGB15,
            }
        );
        assert_eq!(heap.total_used(), 0);
        assert_eq!(heap.usage(Zone::HighWorkRam).live_blocks, 0);
        assert_eq!(heap.usage(Zone::LowWorkRam).live_blocks, 0);
    }

    #[test]
    fn test_pcm_window_outside_sound_ram_fails() {
        let heap = Arc::new(ZoneHeap::console());
        let zones: Arc<dyn ZoneProvider> = heap.clone();
        let allocator = BufferAllocator::new(&zones, ZonePolicy::default());
        let mut params = DecodeParams::default();
        params.pcm.size = u32::MAX;

        let err = allocator.stream_buffers(&params).err().unwrap();
        assert_eq!(
            err,
            LoadError::OutOfMemory {
                buffer: BufferKind::Pcm,
                zone: Zone::SoundRam,
                bytes: u32::MAX as usize,
            }
        );
        assert_eq!(heap.total_used(), 0);
    }

    #[test]
    fn test_decode_buffer_size() {
        let zones: Arc<dyn ZoneProvider> = Arc::new(ZoneHeap::console());
        let allocator = BufferAllocator::new(&zones, ZonePolicy::default());
        let params = DecodeParams::default().with_color_depth(ColorDepth::Rgb24);

        let decode = allocator
            .decode_buffer(&params, Resolution::new(160, 120))
            .unwrap();
        assert_eq!(decode.len(), 160 * 120 * 4);
    }
}
