//! Decode parameters and buffer geometry
//!
//! **Responsibilities:**
//! - Color depth and the buffer sizes that follow from it
//! - Ring buffer size rounding to the transfer granularity
//! - Defaults for every load parameter (also the `[decode]` config table)

use serde::{Deserialize, Serialize};
use vmp_common::{Resolution, Zone};

// ============================================================================
// Constants
// ============================================================================

/// Ring buffer sizes are multiples of one storage sector (DMA granularity)
pub const RING_ALIGNMENT: usize = 2048;

/// Default ring buffer size (200 KiB)
pub const DEFAULT_RING_BUFFER_SIZE: usize = 200 * 1024;

/// Decoder work area for 15-bit output
pub const WORK_SIZE_RGB15: usize = 18 * 1024;

/// Decoder work area for 24-bit output (larger codebooks)
pub const WORK_SIZE_RGB24: usize = 24 * 1024;

/// Sound RAM as seen from the main CPU
pub const SOUND_RAM_BASE: u32 = 0x25A0_0000;

/// Sound RAM size (512 KiB)
pub const SOUND_RAM_SIZE: u32 = 512 * 1024;

/// Default PCM window: start of the sound RAM streaming area
pub const DEFAULT_PCM_ADDRESS: u32 = 0x25A2_0000;

/// Default PCM window size (64 KiB)
pub const DEFAULT_PCM_SIZE: u32 = 4096 * 16;

// ============================================================================
// Color depth
// ============================================================================

/// Output pixel format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ColorDepth {
    /// 16-bit RGB555
    #[default]
    Rgb15 = 0,
    /// 24-bit RGB888 stored in 32-bit words
    Rgb24 = 1,
}

impl ColorDepth {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorDepth::Rgb15 => 2,
            ColorDepth::Rgb24 => 4,
        }
    }

    /// Decoder work area size
    pub fn work_buffer_size(self) -> usize {
        match self {
            ColorDepth::Rgb15 => WORK_SIZE_RGB15,
            ColorDepth::Rgb24 => WORK_SIZE_RGB24,
        }
    }

    /// Bytes needed to hold one decoded frame
    pub fn decode_buffer_size(self, resolution: Resolution) -> usize {
        resolution.pixels() * self.bytes_per_pixel()
    }

    /// Bytes per decoded scanline
    pub fn stride(self, width: u16) -> usize {
        (width as usize) << (self as u8 + 1)
    }
}

impl std::fmt::Display for ColorDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorDepth::Rgb15 => write!(f, "rgb15"),
            ColorDepth::Rgb24 => write!(f, "rgb24"),
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Sound RAM window the decoder streams PCM audio through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcmWindow {
    pub address: u32,
    pub size: u32,
}

impl PcmWindow {
    /// True when the whole window lies inside sound RAM
    pub fn fits_sound_ram(&self) -> bool {
        let Some(offset) = self.address.checked_sub(SOUND_RAM_BASE) else {
            return false;
        };
        u64::from(offset) + u64::from(self.size) <= u64::from(SOUND_RAM_SIZE)
    }
}

impl Default for PcmWindow {
    fn default() -> Self {
        Self {
            address: DEFAULT_PCM_ADDRESS,
            size: DEFAULT_PCM_SIZE,
        }
    }
}

/// Parameters for one movie load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeParams {
    /// Requested ring buffer size; rounded up to [`RING_ALIGNMENT`]
    pub ring_buffer_size: usize,
    pub ring_buffer_zone: Zone,
    /// `Default` places the frame buffer next to the player
    pub decode_buffer_zone: Zone,
    pub pcm: PcmWindow,
    pub color_depth: ColorDepth,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            ring_buffer_size: DEFAULT_RING_BUFFER_SIZE,
            ring_buffer_zone: Zone::LowWorkRam,
            decode_buffer_zone: Zone::Default,
            pcm: PcmWindow::default(),
            color_depth: ColorDepth::Rgb15,
        }
    }
}

impl DecodeParams {
    /// Ring buffer size actually allocated: at least one sector, rounded up
    /// to a whole number of sectors
    ///
    /// `None` when the rounded size is not representable.
    pub fn aligned_ring_size(&self) -> Option<usize> {
        self.ring_buffer_size
            .max(1)
            .div_ceil(RING_ALIGNMENT)
            .checked_mul(RING_ALIGNMENT)
    }

    pub fn with_color_depth(mut self, depth: ColorDepth) -> Self {
        self.color_depth = depth;
        self
    }

    pub fn with_ring_buffer(mut self, size: usize, zone: Zone) -> Self {
        self.ring_buffer_size = size;
        self.ring_buffer_zone = zone;
        self
    }

    pub fn with_decode_zone(mut self, zone: Zone) -> Self {
        self.decode_buffer_zone = zone;
        self
    }
}
