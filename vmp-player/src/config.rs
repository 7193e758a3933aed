//! vmp-player configuration
//!
//! Loaded from TOML; every table and field is optional.
//!
//! ```toml
//! root_folder = "/srv/movies"
//!
//! [decode]
//! color_depth = "rgb15"
//! ring_buffer_size = 204800
//!
//! [host]
//! frame_rate_hz = 60
//! looping = true
//!
//! [sim]
//! frames = { every = 4 }
//! ```

use crate::error::{Error, Result};
use crate::playback::params::DecodeParams;
use crate::sim::SimScript;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vmp_common::config::{load_toml_or_default, LoggingConfig};
use vmp_common::{Zone, ZoneHeap};

/// Player configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Folder movies are loaded from
    pub root_folder: Option<PathBuf>,
    pub decode: DecodeParams,
    pub host: HostConfig,
    pub zones: ZoneLayout,
    pub sim: SimScript,
    pub logging: LoggingConfig,
}

impl PlayerConfig {
    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_toml_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.frame_rate_hz == 0 || self.host.vblank_rate_hz == 0 {
            return Err(Error::Config("host rates must be non-zero".to_string()));
        }
        if self.decode.aligned_ring_size().is_none() {
            return Err(Error::Config(format!(
                "ring buffer size {} is too large",
                self.decode.ring_buffer_size
            )));
        }
        if !self.decode.pcm.fits_sound_ram() {
            return Err(Error::Config(format!(
                "PCM window {:#010x}+{} lies outside sound RAM",
                self.decode.pcm.address, self.decode.pcm.size
            )));
        }
        Ok(())
    }
}

/// Host loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Frame synchronizations per second
    pub frame_rate_hz: u32,
    /// Vertical blanks per second
    pub vblank_rate_hz: u32,
    /// Stop after this many presented frames
    pub frame_limit: Option<u64>,
    /// Replay the movie when it completes
    pub looping: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60,
            vblank_rate_hz: 60,
            frame_limit: None,
            looping: false,
        }
    }
}

impl HostConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate_hz.max(1)
    }

    pub fn vblank_period(&self) -> Duration {
        Duration::from_secs(1) / self.vblank_rate_hz.max(1)
    }
}

/// Region capacities of the zone heap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneLayout {
    pub high_work_ram: usize,
    pub low_work_ram: usize,
    pub cart_ram: usize,
    /// Zone the player lives in
    pub home: Zone,
}

impl Default for ZoneLayout {
    fn default() -> Self {
        Self {
            high_work_ram: 1024 * 1024,
            low_work_ram: 1024 * 1024,
            cart_ram: 4 * 1024 * 1024,
            home: Zone::HighWorkRam,
        }
    }
}

impl ZoneLayout {
    pub fn build_heap(&self) -> ZoneHeap {
        ZoneHeap::new(Zone::HighWorkRam)
            .with_region(Zone::HighWorkRam, 0x0600_0000, self.high_work_ram)
            .with_region(Zone::LowWorkRam, 0x0020_0000, self.low_work_ram)
            .with_region(Zone::CartRam, 0x0240_0000, self.cart_ram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::params::ColorDepth;
    use crate::sim::{FramePattern, SimLength};
    use std::fs;
    use tempfile::TempDir;
    use vmp_common::ZoneProvider;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = PlayerConfig::load(&dir.path().join("none.toml")).unwrap();
        assert_eq!(config, PlayerConfig::default());
        assert_eq!(config.host.frame_rate_hz, 60);
    }

    #[test]
    fn test_full_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vmp.toml");
        fs::write(
            &path,
            r#"
root_folder = "/srv/movies"

[decode]
color_depth = "rgb24"
decode_buffer_zone = "cart_ram"

[host]
frame_rate_hz = 30
frame_limit = 600
looping = true

[zones]
low_work_ram = 524288
home = "low_work_ram"

[sim]
width = 320
height = 224
frames = { at = [1, 5, 9] }
length = { advances = 12 }

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let config = PlayerConfig::load(&path).unwrap();
        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/movies")));
        assert_eq!(config.decode.color_depth, ColorDepth::Rgb24);
        assert_eq!(config.decode.decode_buffer_zone, Zone::CartRam);
        assert_eq!(config.host.frame_period(), Duration::from_secs(1) / 30);
        assert_eq!(config.host.frame_limit, Some(600));
        assert!(config.host.looping);
        assert_eq!(config.zones.home, Zone::LowWorkRam);
        assert_eq!(config.sim.width, 320);
        assert_eq!(config.sim.frames, FramePattern::At(vec![1, 5, 9]));
        assert_eq!(config.sim.length, SimLength::Advances(12));
        assert_eq!(config.logging.level, "debug");

        let heap = config.zones.build_heap();
        assert_eq!(heap.usage(Zone::LowWorkRam).capacity, 524_288);
        assert!(heap.allocate(Zone::LowWorkRam, 524_289).is_none());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vmp.toml");
        fs::write(&path, "[host]\nframe_rate_hz = 0\n").unwrap();
        assert!(matches!(PlayerConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_pcm_window_past_sound_ram_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vmp.toml");
        fs::write(&path, "[decode.pcm]\nsize = 4294967295\n").unwrap();
        assert!(matches!(PlayerConfig::load(&path), Err(Error::Config(_))));

        fs::write(&path, "[decode.pcm]\nsize = 131072\n").unwrap();
        assert_eq!(PlayerConfig::load(&path).unwrap().decode.pcm.size, 131_072);
    }
}
