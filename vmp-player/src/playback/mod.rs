//! Movie playback engine

pub mod buffers;
pub mod engine;
pub mod params;
pub mod session;
pub mod state;
pub mod vblank;

pub use engine::{MoviePlayer, TickOutcome};
pub use params::{ColorDepth, DecodeParams, PcmWindow};
pub use state::PlaybackState;
