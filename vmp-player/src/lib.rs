//! # VMP Movie Player Library (vmp-player)
//!
//! Streaming movie playback engine.
//!
//! **Purpose:** Pull a compressed movie from block storage, advance an opaque
//! decoder once per displayed frame, and hand decoded frames to the host
//! through synchronous notifications.
//!
//! **Architecture:** One `MoviePlayer` per movie, ticked by the host's
//! `FrameSync`; decoder libraries plug in through `DecoderBackend` and run
//! their vertical-blank routine from the process-wide registry.

pub mod config;
pub mod decoder;
pub mod error;
pub mod host;
pub mod playback;
pub mod sim;

pub use error::{Error, LoadError, Result};
pub use host::FrameSync;
pub use playback::{ColorDepth, DecodeParams, MoviePlayer, PlaybackState, TickOutcome};
