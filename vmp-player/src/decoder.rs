//! Decoder capability
//!
//! The block decoder itself is opaque. A [`DecoderBackend`] is the library
//! (initialized once, with a vertical-blank routine); each movie gets a
//! [`DecoderSession`] that is advanced once per frame.
//!
//! Sessions never own the memory they decode into. The player lends the work
//! area, ring buffer and frame buffer on every call that needs them through a
//! [`DecodeContext`], together with the open stream.

use crate::playback::params::{ColorDepth, PcmWindow};
use crate::playback::state::PlaybackState;
use vmp_common::block::BlockFile;
use vmp_common::timing::Fxp;
use vmp_common::Resolution;

/// Movie header as read from the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub width: u16,
    pub height: u16,
    /// Time base in 16.16 fixed point (decoder ticks per second)
    pub time_scale_raw: i32,
}

impl StreamHeader {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn time_scale(&self) -> Fxp {
        Fxp::from_raw(self.time_scale_raw)
    }
}

/// Pause behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseMode {
    /// Resume
    Off,
    /// Pause when the next key frame is displayed
    OnKeyFrame,
    /// Pause now
    Immediate,
}

/// Buffer sizes and audio window a session is created against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSetup {
    pub work_size: usize,
    pub ring_size: usize,
    pub pcm: PcmWindow,
}

/// Session memory lent for one call
pub struct SessionMemory<'a> {
    pub work: &'a mut [u8],
    pub ring: &'a mut [u8],
    pub pcm: &'a mut [u8],
    /// Frame buffer; absent until the header has been read
    pub decode: Option<&'a mut [u8]>,
}

/// Everything a session may touch during one call
pub struct DecodeContext<'a> {
    pub memory: SessionMemory<'a>,
    pub stream: &'a mut dyn BlockFile,
}

/// One movie being decoded
pub trait DecoderSession: Send {
    fn set_color_depth(&mut self, depth: ColorDepth);

    /// Pull the stream header into the ring buffer and parse it
    fn preload_header(&mut self, cx: &mut DecodeContext<'_>);

    /// Parsed header, `None` if the stream has none
    fn header(&self) -> Option<StreamHeader>;

    /// Frame buffer length and scanline stride in bytes
    fn set_decode_target(&mut self, len: usize, stride: usize);

    fn start(&mut self);
    fn stop(&mut self);
    fn pause(&mut self, mode: PauseMode);

    /// Run one decode step
    fn advance(&mut self, cx: &mut DecodeContext<'_>);

    /// True when a decoded frame is due for display
    fn is_frame_ready(&self) -> bool;

    /// Acknowledge the frame so decoding can continue into the buffer
    fn mark_frame_consumed(&mut self);

    fn status(&self) -> PlaybackState;

    /// Elapsed playback time in raw 16.16 decoder ticks
    fn elapsed_raw(&self) -> i32;

    fn set_pan(&mut self, pan: u8);
    fn set_speed(&mut self, ratio: u16, output_audio: bool);
    fn set_volume(&mut self, volume: u8);

    /// Release decoder-side resources
    fn destroy(self: Box<Self>);
}

/// Decoder library
pub trait DecoderBackend: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// One-time library initialization, run when the backend is first used
    fn initialize(&self);

    /// Vertical-blank micro-step
    ///
    /// Runs from the vertical-blank signal; may only touch state internal to
    /// the backend.
    fn on_vblank(&self);

    /// Create a session over an open stream, `None` if rejected
    fn create_session(
        &self,
        setup: &SessionSetup,
        stream: &mut dyn BlockFile,
    ) -> Option<Box<dyn DecoderSession>>;
}
