//! Scripted reference decoder
//!
//! [`SimBackend`] implements the decoder capability without decoding any
//! bitstream. Its behaviour comes from a [`SimScript`]: header contents,
//! when frames become ready, how long the movie runs, how fast the stream
//! is consumed. It is what the demo binary plays movies with, and what the
//! tests drive the player against.
//!
//! A decoded frame is the frame buffer filled with the frame's sequence
//! number (wrapping at 256), which makes frame copies easy to check.
//!
//! Counters shared by all sessions of a backend are exposed through
//! [`SimBackend::probe`].

use crate::decoder::{
    DecodeContext, DecoderBackend, DecoderSession, PauseMode, SessionSetup, StreamHeader,
};
use crate::playback::params::ColorDepth;
use crate::playback::state::PlaybackState;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use vmp_common::block::{BlockFile, SECTOR_SIZE};
use vmp_common::timing::Fxp;

/// Which advances produce a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePattern {
    /// Every n-th advance (n = 0 never produces a frame)
    Every(u64),
    /// Exactly these advances (1-based)
    At(Vec<u64>),
}

impl FramePattern {
    fn matches(&self, advance: u64) -> bool {
        match self {
            FramePattern::Every(0) => false,
            FramePattern::Every(n) => advance % n == 0,
            FramePattern::At(indices) => indices.contains(&advance),
        }
    }
}

/// When the movie ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimLength {
    /// After this many advances
    Advances(u64),
    /// Once the whole stream has been read
    EndOfStream,
}

/// Behaviour of the reference decoder (`[sim]` config table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimScript {
    pub width: u16,
    pub height: u16,
    /// Decoder ticks per second
    pub time_scale: i16,
    /// Stream carries no header
    pub missing_header: bool,
    /// Refuse to create sessions
    pub reject_sessions: bool,
    pub frames: FramePattern,
    pub length: SimLength,
    /// Stream bytes pulled into the ring buffer per advance
    pub bytes_per_advance: usize,
    /// Decoder ticks added per advance at normal speed
    pub ticks_per_advance: i16,
    /// Every n-th frame is a key frame
    pub key_frame_interval: u64,
}

impl Default for SimScript {
    fn default() -> Self {
        Self {
            width: 176,
            height: 144,
            time_scale: 600,
            missing_header: false,
            reject_sessions: false,
            frames: FramePattern::Every(4),
            length: SimLength::EndOfStream,
            bytes_per_advance: 2048,
            ticks_per_advance: 10,
            key_frame_interval: 4,
        }
    }
}

impl SimScript {
    /// Header a session of this script reports
    pub fn header(&self) -> Option<StreamHeader> {
        if self.missing_header {
            return None;
        }
        Some(StreamHeader {
            width: self.width,
            height: self.height,
            time_scale_raw: Fxp::from_int(self.time_scale).raw(),
        })
    }
}

/// Counters shared by a backend and its sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimProbe {
    pub initializations: u64,
    pub vblanks: u64,
    pub sessions_created: u64,
    pub sessions_rejected: u64,
    pub sessions_destroyed: u64,
    pub starts: u64,
    pub stops: u64,
    pub advances: u64,
    pub frames: u64,
    pub last_pan: Option<u8>,
    pub last_speed: Option<(u16, bool)>,
    pub last_volume: Option<u8>,
    pub last_decode_target: Option<(usize, usize)>,
    pub last_setup: Option<(usize, usize)>,
}

type SharedProbe = Arc<Mutex<SimProbe>>;

fn lock(probe: &SharedProbe) -> MutexGuard<'_, SimProbe> {
    probe.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Backend
// ============================================================================

/// Scripted decoder library
pub struct SimBackend {
    name: String,
    script: Mutex<SimScript>,
    probe: SharedProbe,
}

impl SimBackend {
    pub fn new(script: SimScript) -> Self {
        Self::named("sim", script)
    }

    pub fn named(name: &str, script: SimScript) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script),
            probe: Arc::new(Mutex::new(SimProbe::default())),
        }
    }

    /// Script used by sessions created from now on
    pub fn set_script(&self, script: SimScript) {
        *self.script.lock().unwrap_or_else(|e| e.into_inner()) = script;
    }

    pub fn script(&self) -> SimScript {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Snapshot of the counters
    pub fn probe(&self) -> SimProbe {
        lock(&self.probe).clone()
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new(SimScript::default())
    }
}

impl DecoderBackend for SimBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self) {
        lock(&self.probe).initializations += 1;
    }

    fn on_vblank(&self) {
        lock(&self.probe).vblanks += 1;
    }

    fn create_session(
        &self,
        setup: &SessionSetup,
        stream: &mut dyn BlockFile,
    ) -> Option<Box<dyn DecoderSession>> {
        let script = self.script();
        let mut probe = lock(&self.probe);

        if script.reject_sessions {
            probe.sessions_rejected += 1;
            debug!("Sim decoder rejected session for {}", stream.info().id);
            return None;
        }
        probe.sessions_created += 1;
        probe.last_setup = Some((setup.work_size, setup.ring_size));

        Some(Box::new(SimSession::new(script, Arc::clone(&self.probe))))
    }
}

// ============================================================================
// Session
// ============================================================================

/// One scripted movie
pub struct SimSession {
    script: SimScript,
    probe: SharedProbe,
    status: PlaybackState,
    depth: ColorDepth,
    header: Option<StreamHeader>,
    decode_len: usize,
    advances: u64,
    frames: u64,
    frame_ready: bool,
    elapsed_raw: i32,
    ring_cursor: usize,
    pause_pending: bool,
    speed: u16,
}

impl SimSession {
    fn new(script: SimScript, probe: SharedProbe) -> Self {
        Self {
            script,
            probe,
            status: PlaybackState::Stopped,
            depth: ColorDepth::Rgb15,
            header: None,
            decode_len: 0,
            advances: 0,
            frames: 0,
            frame_ready: false,
            elapsed_raw: 0,
            ring_cursor: 0,
            pause_pending: false,
            speed: 0,
        }
    }

    pub fn color_depth(&self) -> ColorDepth {
        self.depth
    }

    /// Pull up to `len` stream bytes into the ring buffer, wrapping around
    fn stream_into_ring(&mut self, cx: &mut DecodeContext<'_>, len: usize) -> std::io::Result<usize> {
        let ring = &mut *cx.memory.ring;
        if ring.is_empty() {
            return Ok(0);
        }

        let mut total = 0;
        while total < len {
            let start = self.ring_cursor % ring.len();
            let end = (start + (len - total)).min(ring.len());
            let n = cx.stream.read(&mut ring[start..end])?;
            if n == 0 {
                break;
            }
            total += n;
            self.ring_cursor = (start + n) % ring.len();
        }
        Ok(total)
    }

    fn is_key_frame(&self, frame: u64) -> bool {
        self.script.key_frame_interval <= 1 || (frame - 1) % self.script.key_frame_interval == 0
    }

    fn produce_frame(&mut self, cx: &mut DecodeContext<'_>) {
        self.frames += 1;
        self.frame_ready = true;

        if let Some(decode) = cx.memory.decode.as_deref_mut() {
            let len = self.decode_len.min(decode.len());
            decode[..len].fill(self.frames as u8);
        }

        if self.pause_pending && self.is_key_frame(self.frames) {
            self.pause_pending = false;
            self.status = PlaybackState::Paused;
        }
    }

    fn ticks_per_advance(&self) -> Fxp {
        let base = Fxp::from_int(self.script.ticks_per_advance);
        if self.speed == 0 {
            base
        } else {
            // ×1024 ratio to 16.16
            base * Fxp::from_raw(self.speed as i32 * 64)
        }
    }
}

impl DecoderSession for SimSession {
    fn set_color_depth(&mut self, depth: ColorDepth) {
        self.depth = depth;
    }

    fn preload_header(&mut self, cx: &mut DecodeContext<'_>) {
        if let Err(e) = self.stream_into_ring(cx, SECTOR_SIZE as usize) {
            warn!("Sim decoder could not read header: {}", e);
            self.header = None;
            return;
        }
        self.header = self.script.header();
    }

    fn header(&self) -> Option<StreamHeader> {
        self.header
    }

    fn set_decode_target(&mut self, len: usize, stride: usize) {
        self.decode_len = len;
        lock(&self.probe).last_decode_target = Some((len, stride));
    }

    fn start(&mut self) {
        if self.status != PlaybackState::Stopped {
            return;
        }
        self.status = if self.header.is_some() {
            PlaybackState::Started
        } else {
            PlaybackState::Error
        };
        lock(&self.probe).starts += 1;
    }

    fn stop(&mut self) {
        self.status = PlaybackState::Stopped;
        self.pause_pending = false;
        lock(&self.probe).stops += 1;
    }

    fn pause(&mut self, mode: PauseMode) {
        match mode {
            PauseMode::Off => {
                self.pause_pending = false;
                if self.status == PlaybackState::Paused {
                    self.status = PlaybackState::Timer;
                }
            }
            PauseMode::OnKeyFrame => {
                if self.status == PlaybackState::Timer {
                    self.pause_pending = true;
                }
            }
            PauseMode::Immediate => {
                if self.status == PlaybackState::Timer {
                    self.status = PlaybackState::Paused;
                }
            }
        }
    }

    fn advance(&mut self, cx: &mut DecodeContext<'_>) {
        match self.status {
            PlaybackState::Started | PlaybackState::HeaderProcessing => {
                self.status = PlaybackState::Timer;
            }
            PlaybackState::Timer => {}
            _ => return,
        }

        self.advances += 1;
        if let Err(e) = self.stream_into_ring(cx, self.script.bytes_per_advance) {
            warn!("Sim decoder stream read failed: {}", e);
            self.status = PlaybackState::Error;
            return;
        }
        self.elapsed_raw = (Fxp::from_raw(self.elapsed_raw) + self.ticks_per_advance()).raw();

        let frame = !self.frame_ready && self.script.frames.matches(self.advances);
        if frame {
            self.produce_frame(cx);
        }

        let finished = match self.script.length {
            SimLength::Advances(n) => self.advances >= n,
            SimLength::EndOfStream => cx.stream.at_end(),
        };
        if finished {
            self.status = PlaybackState::Completed;
        }

        let mut probe = lock(&self.probe);
        probe.advances += 1;
        if frame {
            probe.frames += 1;
        }
    }

    fn is_frame_ready(&self) -> bool {
        self.frame_ready
    }

    fn mark_frame_consumed(&mut self) {
        self.frame_ready = false;
    }

    fn status(&self) -> PlaybackState {
        self.status
    }

    fn elapsed_raw(&self) -> i32 {
        self.elapsed_raw
    }

    fn set_pan(&mut self, pan: u8) {
        lock(&self.probe).last_pan = Some(pan);
    }

    fn set_speed(&mut self, ratio: u16, output_audio: bool) {
        self.speed = ratio;
        lock(&self.probe).last_speed = Some((ratio, output_audio));
    }

    fn set_volume(&mut self, volume: u8) {
        lock(&self.probe).last_volume = Some(volume);
    }

    fn destroy(self: Box<Self>) {
        lock(&self.probe).sessions_destroyed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SessionMemory;
    use vmp_common::block::{BlockSource, MemorySource};

    struct Rig {
        work: Vec<u8>,
        ring: Vec<u8>,
        pcm: Vec<u8>,
        decode: Vec<u8>,
        stream: Box<dyn BlockFile>,
    }

    impl Rig {
        fn new(stream_len: usize) -> Self {
            let source = MemorySource::new().with_file("m.cpk", vec![7u8; stream_len]);
            let id = source.resolve("m.cpk").unwrap();
            Self {
                work: vec![0; 64],
                ring: vec![0; 4096],
                pcm: vec![0; 64],
                decode: vec![0; 16],
                stream: source.open(id).unwrap(),
            }
        }

        fn cx(&mut self) -> DecodeContext<'_> {
            DecodeContext {
                memory: SessionMemory {
                    work: &mut self.work,
                    ring: &mut self.ring,
                    pcm: &mut self.pcm,
                    decode: Some(self.decode.as_mut_slice()),
                },
                stream: self.stream.as_mut(),
            }
        }
    }

    fn session(script: SimScript, rig: &mut Rig) -> Box<dyn DecoderSession> {
        let backend = SimBackend::new(script);
        let setup = SessionSetup {
            work_size: 64,
            ring_size: 4096,
            pcm: Default::default(),
        };
        let mut session = backend.create_session(&setup, rig.stream.as_mut()).unwrap();
        session.preload_header(&mut rig.cx());
        session.set_decode_target(16, 8);
        session
    }

    #[test]
    fn test_frame_pattern() {
        assert!(FramePattern::Every(4).matches(8));
        assert!(!FramePattern::Every(4).matches(9));
        assert!(!FramePattern::Every(0).matches(0));
        assert!(FramePattern::At(vec![3, 7]).matches(7));
    }

    #[test]
    fn test_frames_fill_decode_buffer_with_sequence_number() {
        let mut rig = Rig::new(100_000);
        let script = SimScript {
            frames: FramePattern::Every(2),
            ..Default::default()
        };
        let mut session = session(script, &mut rig);
        session.start();

        session.advance(&mut rig.cx());
        assert_eq!(session.status(), PlaybackState::Timer);
        assert!(!session.is_frame_ready());

        session.advance(&mut rig.cx());
        assert!(session.is_frame_ready());
        assert!(rig.decode.iter().all(|b| *b == 1));
        session.mark_frame_consumed();

        session.advance(&mut rig.cx());
        session.advance(&mut rig.cx());
        assert!(rig.decode.iter().all(|b| *b == 2));
    }

    #[test]
    fn test_end_of_stream_completes() {
        let mut rig = Rig::new(2048 + 4096);
        let mut session = session(SimScript::default(), &mut rig);
        session.start();

        session.advance(&mut rig.cx());
        assert_eq!(session.status(), PlaybackState::Timer);
        session.advance(&mut rig.cx());
        assert_eq!(session.status(), PlaybackState::Completed);

        // Completed sessions ignore further advances
        let elapsed = session.elapsed_raw();
        session.advance(&mut rig.cx());
        assert_eq!(session.elapsed_raw(), elapsed);
    }

    #[test]
    fn test_pause_on_key_frame() {
        let mut rig = Rig::new(1_000_000);
        let script = SimScript {
            frames: FramePattern::Every(1),
            key_frame_interval: 3,
            ..Default::default()
        };
        let mut session = session(script, &mut rig);
        session.start();

        // Frame 1 is a key frame; pause requested after it
        session.advance(&mut rig.cx());
        session.mark_frame_consumed();
        session.pause(PauseMode::OnKeyFrame);

        session.advance(&mut rig.cx()); // frame 2
        session.mark_frame_consumed();
        assert_eq!(session.status(), PlaybackState::Timer);
        session.advance(&mut rig.cx()); // frame 3
        session.mark_frame_consumed();
        assert_eq!(session.status(), PlaybackState::Timer);
        session.advance(&mut rig.cx()); // frame 4, key frame
        assert_eq!(session.status(), PlaybackState::Paused);

        session.pause(PauseMode::Off);
        assert_eq!(session.status(), PlaybackState::Timer);
    }

    #[test]
    fn test_half_speed_halves_elapsed_ticks() {
        let mut rig = Rig::new(1_000_000);
        let mut session = session(SimScript::default(), &mut rig);
        session.set_speed(512, true);
        session.start();
        session.advance(&mut rig.cx());

        assert_eq!(session.elapsed_raw(), Fxp::from_int(5).raw());
    }

    #[test]
    fn test_missing_header_start_is_error() {
        let mut rig = Rig::new(4096);
        let script = SimScript {
            missing_header: true,
            ..Default::default()
        };
        let mut session = session(script, &mut rig);
        assert!(session.header().is_none());
        session.start();
        assert_eq!(session.status(), PlaybackState::Error);
    }
}
