//! Movie player
//!
//! [`MoviePlayer`] owns at most one [`MovieSession`] and drives it from the
//! host's once-per-frame tick.
//!
//! **Responsibilities:**
//! - Load/unload with full unwinding on failure
//! - Transport controls (play, pause, stop, speed, volume, pan)
//! - Per-tick decoder advance with frame and completion notifications
//! - Replay after completion by rebuilding the decoder session
//!
//! Notifications run synchronously inside [`MoviePlayer::tick`] with the
//! player itself as argument, so handlers may call any transport method
//! (including `play()` from a completion handler to loop a movie).

use crate::decoder::{DecoderBackend, PauseMode};
use crate::error::LoadError;
use crate::playback::buffers::{BufferAllocator, ZonePolicy};
use crate::playback::params::{ColorDepth, DecodeParams};
use crate::playback::session::MovieSession;
use crate::playback::state::PlaybackState;
use crate::playback::vblank;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vmp_common::block::BlockSource;
use vmp_common::errors::ERRORS;
use vmp_common::events::Event;
use vmp_common::timing::{elapsed_seconds, Fxp};
use vmp_common::{Resolution, Zone, ZoneProvider};

/// Highest accepted pan value
pub const MAX_PAN: u8 = 31;

/// Speed ratio for normal playback (×1024 fixed point)
pub const NORMAL_SPEED: u16 = 1024;

/// Highest volume step
pub const MAX_VOLUME: u8 = 7;

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickOutcome {
    /// The decoder was advanced
    pub advanced: bool,
    /// Frame handlers ran
    pub frame: bool,
    /// Completion handlers ran
    pub completed: bool,
}

/// Streaming movie player
pub struct MoviePlayer {
    id: Uuid,
    backend: Arc<dyn DecoderBackend>,
    source: Arc<dyn BlockSource>,
    zones: Arc<dyn ZoneProvider>,
    policy: ZonePolicy,
    session: Option<MovieSession>,
    /// Parameters of the last load request
    params: DecodeParams,
    /// Set on natural completion or user stop; the next `play()` rebuilds
    completion_notified: bool,
    /// Bumped whenever the decoder session is replaced
    generation: u64,

    /// Raised each time a new frame is decoded, before the host presents
    pub on_frame: Event<MoviePlayer>,

    /// Raised once when the movie plays to its end, before the host presents
    pub on_completed: Event<MoviePlayer>,
}

impl MoviePlayer {
    /// Create an unloaded player
    ///
    /// Installs the backend's vertical-blank routine on first use.
    ///
    /// A new player is not ticked by anything. Hand it to
    /// [`FrameSync::attach`](crate::host::FrameSync::attach) to have it
    /// ticked once per frame for as long as it lives, or call
    /// [`tick`](MoviePlayer::tick) from your own frame loop.
    pub fn new(
        backend: Arc<dyn DecoderBackend>,
        source: Arc<dyn BlockSource>,
        zones: Arc<dyn ZoneProvider>,
    ) -> Self {
        vblank::install(&backend);

        let id = Uuid::new_v4();
        debug!(player = %id, "Created movie player on decoder '{}'", backend.name());

        Self {
            id,
            backend,
            source,
            zones,
            policy: ZonePolicy::default(),
            session: None,
            params: DecodeParams::default(),
            completion_notified: false,
            generation: 0,
            on_frame: Event::new(),
            on_completed: Event::new(),
        }
    }

    /// Zone the player itself lives in; `Zone::Default` buffers go here
    pub fn with_home_zone(mut self, zone: Zone) -> Self {
        self.policy = ZonePolicy::new(zone);
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load a movie, replacing any loaded one
    ///
    /// On failure nothing is held and the player stays usable.
    pub fn load(&mut self, name: &str, params: DecodeParams) -> Result<(), LoadError> {
        self.unload();
        self.completion_notified = false;
        self.params = params;

        let allocator = BufferAllocator::new(&self.zones, self.policy);
        match MovieSession::open(
            name,
            &self.params,
            self.backend.as_ref(),
            self.source.as_ref(),
            &allocator,
        ) {
            Ok(session) => {
                let header = session.header();
                info!(
                    player = %self.id,
                    "Loaded movie '{}': {} {}, time scale {}",
                    name,
                    header.resolution(),
                    self.params.color_depth,
                    header.time_scale()
                );
                self.session = Some(session);
                self.generation += 1;
                Ok(())
            }
            Err(e) => {
                warn!(player = %self.id, "Failed to load movie '{}': {}", name, e);
                Err(e)
            }
        }
    }

    /// Stop playback and release everything; a no-op when nothing is loaded
    pub fn unload(&mut self) {
        if let Some(session) = self.session.take() {
            info!(player = %self.id, "Unloading movie '{}'", session.name());
            drop(session);
            self.generation += 1;
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start, resume, or replay after completion
    pub fn play(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if self.completion_notified {
            self.replay();
            return;
        }

        match session.status() {
            PlaybackState::Stopped => session.decoder_mut().start(),
            PlaybackState::Paused => session.decoder_mut().pause(PauseMode::Off),
            _ => {}
        }
    }

    fn replay(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let name = session.name().to_string();
        self.generation += 1;

        match session.rebuild(self.backend.as_ref(), self.source.as_ref()) {
            Ok(mut session) => {
                session.decoder_mut().start();
                self.session = Some(session);
                self.completion_notified = false;
                info!(player = %self.id, "Replaying movie '{}'", name);
            }
            Err(e) => {
                // Session and buffers are gone; the player is now unloaded
                ERRORS.report(
                    "vmp-player",
                    e.code(),
                    format!("Replay of '{}' failed: {}", name, e),
                );
            }
        }
    }

    /// Pause at the next key frame; only while playing
    pub fn pause(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.status() == PlaybackState::Timer {
                session.decoder_mut().pause(PauseMode::OnKeyFrame);
            }
        }
    }

    /// Hard stop; only while playing
    ///
    /// No completion notification follows, and the next `play()` restarts
    /// from the beginning.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.status() == PlaybackState::Timer {
                session.decoder_mut().stop();
                self.completion_notified = true;
                debug!(player = %self.id, "Stopped '{}'", session.name());
            }
        }
    }

    /// Left/right balance: 0 and 16 centered, 1–15 attenuate the left
    /// channel, 17–31 the right; other values are ignored
    pub fn set_audio_pan(&mut self, pan: u8) {
        if pan > MAX_PAN {
            debug!(player = %self.id, "Ignoring pan {}", pan);
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.decoder_mut().set_pan(pan);
        }
    }

    /// Playback speed as a ×1024 ratio (`0` is normal speed); values above
    /// 1024 are ignored. `output_audio = false` mutes audio.
    pub fn set_speed(&mut self, ratio: u16, output_audio: bool) {
        if ratio > NORMAL_SPEED {
            debug!(player = %self.id, "Ignoring speed ratio {}", ratio);
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.decoder_mut().set_speed(ratio, output_audio);
        }
    }

    /// Volume 0–7; larger values clamp to 7
    pub fn set_volume(&mut self, volume: u8) {
        if let Some(session) = self.session.as_mut() {
            session.decoder_mut().set_volume(volume.min(MAX_VOLUME));
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Per-frame task: advance the decoder and raise notifications
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.completion_notified {
            return outcome;
        }
        let Some(session) = self.session.as_mut() else {
            return outcome;
        };

        if session.status().is_progressing() {
            session.advance();
            outcome.advanced = true;

            if session.decoder().is_frame_ready() {
                let generation = self.generation;
                self.raise_frame();
                outcome.frame = true;

                // Handlers may have unloaded or replaced the session
                if self.generation == generation {
                    if let Some(session) = self.session.as_mut() {
                        session.decoder_mut().mark_frame_consumed();
                    }
                }
            }
        }

        if !self.completion_notified && self.status() == PlaybackState::Completed {
            self.completion_notified = true;
            debug!(player = %self.id, "Playback completed");
            self.raise_completed();
            outcome.completed = true;
        }

        outcome
    }

    fn raise_frame(&mut self) {
        let mut handlers = self.on_frame.detach();
        handlers.invoke(self);
        self.on_frame.reattach(handlers);
    }

    fn raise_completed(&mut self) {
        let mut handlers = self.on_completed.detach();
        handlers.invoke(self);
        self.on_completed.reattach(handlers);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// Decoder status; `Error` when nothing is loaded
    pub fn status(&self) -> PlaybackState {
        self.session
            .as_ref()
            .map(MovieSession::status)
            .unwrap_or(PlaybackState::Error)
    }

    /// Movie resolution; empty when nothing is loaded
    pub fn resolution(&self) -> Resolution {
        self.session
            .as_ref()
            .map(|s| s.header().resolution())
            .unwrap_or_default()
    }

    /// Color depth of the last load request
    pub fn color_depth(&self) -> ColorDepth {
        self.params.color_depth
    }

    /// Most recently decoded frame
    ///
    /// Contents are stable only inside an `on_frame` handler; afterwards the
    /// decoder may be writing the next frame.
    pub fn frame_data(&self) -> Option<&[u8]> {
        self.session.as_ref().map(MovieSession::frame)
    }

    /// Time base of the loaded movie; zero when nothing is loaded
    pub fn time_scale(&self) -> Fxp {
        self.session
            .as_ref()
            .map(|s| s.header().time_scale())
            .unwrap_or(Fxp::ZERO)
    }

    /// Current playback time in seconds
    pub fn time(&self) -> Fxp {
        self.session
            .as_ref()
            .and_then(|s| elapsed_seconds(s.decoder().elapsed_raw(), s.header().time_scale()))
            .unwrap_or(Fxp::ZERO)
    }

    /// Current playback time
    pub fn elapsed(&self) -> Duration {
        self.time().to_duration()
    }

    pub fn movie_name(&self) -> Option<&str> {
        self.session.as_ref().map(MovieSession::name)
    }

    pub fn params(&self) -> &DecodeParams {
        &self.params
    }

    pub fn home_zone(&self) -> Zone {
        self.policy.home()
    }

    pub fn backend(&self) -> &Arc<dyn DecoderBackend> {
        &self.backend
    }
}

impl Drop for MoviePlayer {
    fn drop(&mut self) {
        self.unload();
    }
}

impl std::fmt::Debug for MoviePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoviePlayer")
            .field("id", &self.id)
            .field("movie", &self.movie_name())
            .field("status", &self.status())
            .field("completion_notified", &self.completion_notified)
            .finish()
    }
}
