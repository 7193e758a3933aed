//! Test helpers for vmp-player integration tests
//!
//! Provides a ready-made rig: a zone heap, an in-memory movie library, a
//! scripted decoder and a player wired to all three, plus a recorder for
//! notifications.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use vmp_common::block::MemorySource;
use vmp_common::{Zone, ZoneHeap, ZoneProvider};
use vmp_player::sim::{FramePattern, SimBackend, SimLength, SimScript};
use vmp_player::{MoviePlayer, PlaybackState};

/// Name of the movie every rig library contains
pub const MOVIE: &str = "SKYBL.CPK";

/// Size of that movie in bytes
pub const MOVIE_BYTES: usize = 64 * 1024;

pub struct Rig {
    pub heap: Arc<ZoneHeap>,
    pub backend: Arc<SimBackend>,
    pub player: MoviePlayer,
}

impl Rig {
    pub fn new(script: SimScript) -> Self {
        Self::with_heap(script, ZoneHeap::console())
    }

    pub fn with_heap(script: SimScript, heap: ZoneHeap) -> Self {
        let heap = Arc::new(heap);
        let zones: Arc<dyn ZoneProvider> = heap.clone();
        let backend = Arc::new(SimBackend::new(script));
        let source = Arc::new(
            MemorySource::new()
                .with_file(MOVIE, movie_bytes(MOVIE_BYTES))
                .with_file("SHORT.CPK", movie_bytes(4096)),
        );
        let player = MoviePlayer::new(backend.clone(), source, zones);

        Self {
            heap,
            backend,
            player,
        }
    }

    /// Same rig with the player living in `zone`
    pub fn home(self, zone: Zone) -> Self {
        let Rig {
            heap,
            backend,
            player,
        } = self;
        Self {
            heap,
            backend,
            player: player.with_home_zone(zone),
        }
    }

    /// Bytes currently allocated across every zone
    pub fn heap_used(&self) -> usize {
        self.heap.total_used()
    }

    /// Tick `n` times
    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.player.tick();
        }
    }
}

/// Deterministic movie payload
pub fn movie_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Script with frames at exact advances and a fixed length
pub fn script_at(frames: &[u64], advances: u64) -> SimScript {
    SimScript {
        frames: FramePattern::At(frames.to_vec()),
        length: SimLength::Advances(advances),
        ..Default::default()
    }
}

/// Heap whose low work RAM is too small for the default ring buffer
pub fn tight_low_ram_heap() -> ZoneHeap {
    ZoneHeap::new(Zone::HighWorkRam)
        .with_region(Zone::HighWorkRam, 0x0600_0000, 1024 * 1024)
        .with_region(Zone::LowWorkRam, 0x0020_0000, 64 * 1024)
}

/// One recorded notification
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Frame { first_byte: u8, status: PlaybackState },
    Completed,
}

/// Shared log of notifications
#[derive(Clone, Default)]
pub struct Recorder {
    pub seen: Rc<RefCell<Vec<Seen>>>,
}

impl Recorder {
    /// Subscribe to both notifications of `player`
    pub fn attach(player: &mut MoviePlayer) -> Self {
        let recorder = Self::default();

        let seen = Rc::clone(&recorder.seen);
        player.on_frame.subscribe(move |p: &mut MoviePlayer| {
            let first_byte = p.frame_data().and_then(|f| f.first().copied()).unwrap_or(0);
            seen.borrow_mut().push(Seen::Frame {
                first_byte,
                status: p.status(),
            });
        });

        let seen = Rc::clone(&recorder.seen);
        player.on_completed.subscribe(move |_: &mut MoviePlayer| {
            seen.borrow_mut().push(Seen::Completed);
        });

        recorder
    }

    pub fn frames(&self) -> usize {
        self.seen
            .borrow()
            .iter()
            .filter(|s| matches!(s, Seen::Frame { .. }))
            .count()
    }

    pub fn completions(&self) -> usize {
        self.seen
            .borrow()
            .iter()
            .filter(|s| matches!(s, Seen::Completed))
            .count()
    }

    pub fn frame_bytes(&self) -> Vec<u8> {
        self.seen
            .borrow()
            .iter()
            .filter_map(|s| match s {
                Seen::Frame { first_byte, .. } => Some(*first_byte),
                Seen::Completed => None,
            })
            .collect()
    }
}
