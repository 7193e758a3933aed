//! Movie Player (vmp-player) - Main entry point
//!
//! Plays one movie from the root folder with the scripted reference decoder,
//! copying every decoded frame into a texture-sized staging buffer the way a
//! display pipeline would, and prints a JSON report when playback ends.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vmp_common::block::DirectorySource;
use vmp_common::config::{default_config_path, resolve_root_folder, ROOT_FOLDER_ENV};
use vmp_common::errors::ERRORS;
use vmp_common::{Resolution, ZoneProvider};
use vmp_player::config::PlayerConfig;
use vmp_player::playback::vblank;
use vmp_player::sim::SimBackend;
use vmp_player::{ColorDepth, FrameSync, MoviePlayer};

/// Command-line arguments for vmp-player
#[derive(Parser, Debug)]
#[command(name = "vmp-player")]
#[command(about = "Streaming movie player")]
#[command(version)]
struct Args {
    /// Movie file name inside the root folder
    movie: String,

    /// Root folder containing movie files
    #[arg(short, long, env = "VMP_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many presented frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Replay the movie every time it completes
    #[arg(short = 'l', long = "loop")]
    looping: bool,
}

/// End-of-run summary
#[derive(Debug, Serialize)]
struct RunReport {
    movie: String,
    resolution: Resolution,
    color_depth: ColorDepth,
    frames_decoded: u64,
    frames_presented: u64,
    completions: u64,
    final_time_seconds: f64,
    loaded: bool,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

fn init_tracing(config: &PlayerConfig) -> Result<()> {
    let level = &config.logging.level;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("vmp_player={level},vmp_common={level}").into());

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let started_at = Utc::now();

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = match &config_path {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    if let Some(limit) = args.frames {
        config.host.frame_limit = Some(limit);
    }
    config.host.looping |= args.looping;

    init_tracing(&config)?;
    info!("Starting vmp-player");
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_FOLDER_ENV,
        config.root_folder.as_deref(),
    );
    info!("Root folder: {}", root_folder.display());

    let source = Arc::new(
        DirectorySource::open(&root_folder)
            .with_context(|| format!("Failed to read root folder {}", root_folder.display()))?,
    );
    let zones: Arc<dyn ZoneProvider> = Arc::new(config.zones.build_heap());
    let backend = Arc::new(SimBackend::new(config.sim.clone()));

    let mut player =
        MoviePlayer::new(backend, source, zones).with_home_zone(config.zones.home);

    // Display side: frames are copied out while the buffer is stable
    let staging: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let frames_decoded = Rc::new(Cell::new(0u64));
    let completions = Rc::new(Cell::new(0u64));
    {
        let staging = Rc::clone(&staging);
        let frames_decoded = Rc::clone(&frames_decoded);
        player.on_frame.subscribe(move |player: &mut MoviePlayer| {
            let size = player.resolution();
            let length = size.pixels() << (player.color_depth() as usize + 1);
            if let Some(frame) = player.frame_data() {
                let mut texture = staging.borrow_mut();
                let length = length.min(frame.len()).min(texture.len());
                texture[..length].copy_from_slice(&frame[..length]);
            }
            frames_decoded.set(frames_decoded.get() + 1);
        });
    }
    {
        let completions = Rc::clone(&completions);
        let looping = config.host.looping;
        player.on_completed.subscribe(move |player: &mut MoviePlayer| {
            completions.set(completions.get() + 1);
            if looping {
                player.play();
            }
        });
    }

    player
        .load(&args.movie, config.decode.clone())
        .with_context(|| format!("Failed to load movie '{}'", args.movie))?;

    // Clear the movie surface
    let resolution = player.resolution();
    staging
        .borrow_mut()
        .resize(resolution.pixels() * player.color_depth().bytes_per_pixel(), 0);

    player.play();

    let mut errors = ERRORS.subscribe();
    let mut sync = FrameSync::new();
    let player = sync.attach(player);

    let mut vblank_timer = interval(config.host.vblank_period());
    vblank_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frame_timer = interval(config.host.frame_period());
    frame_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = vblank_timer.tick() => {
                vblank::raise();
            }
            _ = frame_timer.tick() => {
                let frame = sync.synchronize();

                if config.host.frame_limit.is_some_and(|limit| frame >= limit) {
                    info!("Frame limit reached after {} frames", frame);
                    break;
                }
                if !config.host.looping && completions.get() > 0 {
                    info!("Playback completed after {} frames", frame);
                    break;
                }
                if !player.borrow().is_loaded() {
                    warn!("Movie is no longer loaded, stopping");
                    break;
                }
            }
            Ok(report) = errors.recv() => {
                warn!("Error reported by {}: {} ({})", report.origin, report.message, report.code);
            }
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    let player = player.borrow();
    let report = RunReport {
        movie: args.movie.clone(),
        resolution: player.resolution(),
        color_depth: player.color_depth(),
        frames_decoded: frames_decoded.get(),
        frames_presented: sync.frame(),
        completions: completions.get(),
        final_time_seconds: player.time().to_f64(),
        loaded: player.is_loaded(),
        started_at,
        finished_at: Utc::now(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );

    Ok(())
}
