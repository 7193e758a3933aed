//! # VMP Common Library
//!
//! Shared code for the movie player and anything hosting it:
//! - Error type and configuration loading
//! - Observer lists (`Event<A>`) and the process-wide error channel
//! - 16.16 fixed-point timing
//! - Memory zones and the reference zone allocator
//! - Block storage (CD-style directory tables and files)

pub mod block;
pub mod config;
pub mod error;
pub mod errors;
pub mod events;
pub mod timing;
pub mod types;
pub mod zone;

pub use error::{Error, Result};
pub use events::{Event, SubscriptionId};
pub use timing::Fxp;
pub use types::Resolution;
pub use zone::{Zone, ZoneBuffer, ZoneHeap, ZoneLease, ZoneProvider};
