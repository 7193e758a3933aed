//! Process-wide error channel
//!
//! Conditions that have no caller left to return an error to (for example a
//! replay that fails inside a transport call) are published here for
//! application-level diagnostics. Every report is also logged.
//!
//! ```rust
//! use vmp_common::errors::ERRORS;
//!
//! let mut rx = ERRORS.subscribe();
//! ERRORS.report("docs", -1, "something went wrong");
//! let report = rx.try_recv().unwrap();
//! assert_eq!(report.code, -1);
//! ```

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::error;

/// Default number of reports buffered per subscriber
const DEFAULT_CAPACITY: usize = 64;

/// Global error bus
pub static ERRORS: Lazy<ErrorBus> = Lazy::new(|| ErrorBus::new(DEFAULT_CAPACITY));

/// One published error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Component that raised the error
    pub origin: String,
    /// Numeric error code, negative for failures
    pub code: i32,
    /// Human readable description
    pub message: String,
    /// When the error was raised
    pub timestamp: DateTime<Utc>,
}

/// Broadcast channel of [`ErrorReport`]s
#[derive(Debug)]
pub struct ErrorBus {
    tx: broadcast::Sender<ErrorReport>,
}

impl ErrorBus {
    /// Create a bus buffering up to `capacity` reports per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every report published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ErrorReport> {
        self.tx.subscribe()
    }

    /// Log and publish an error
    ///
    /// Returns the number of subscribers that received it (0 when nobody is
    /// listening, which is not a failure).
    pub fn report(&self, origin: &str, code: i32, message: impl Into<String>) -> usize {
        let report = ErrorReport {
            origin: origin.to_string(),
            code,
            message: message.into(),
            timestamp: Utc::now(),
        };
        error!(origin = %report.origin, code = report.code, "{}", report.message);
        self.tx.send(report).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
