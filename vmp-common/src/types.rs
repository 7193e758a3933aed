//! Small value types shared across crates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Area resolution in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Total number of pixels
    pub const fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when either dimension is zero
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u16, u16)> for Resolution {
    fn from((width, height): (u16, u16)) -> Self {
        Self::new(width, height)
    }
}
