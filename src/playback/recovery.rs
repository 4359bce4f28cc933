//! Decode fault recovery.
//!
//! A corrupt region in the source typically breaks the decoder at one spot.
//! Restarting the stream a little past that spot usually plays on; if the
//! decoder keeps failing anyway the session gives up.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Fault reported by the playback surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum SurfaceFault {
    /// The decoder could not decode the media at the current position.
    Decode(String),
    /// The surface lost its media resource (network, aborted load).
    Network(String),
    /// Anything else the surface reports.
    Other(String),
}

impl SurfaceFault {
    pub fn message(&self) -> &str {
        match self {
            Self::Decode(m) | Self::Network(m) | Self::Other(m) => m,
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

impl std::fmt::Display for SurfaceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(m) => write!(f, "decode error: {}", m),
            Self::Network(m) => write!(f, "network error: {}", m),
            Self::Other(m) => write!(f, "playback error: {}", m),
        }
    }
}

/// Decision for a reported fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryAction {
    /// Restart the stream at `at` seconds.
    Restart { at: f64 },
    /// A decode fault recurred within the cool-down.
    Unrecoverable,
    /// The fault is not a decode fault and is never retried.
    Fatal,
}

/// Rate-limited restart policy for decode faults.
#[derive(Debug, Clone)]
pub struct ErrorRecovery {
    cooldown: Duration,
    skip_secs: f64,
    last_decode_fault: Option<Instant>,
}

impl ErrorRecovery {
    pub fn new(cooldown: Duration, skip_secs: f64) -> Self {
        Self {
            cooldown,
            skip_secs,
            last_decode_fault: None,
        }
    }

    /// Forget fault history (new media).
    pub fn reset(&mut self) {
        self.last_decode_fault = None;
    }

    pub fn observe(&mut self, fault: &SurfaceFault, position: f64, now: Instant) -> RecoveryAction {
        if !fault.is_decode() {
            return RecoveryAction::Fatal;
        }

        let previous = self.last_decode_fault.replace(now);
        match previous {
            Some(at) if now.saturating_duration_since(at) < self.cooldown => {
                RecoveryAction::Unrecoverable
            }
            _ => RecoveryAction::Restart {
                at: position + self.skip_secs,
            },
        }
    }
}
