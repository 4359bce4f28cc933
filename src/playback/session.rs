//! Playback session state.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use sratim_common::{Error, MediaDescriptor, MediaRef, Result, SessionId};

/// Lifecycle of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Initializing,
    Streaming,
    Seeking,
    TrackSwitching,
    Draining,
    Ended,
    Error,
}

impl SessionState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Error, _) => false,
            (_, Error) => true,
            (Idle, Initializing) => true,
            (Initializing, Streaming) => true,
            (Streaming, Seeking | TrackSwitching | Draining) => true,
            (Seeking | TrackSwitching, Streaming) => true,
            (Draining, Ended | Seeking | TrackSwitching) => true,
            (Ended, Seeking | TrackSwitching) => true,
            _ => false,
        }
    }

    /// Whether the session is done, either way.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Streaming => "streaming",
            Self::Seeking => "seeking",
            Self::TrackSwitching => "trackswitching",
            Self::Draining => "draining",
            Self::Ended => "ended",
            Self::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// The current playback session.
///
/// Restarts (seek, audio switch, decode recovery) do not mutate a session in
/// place; they create a successor with a fresh id so that anything still
/// addressed to the old id is recognisably stale.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub media: MediaRef,
    pub descriptor: Option<Arc<MediaDescriptor>>,
    pub start_secs: f64,
    pub actual_start_secs: Option<f64>,
    pub audio_track: Option<usize>,
    pub subtitle_track: Option<usize>,
    state: SessionState,
}

impl PlaybackSession {
    /// A new session, already `Initializing`.
    pub fn new(media: MediaRef, start_secs: f64) -> Self {
        Self {
            id: SessionId::new(),
            media,
            descriptor: None,
            start_secs,
            actual_start_secs: None,
            audio_track: None,
            subtitle_track: None,
            state: SessionState::Initializing,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`, refusing illegal transitions.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::invalid_state(format!(
                "cannot go from {} to {}",
                self.state, next
            )));
        }
        tracing::debug!(session_id = %self.id, from = %self.state, to = %next, "Session state change");
        self.state = next;
        Ok(())
    }

    /// Successor session restarting the same media at `start_secs`.
    ///
    /// `via` is the restart state (`Seeking` or `TrackSwitching`).
    pub fn successor(&self, start_secs: f64, audio_track: Option<usize>, via: SessionState) -> Result<Self> {
        if !self.state.can_transition_to(via) {
            return Err(Error::invalid_state(format!(
                "cannot restart a session that is {}",
                self.state
            )));
        }
        Ok(Self {
            id: SessionId::new(),
            media: self.media.clone(),
            descriptor: self.descriptor.clone(),
            start_secs,
            actual_start_secs: None,
            audio_track,
            subtitle_track: self.subtitle_track,
            state: via,
        })
    }

    pub fn duration(&self) -> Option<f64> {
        self.descriptor.as_ref().and_then(|d| d.duration_secs)
    }
}
