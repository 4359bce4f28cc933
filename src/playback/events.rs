//! Player events and state snapshots.
//!
//! [`PlayerEventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that a late UI can catch up.
//! [`PlayerSnapshot`] is the latest-value view, published on a `watch`
//! channel by the controller.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use sratim_common::{MediaDescriptor, SessionId, TimeRange};

use super::session::SessionState;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

/// What happened in the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    StateChanged {
        session: SessionId,
        from: SessionState,
        to: SessionState,
    },
    DescriptorLoaded {
        session: SessionId,
        descriptor: Arc<MediaDescriptor>,
    },
    StreamOpened {
        session: SessionId,
        requested_start: f64,
        actual_start: Option<f64>,
    },
    FlowPaused {
        session: SessionId,
        buffered_ahead: f64,
    },
    FlowResumed {
        session: SessionId,
        buffered_ahead: f64,
    },
    /// New subtitle text, or `None` when subtitles were turned off.
    SubtitleTrack {
        session: SessionId,
        index: Option<usize>,
        text: Option<String>,
    },
    Recovering {
        session: SessionId,
        from: f64,
        to: f64,
    },
    Warning {
        session: Option<SessionId>,
        message: String,
    },
    Error {
        session: Option<SessionId>,
        kind: String,
        message: String,
    },
    Ended {
        session: SessionId,
    },
}

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: PlayerEvent,
}

impl Event {
    pub fn new(payload: PlayerEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct PlayerEventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl PlayerEventBus {
    /// `capacity` sizes the broadcast channel; the ring buffer always holds
    /// [`MAX_RECENT_EVENTS`].
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, payload: PlayerEvent) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// The `n` most recent events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        self.recent.read().iter().take(n).cloned().collect()
    }
}

impl Default for PlayerEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Latest player state for UI readout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub session: Option<SessionId>,
    pub state: SessionState,
    pub position: f64,
    pub duration: Option<f64>,
    pub audio_track: Option<usize>,
    pub subtitle_track: Option<usize>,
    pub buffered: Vec<TimeRange>,
    pub buffered_ahead: f64,
    pub fetch_paused: bool,
    pub queued_chunks: usize,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            session: None,
            state: SessionState::Idle,
            position: 0.0,
            duration: None,
            audio_track: None,
            subtitle_track: None,
            buffered: Vec::new(),
            buffered_ahead: 0.0,
            fetch_paused: false,
            queued_chunks: 0,
        }
    }
}
