//! Adaptive playback session management.
//!
//! The [`SessionController`] drives a [`MediaSink`] from a remote
//! [`MediaEndpoint`](crate::endpoint::MediaEndpoint): it resolves the media
//! descriptor, streams fragmented MP4 into the sink, throttles the fetch
//! against a look-ahead ceiling and restarts the stream on seeks, audio
//! track switches and decode faults.

pub mod appender;
pub mod controller;
pub mod events;
pub mod fetch;
pub mod flow;
pub mod metadata;
pub mod recovery;
pub mod session;
pub mod sink;

pub use appender::{AppendOutcome, SinkAppender};
pub use controller::{PlayerHandle, SessionController};
pub use events::{Event, PlayerEvent, PlayerEventBus, PlayerSnapshot};
pub use fetch::{FetchEvent, FetchHandle, FetchPipeline};
pub use flow::{FlowController, FlowDecision};
pub use metadata::MetadataGate;
pub use recovery::{ErrorRecovery, RecoveryAction, SurfaceFault};
pub use session::{PlaybackSession, SessionState};
pub use sink::{MediaSink, SinkError, SinkFormat};
