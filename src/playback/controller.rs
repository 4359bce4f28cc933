//! The session controller actor.
//!
//! One tokio task owns the sink, the pending-chunk queue, the descriptor
//! cache and the current [`PlaybackSession`]. Commands from the UI, fetch
//! events and subtitle results all arrive over channels and are handled one
//! at a time, so sink operations never overlap.
//!
//! Every restart creates a successor session with a new id. Fetch events and
//! subtitle results carry the session id (or subtitle generation) they were
//! produced for and are dropped when it is no longer current.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use sratim_common::{Error, MediaRef, Result, SessionId, TrackKind};

use super::appender::{AppendOutcome, SinkAppender};
use super::events::{Event, PlayerEvent, PlayerEventBus, PlayerSnapshot};
use super::fetch::{FetchEvent, FetchHandle, FetchPipeline};
use super::flow::{FlowController, FlowDecision};
use super::metadata::MetadataGate;
use super::recovery::{ErrorRecovery, RecoveryAction, SurfaceFault};
use super::session::{PlaybackSession, SessionState};
use super::sink::{MediaSink, SinkFormat};
use crate::config::PlayerConfig;
use crate::endpoint::{MediaEndpoint, StreamRequest};

/// Commands buffered between handles and the actor.
const COMMAND_CAPACITY: usize = 32;

enum Command {
    Start {
        media: MediaRef,
        start_secs: f64,
        audio_track: Option<usize>,
        reply: oneshot::Sender<Result<SessionId>>,
    },
    Seek {
        time: f64,
        reply: oneshot::Sender<Result<SessionId>>,
    },
    SwitchAudio {
        index: usize,
        reply: oneshot::Sender<Result<SessionId>>,
    },
    SwitchSubtitle {
        index: Option<usize>,
        reply: oneshot::Sender<Result<()>>,
    },
    Clock {
        position: f64,
    },
    Fault {
        fault: SurfaceFault,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Result of a background subtitle fetch.
struct SubtitleLoaded {
    generation: u64,
    index: usize,
    result: Result<String>,
}

struct ActiveFetch {
    handle: FetchHandle,
    events: mpsc::Receiver<FetchEvent>,
    closed: bool,
}

enum Input {
    Command(Option<Command>),
    Subtitle(SubtitleLoaded),
    Append,
    Fetch(FetchEvent),
}

/// Cloneable handle to a running [`SessionController`].
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::Sender<Command>,
    events: Arc<PlayerEventBus>,
    snapshot: watch::Receiver<PlayerSnapshot>,
}

impl PlayerHandle {
    /// Start playing `media` at `start_secs`, replacing whatever plays now.
    pub async fn start(&self, media: MediaRef, start_secs: f64) -> Result<SessionId> {
        self.start_with_audio_track(media, start_secs, None).await
    }

    /// Like [`start`](Self::start), streaming `audio_track` from the first
    /// request instead of the first audio track.
    pub async fn start_with_audio_track(
        &self,
        media: MediaRef,
        start_secs: f64,
        audio_track: Option<usize>,
    ) -> Result<SessionId> {
        self.request(|reply| Command::Start {
            media,
            start_secs,
            audio_track,
            reply,
        })
        .await?
    }

    /// Restart the stream at `time` seconds.
    pub async fn seek(&self, time: f64) -> Result<SessionId> {
        self.request(|reply| Command::Seek { time, reply }).await?
    }

    /// Restart the stream at the current position with another audio track.
    pub async fn switch_audio_track(&self, index: usize) -> Result<SessionId> {
        self.request(|reply| Command::SwitchAudio { index, reply })
            .await?
    }

    /// Select a subtitle track, or turn subtitles off with `None`.
    pub async fn switch_subtitle_track(&self, index: Option<usize>) -> Result<()> {
        self.request(|reply| Command::SwitchSubtitle { index, reply })
            .await?
    }

    /// Feed the playback clock.
    pub async fn report_position(&self, position: f64) -> Result<()> {
        self.send(Command::Clock { position }).await
    }

    /// Report a fault raised by the playback surface.
    pub async fn report_fault(&self, fault: SurfaceFault) -> Result<()> {
        self.send(Command::Fault { fault }).await
    }

    /// Tear down the current session and stop the controller.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        self.events.recent_events(n)
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshot.clone()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::invalid_state("player has shut down"))
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await
            .map_err(|_| Error::invalid_state("player has shut down"))
    }
}

/// Owns one player's playback state. See the module docs.
pub struct SessionController {
    config: PlayerConfig,
    endpoint: Arc<dyn MediaEndpoint>,
    gate: MetadataGate,
    sink: Box<dyn MediaSink>,
    appender: SinkAppender,
    flow: FlowController,
    recovery: ErrorRecovery,
    session: Option<PlaybackSession>,
    fetch: Option<ActiveFetch>,
    position: f64,
    subtitle_generation: u64,
    subtitle_task: Option<JoinHandle<()>>,
    subtitle_tx: mpsc::UnboundedSender<SubtitleLoaded>,
    events: Arc<PlayerEventBus>,
    snapshot: watch::Sender<PlayerSnapshot>,
}

impl SessionController {
    /// Spawn a controller driving `sink` with media from `endpoint`.
    pub fn spawn(
        config: &PlayerConfig,
        endpoint: Arc<dyn MediaEndpoint>,
        sink: Box<dyn MediaSink>,
    ) -> PlayerHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (subtitle_tx, subtitle_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(PlayerSnapshot::default());
        let events = Arc::new(PlayerEventBus::new(config.event_capacity));

        let controller = Self {
            config: config.clone(),
            gate: MetadataGate::new(endpoint.clone()),
            endpoint,
            sink,
            appender: SinkAppender::new(config),
            flow: FlowController::new(config.look_ahead_ceiling_secs),
            recovery: ErrorRecovery::new(config.decode_cooldown(), config.decode_skip_secs),
            session: None,
            fetch: None,
            position: 0.0,
            subtitle_generation: 0,
            subtitle_task: None,
            subtitle_tx,
            events: events.clone(),
            snapshot: snapshot_tx,
        };

        tokio::spawn(controller.run(command_rx, subtitle_rx));

        PlayerHandle {
            commands: command_tx,
            events,
            snapshot: snapshot_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut subtitles: mpsc::UnboundedReceiver<SubtitleLoaded>,
    ) {
        tracing::debug!("Session controller started");

        loop {
            let appendable = self.appendable();
            // Appends go ahead of new fetch events so the queue stays short
            // and the fetch channel applies backpressure.
            let input = tokio::select! {
                biased;
                command = commands.recv() => Input::Command(command),
                Some(loaded) = subtitles.recv() => Input::Subtitle(loaded),
                _ = std::future::ready(()), if appendable => Input::Append,
                event = next_fetch_event(&mut self.fetch) => Input::Fetch(event),
            };

            match input {
                Input::Command(None) => {
                    self.teardown();
                    break;
                }
                Input::Command(Some(Command::Stop { reply })) => {
                    self.teardown();
                    let _ = reply.send(());
                    break;
                }
                Input::Command(Some(command)) => self.handle_command(command).await,
                Input::Subtitle(loaded) => self.on_subtitle(loaded),
                Input::Append => self.append_next().await,
                Input::Fetch(event) => self.on_fetch_event(event).await,
            }
        }

        tracing::debug!("Session controller stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                media,
                start_secs,
                audio_track,
                reply,
            } => {
                let result = self.start(media, start_secs, audio_track).await;
                let _ = reply.send(result);
            }
            Command::Seek { time, reply } => {
                let audio = self.session.as_ref().and_then(|s| s.audio_track);
                let result = self.restart(time, audio, SessionState::Seeking).await;
                let _ = reply.send(result);
            }
            Command::SwitchAudio { index, reply } => {
                let result = self.switch_audio(index).await;
                let _ = reply.send(result);
            }
            Command::SwitchSubtitle { index, reply } => {
                let result = self.switch_subtitle(index);
                let _ = reply.send(result);
            }
            Command::Clock { position } => self.on_clock(position),
            Command::Fault { fault } => self.on_fault(fault).await,
            Command::Stop { reply } => {
                // Handled by the run loop.
                let _ = reply.send(());
            }
        }
    }

    // -- Commands -------------------------------------------------------------

    async fn start(
        &mut self,
        media: MediaRef,
        start_secs: f64,
        audio_track: Option<usize>,
    ) -> Result<SessionId> {
        if !start_secs.is_finite() {
            return Err(Error::invalid_input(format!(
                "start time must be finite, got {}",
                start_secs
            )));
        }

        self.teardown();
        self.recovery.reset();

        let from = self
            .session
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state());
        let session = PlaybackSession::new(media.clone(), start_secs.max(0.0));
        let id = session.id;
        tracing::info!(session_id = %id, media = %media, start = start_secs, "Starting playback session");

        self.session = Some(session);
        self.position = start_secs.max(0.0);
        self.emit(PlayerEvent::StateChanged {
            session: id,
            from,
            to: SessionState::Initializing,
        });
        self.publish();

        match self.initialize(&media, start_secs, audio_track).await {
            Ok(()) => {
                self.publish();
                Ok(id)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn initialize(
        &mut self,
        media: &MediaRef,
        start_secs: f64,
        audio_track: Option<usize>,
    ) -> Result<()> {
        self.appender.op("reset", self.sink.reset()).await?;

        let descriptor = self.gate.resolve(media).await?;
        let format = SinkFormat::for_descriptor(&descriptor).ok_or_else(|| {
            Error::unsupported_format(format!(
                "no playable representation for {} video",
                descriptor.video_codec_family
            ))
        })?;
        tracing::debug!(mime_type = %format.mime_type, "Configuring sink");
        self.appender
            .op("configure", self.sink.configure(&format))
            .await?;

        let audio_track = match audio_track {
            Some(index) if descriptor.audio_track(index).is_none() => {
                return Err(Error::InvalidTrack {
                    kind: TrackKind::Audio,
                    index,
                });
            }
            Some(index) => Some(index),
            None => descriptor.has_audio().then_some(0),
        };
        let start = descriptor.clamp_time(start_secs, self.config.seek_end_guard_secs);

        let session = self.current_mut()?;
        let id = session.id;
        session.descriptor = Some(descriptor.clone());
        session.start_secs = start;
        session.audio_track = audio_track;
        self.position = start;

        self.emit(PlayerEvent::DescriptorLoaded {
            session: id,
            descriptor,
        });

        self.open_fetch()?;
        self.set_state(SessionState::Streaming)
    }

    /// Replace the current session with a successor streaming from `time`.
    async fn restart(
        &mut self,
        time: f64,
        audio_track: Option<usize>,
        via: SessionState,
    ) -> Result<SessionId> {
        if !time.is_finite() {
            return Err(Error::invalid_input(format!(
                "seek time must be finite, got {}",
                time
            )));
        }

        let current = self.current()?;
        let descriptor = current
            .descriptor
            .clone()
            .ok_or_else(|| Error::invalid_state("media descriptor not loaded yet"))?;
        let target = descriptor.clamp_time(time, self.config.seek_end_guard_secs);
        let next = current.successor(target, audio_track, via)?;
        let from = current.state();
        let previous_id = current.id;
        let id = next.id;

        tracing::info!(
            session_id = %id,
            previous = %previous_id,
            target,
            audio_track = ?audio_track,
            reason = %via,
            "Restarting stream"
        );

        if let Some(active) = self.fetch.take() {
            active.handle.cancel();
        }
        self.flow.reset();
        self.session = Some(next);
        self.position = target;
        self.emit(PlayerEvent::StateChanged {
            session: id,
            from,
            to: via,
        });

        match self.reopen().await {
            Ok(()) => {
                self.publish();
                Ok(id)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Empty the sink and stream the current session from its start.
    async fn reopen(&mut self) -> Result<()> {
        self.appender.flush(self.sink.as_mut()).await?;
        self.open_fetch()?;
        self.set_state(SessionState::Streaming)
    }

    async fn switch_audio(&mut self, index: usize) -> Result<SessionId> {
        let current = self.current()?;
        let known = current
            .descriptor
            .as_ref()
            .is_some_and(|d| d.audio_track(index).is_some());
        if !known {
            return Err(Error::InvalidTrack {
                kind: TrackKind::Audio,
                index,
            });
        }
        self.restart(self.position, Some(index), SessionState::TrackSwitching)
            .await
    }

    fn switch_subtitle(&mut self, index: Option<usize>) -> Result<()> {
        let current = self.current()?;
        if current.state() == SessionState::Error {
            return Err(Error::invalid_state("session has failed"));
        }
        if let Some(i) = index {
            let known = current
                .descriptor
                .as_ref()
                .is_some_and(|d| d.subtitle_track(i).is_some());
            if !known {
                return Err(Error::InvalidTrack {
                    kind: TrackKind::Subtitle,
                    index: i,
                });
            }
        }
        let id = current.id;
        let media = current.media.clone();

        self.cancel_subtitles();
        self.current_mut()?.subtitle_track = index;

        match index {
            None => {
                tracing::debug!(session_id = %id, "Subtitles off");
                self.emit(PlayerEvent::SubtitleTrack {
                    session: id,
                    index: None,
                    text: None,
                });
            }
            Some(index) => {
                tracing::debug!(session_id = %id, index, "Loading subtitle track");
                let generation = self.subtitle_generation;
                let endpoint = self.endpoint.clone();
                let tx = self.subtitle_tx.clone();
                self.subtitle_task = Some(tokio::spawn(async move {
                    let result = endpoint.subtitles(&media, index).await;
                    let _ = tx.send(SubtitleLoaded {
                        generation,
                        index,
                        result,
                    });
                }));
            }
        }

        self.publish();
        Ok(())
    }

    fn on_clock(&mut self, position: f64) {
        if !position.is_finite() || self.session.is_none() {
            return;
        }
        self.position = position.max(0.0);
        self.check_flow();
        self.publish();
    }

    async fn on_fault(&mut self, fault: SurfaceFault) {
        let Some(session) = self.session.as_ref() else {
            tracing::debug!("Ignoring fault with no session: {}", fault);
            return;
        };
        if session.state() == SessionState::Error {
            tracing::debug!(session_id = %session.id, "Ignoring fault on failed session: {}", fault);
            return;
        }
        let id = session.id;
        let audio_track = session.audio_track;
        let position = self.position;

        match self.recovery.observe(&fault, position, Instant::now()) {
            RecoveryAction::Restart { at } => {
                let to = session
                    .descriptor
                    .as_ref()
                    .map_or(at, |d| d.clamp_time(at, self.config.seek_end_guard_secs));
                tracing::warn!(session_id = %id, position, to, "Recovering from {}", fault);
                self.emit(PlayerEvent::Recovering {
                    session: id,
                    from: position,
                    to,
                });
                if let Err(e) = self.restart(at, audio_track, SessionState::Seeking).await {
                    // Precondition failures (e.g. still initializing) leave
                    // the session as it was; treat them as fatal too.
                    if self.state() != SessionState::Error {
                        self.fail(&e);
                    }
                }
            }
            RecoveryAction::Unrecoverable => {
                let err = Error::unrecoverable(format!(
                    "decode faults within {:.1}s: {}",
                    self.config.decode_cooldown_secs,
                    fault.message()
                ));
                self.fail(&err);
            }
            RecoveryAction::Fatal => {
                self.fail(&Error::PlaybackFault(fault.to_string()));
            }
        }
    }

    // -- Asynchronous deliveries ----------------------------------------------

    async fn on_fetch_event(&mut self, event: FetchEvent) {
        let current = self.session.as_ref().map(|s| s.id);
        if current != Some(event.session()) {
            tracing::trace!(stale = %event.session(), "Dropping stale fetch event");
            return;
        }

        match event {
            FetchEvent::Opened {
                session,
                actual_start,
            } => {
                let Ok(current) = self.current_mut() else {
                    return;
                };
                current.actual_start_secs = actual_start;
                let requested = current.start_secs;
                let offset = actual_start.unwrap_or(requested);
                tracing::debug!(session_id = %session, requested, actual_start = ?actual_start, "Stream opened");

                if let Err(e) = self
                    .appender
                    .op("set_timestamp_offset", self.sink.set_timestamp_offset(offset))
                    .await
                {
                    self.fail(&e);
                    return;
                }
                self.emit(PlayerEvent::StreamOpened {
                    session,
                    requested_start: requested,
                    actual_start,
                });
            }
            FetchEvent::Chunk { bytes, .. } => {
                self.appender.enqueue(bytes);
            }
            FetchEvent::Exhausted { session } => {
                tracing::debug!(session_id = %session, queued = self.appender.len(), "Fetch exhausted, draining");
                self.fetch = None;
                if let Err(e) = self.set_state(SessionState::Draining) {
                    tracing::warn!(session_id = %session, "Ignoring end of stream: {}", e);
                }
                self.maybe_finish().await;
            }
            FetchEvent::Failed { error, .. } => {
                self.fail(&error);
                return;
            }
        }

        self.publish();
    }

    fn on_subtitle(&mut self, loaded: SubtitleLoaded) {
        if loaded.generation != self.subtitle_generation {
            tracing::trace!(index = loaded.index, "Dropping superseded subtitle result");
            return;
        }
        self.subtitle_task = None;
        let Some(id) = self.session.as_ref().map(|s| s.id) else {
            return;
        };

        match loaded.result {
            Ok(text) => {
                tracing::debug!(session_id = %id, index = loaded.index, bytes = text.len(), "Subtitle track loaded");
                self.emit(PlayerEvent::SubtitleTrack {
                    session: id,
                    index: Some(loaded.index),
                    text: Some(text),
                });
            }
            Err(e) => {
                tracing::warn!(session_id = %id, index = loaded.index, "Subtitle fetch failed: {}", e);
                self.emit(PlayerEvent::Warning {
                    session: Some(id),
                    message: format!("subtitle track {} unavailable: {}", loaded.index, e),
                });
            }
        }
    }

    async fn append_next(&mut self) {
        let position = self.position;
        match self
            .appender
            .append_next(self.sink.as_mut(), position)
            .await
        {
            Ok(AppendOutcome::Idle) => {}
            Ok(AppendOutcome::Appended { bytes, trimmed }) => {
                tracing::trace!(bytes, "Appended chunk");
                if let Some(range) = trimmed {
                    tracing::debug!(range = %range, "Trimmed played content to make room");
                }
            }
            Ok(AppendOutcome::Dropped { bytes }) => {
                let session = self.session.as_ref().map(|s| s.id);
                self.emit(PlayerEvent::Warning {
                    session,
                    message: format!("sink full, dropped {} byte chunk", bytes),
                });
            }
            Err(e) => {
                self.fail(&e);
                return;
            }
        }

        self.check_flow();
        self.maybe_finish().await;
        self.publish();
    }

    // -- Helpers --------------------------------------------------------------

    fn appendable(&self) -> bool {
        !self.appender.is_empty()
            && matches!(
                self.state(),
                SessionState::Streaming | SessionState::Draining
            )
    }

    fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state())
    }

    fn current(&self) -> Result<&PlaybackSession> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::invalid_state("no active session"))
    }

    fn current_mut(&mut self) -> Result<&mut PlaybackSession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::invalid_state("no active session"))
    }

    fn set_state(&mut self, next: SessionState) -> Result<()> {
        let session = self.current_mut()?;
        let from = session.state();
        session.transition(next)?;
        let id = session.id;
        self.emit(PlayerEvent::StateChanged {
            session: id,
            from,
            to: next,
        });
        Ok(())
    }

    fn open_fetch(&mut self) -> Result<()> {
        let session = self.current()?;
        let request = StreamRequest {
            media: session.media.clone(),
            start_secs: session.start_secs,
            audio_track: session.audio_track,
        };
        let (handle, events) = FetchPipeline::spawn(
            self.endpoint.clone(),
            request,
            session.id,
            self.config.fetch_channel_capacity,
        );
        self.flow.reset();
        self.fetch = Some(ActiveFetch {
            handle,
            events,
            closed: false,
        });
        Ok(())
    }

    /// Finalize the sink once a drained stream has nothing left to append.
    async fn maybe_finish(&mut self) {
        if self.state() != SessionState::Draining || !self.appender.is_empty() {
            return;
        }
        if let Err(e) = self
            .appender
            .op("end_of_stream", self.sink.end_of_stream())
            .await
        {
            self.fail(&e);
            return;
        }
        if self.set_state(SessionState::Ended).is_ok() {
            if let Some(id) = self.session.as_ref().map(|s| s.id) {
                tracing::info!(session_id = %id, "Playback stream ended");
                self.emit(PlayerEvent::Ended { session: id });
            }
        }
    }

    fn check_flow(&mut self) {
        let Some(active) = self.fetch.as_ref() else {
            return;
        };
        let session = active.handle.session();
        let buffered = self.sink.buffered();

        match self.flow.check(&buffered, self.position) {
            FlowDecision::Hold => {}
            FlowDecision::Pause { ahead } => {
                active.handle.pause();
                tracing::debug!(session_id = %session, ahead, "Look-ahead ceiling reached, pausing fetch");
                self.emit(PlayerEvent::FlowPaused {
                    session,
                    buffered_ahead: ahead,
                });
            }
            FlowDecision::Resume { ahead } => {
                active.handle.resume();
                tracing::debug!(session_id = %session, ahead, "Resuming fetch");
                self.emit(PlayerEvent::FlowResumed {
                    session,
                    buffered_ahead: ahead,
                });
            }
        }
    }

    fn cancel_subtitles(&mut self) {
        self.subtitle_generation += 1;
        if let Some(task) = self.subtitle_task.take() {
            task.abort();
        }
    }

    /// Stop everything in flight without touching the session state.
    fn teardown(&mut self) {
        if let Some(active) = self.fetch.take() {
            active.handle.cancel();
        }
        let discarded = self.appender.clear();
        if discarded > 0 {
            tracing::trace!(discarded, "Discarded queued chunks");
        }
        self.flow.reset();
        self.cancel_subtitles();
    }

    /// Move the current session to `Error` and stop all activity for it.
    fn fail(&mut self, err: &Error) {
        let id = self.session.as_ref().map(|s| s.id);
        match id {
            Some(id) => tracing::error!(session_id = %id, kind = err.kind(), "Playback failed: {}", err),
            None => tracing::error!(kind = err.kind(), "Playback failed: {}", err),
        }

        self.teardown();
        if let Some(session) = self.session.as_mut() {
            let from = session.state();
            if session.transition(SessionState::Error).is_ok() {
                let id = session.id;
                self.emit(PlayerEvent::StateChanged {
                    session: id,
                    from,
                    to: SessionState::Error,
                });
            }
        }
        self.emit(PlayerEvent::Error {
            session: id,
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
        self.publish();
    }

    fn emit(&self, payload: PlayerEvent) {
        self.events.emit(payload);
    }

    fn publish(&self) {
        let buffered = self.sink.buffered();
        let session = self.session.as_ref();
        let snapshot = PlayerSnapshot {
            session: session.map(|s| s.id),
            state: self.state(),
            position: self.position,
            duration: session.and_then(|s| s.duration()),
            audio_track: session.and_then(|s| s.audio_track),
            subtitle_track: session.and_then(|s| s.subtitle_track),
            buffered_ahead: FlowController::ahead(&buffered, self.position),
            buffered,
            fetch_paused: self.fetch.as_ref().is_some_and(|f| f.handle.is_paused()),
            queued_chunks: self.appender.len(),
        };
        self.snapshot.send_replace(snapshot);
    }
}

/// Next event of the active fetch; pending when there is none.
async fn next_fetch_event(fetch: &mut Option<ActiveFetch>) -> FetchEvent {
    match fetch {
        Some(active) if !active.closed => match active.events.recv().await {
            Some(event) => event,
            None => {
                active.closed = true;
                std::future::pending().await
            }
        },
        _ => std::future::pending().await,
    }
}
