//! Headless player for the command line.
//!
//! Drives a [`SessionController`] with a [`MemorySink`] and a simulated
//! playhead, printing player events and reading commands from stdin.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use sratim_common::{MediaRef, SessionId};

use crate::config::Config;
use crate::endpoint::HttpEndpoint;
use crate::playback::{PlayerEvent, PlayerHandle, PlayerSnapshot, SessionController, SessionState, SurfaceFault};
use crate::sink::MemorySink;

/// How often the playhead advances and reports its position.
const TICK: Duration = Duration::from_millis(250);

/// What to play.
#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub media: MediaRef,
    pub start_secs: f64,
    pub audio_track: Option<usize>,
    pub subtitle_track: Option<usize>,
}

/// A command typed at the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Seek(f64),
    Audio(usize),
    Subtitle(Option<usize>),
    Pause,
    Resume,
    Status,
    Fault(SurfaceFault),
    Quit,
}

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<ReplCommand> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };
    let arg = words.next();

    let command = match (verb, arg) {
        ("seek", Some(t)) => ReplCommand::Seek(parse_time(t)?),
        ("audio", Some(n)) => ReplCommand::Audio(n.parse().context("audio track must be a number")?),
        ("sub", Some("off")) => ReplCommand::Subtitle(None),
        ("sub", Some(n)) => ReplCommand::Subtitle(Some(
            n.parse().context("subtitle track must be a number or 'off'")?,
        )),
        ("pause", None) => ReplCommand::Pause,
        ("resume" | "play", None) => ReplCommand::Resume,
        ("status", None) => ReplCommand::Status,
        ("fault", Some(kind)) => {
            let message = words.collect::<Vec<_>>().join(" ");
            match kind {
                "decode" => ReplCommand::Fault(SurfaceFault::Decode(message)),
                "network" => ReplCommand::Fault(SurfaceFault::Network(message)),
                _ => ReplCommand::Fault(SurfaceFault::Other(message)),
            }
        }
        ("quit" | "exit" | "q", None) => ReplCommand::Quit,
        _ => bail!("unknown command: {}", line.trim()),
    };
    Ok(command)
}

/// Parse `90`, `1:30` or `1:02:03` into seconds.
pub fn parse_time(s: &str) -> Result<f64> {
    let mut secs = 0.0;
    for part in s.split(':') {
        let value: f64 = part
            .parse()
            .with_context(|| format!("invalid time: {}", s))?;
        secs = secs * 60.0 + value;
    }
    if !secs.is_finite() || secs < 0.0 {
        bail!("invalid time: {}", s);
    }
    Ok(secs)
}

/// Format seconds as `h:mm:ss`.
pub fn format_time(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// Simulated playback clock.
///
/// Advances in real time while playing and the position is buffered, and
/// stalls otherwise. Jumps to the controller's position whenever a new
/// session starts.
#[derive(Debug, Clone)]
pub struct Playhead {
    session: Option<SessionId>,
    position: f64,
    playing: bool,
}

impl Playhead {
    pub fn new(position: f64) -> Self {
        Self {
            session: None,
            position,
            playing: true,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Advance by `elapsed` against the latest snapshot. Returns the new
    /// position.
    pub fn advance(&mut self, snapshot: &PlayerSnapshot, elapsed: Duration) -> f64 {
        if snapshot.session != self.session {
            self.session = snapshot.session;
            self.position = snapshot.position;
            return self.position;
        }
        if !self.playing {
            return self.position;
        }
        let Some(range) = snapshot.buffered.iter().find(|r| r.contains(self.position)) else {
            return self.position;
        };
        self.position = (self.position + elapsed.as_secs_f64()).min(range.end);
        self.position
    }

    /// Whether the playhead reached the end of an ended stream.
    pub fn finished(&self, snapshot: &PlayerSnapshot) -> bool {
        if snapshot.state != SessionState::Ended {
            return false;
        }
        match snapshot.buffered.last() {
            Some(last) => self.position >= last.end - 0.05,
            None => true,
        }
    }
}

/// Play until the stream ends, stdin closes or `quit` is typed.
pub async fn run(config: &Config, options: PlayOptions) -> Result<()> {
    let endpoint = Arc::new(HttpEndpoint::new(&config.endpoint)?);
    let sink = Box::new(MemorySink::from_config(&config.sink));
    let player = SessionController::spawn(&config.player, endpoint, sink);
    let mut events = player.subscribe();

    let session = player
        .start_with_audio_track(options.media.clone(), options.start_secs, options.audio_track)
        .await
        .with_context(|| format!("failed to start playback of {}", options.media))?;
    tracing::info!(session_id = %session, "Playback started");

    if let Some(index) = options.subtitle_track {
        player.switch_subtitle_track(Some(index)).await?;
    }

    let mut playhead = Playhead::new(options.start_secs);
    let mut ticker = tokio::time::interval(TICK);
    let mut last_tick = Instant::now();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let snapshot = player.snapshot();
                let position = playhead.advance(&snapshot, now - last_tick);
                last_tick = now;
                if snapshot.state == SessionState::Error {
                    bail!("playback failed");
                }
                if playhead.finished(&snapshot) {
                    println!("Playback finished at {}", format_time(position));
                    break;
                }
                player.report_position(position).await?;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event.payload),
                Err(RecvError::Lagged(n)) => tracing::warn!("Missed {} player events", n),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                None => stdin_open = false,
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match parse_command(&line) {
                    Ok(ReplCommand::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = execute(&player, &mut playhead, command).await {
                            eprintln!("error: {}", e);
                        }
                    }
                    Err(e) => eprintln!("error: {}", e),
                },
            },
        }
    }

    player.shutdown().await.ok();
    Ok(())
}

async fn execute(player: &PlayerHandle, playhead: &mut Playhead, command: ReplCommand) -> Result<()> {
    match command {
        ReplCommand::Seek(t) => {
            player.seek(t).await?;
        }
        ReplCommand::Audio(index) => {
            player.switch_audio_track(index).await?;
        }
        ReplCommand::Subtitle(index) => player.switch_subtitle_track(index).await?,
        ReplCommand::Pause => playhead.set_playing(false),
        ReplCommand::Resume => playhead.set_playing(true),
        ReplCommand::Status => print_status(&player.snapshot()),
        ReplCommand::Fault(fault) => player.report_fault(fault).await?,
        ReplCommand::Quit => {}
    }
    Ok(())
}

fn print_status(snapshot: &PlayerSnapshot) {
    let duration = snapshot.duration.map_or_else(|| "?".to_string(), format_time);
    println!(
        "[{}] {} / {}  ahead {:.1}s{}  queued {}",
        snapshot.state,
        format_time(snapshot.position),
        duration,
        snapshot.buffered_ahead,
        if snapshot.fetch_paused { " (paused fetch)" } else { "" },
        snapshot.queued_chunks,
    );
}

fn print_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::StateChanged { from, to, .. } => println!("state: {} -> {}", from, to),
        PlayerEvent::DescriptorLoaded { descriptor, .. } => {
            let title = descriptor.title.as_deref().unwrap_or("(untitled)");
            let duration = descriptor
                .duration_secs
                .map_or_else(|| "unknown length".to_string(), format_time);
            println!("loaded: {} [{}] {}", title, descriptor.video_codec_family, duration);
            for track in &descriptor.audio_tracks {
                println!("  audio {}: {}", track.index, track.display_name());
            }
            for track in &descriptor.subtitle_tracks {
                println!("  sub   {}: {}", track.index, track.display_name());
            }
        }
        PlayerEvent::StreamOpened {
            requested_start,
            actual_start,
            ..
        } => match actual_start {
            Some(actual) => println!(
                "stream: requested {} started {}",
                format_time(*requested_start),
                format_time(*actual)
            ),
            None => println!("stream: started {}", format_time(*requested_start)),
        },
        PlayerEvent::FlowPaused { buffered_ahead, .. } => {
            tracing::debug!(buffered_ahead, "Fetch paused")
        }
        PlayerEvent::FlowResumed { buffered_ahead, .. } => {
            tracing::debug!(buffered_ahead, "Fetch resumed")
        }
        PlayerEvent::SubtitleTrack { index, text, .. } => match (index, text) {
            (Some(i), Some(text)) => println!("subtitles: track {} ({} cues)", i, count_cues(text)),
            _ => println!("subtitles: off"),
        },
        PlayerEvent::Recovering { from, to, .. } => {
            println!("recovering: {} -> {}", format_time(*from), format_time(*to))
        }
        PlayerEvent::Warning { message, .. } => println!("warning: {}", message),
        PlayerEvent::Error { kind, message, .. } => println!("error ({}): {}", kind, message),
        PlayerEvent::Ended { .. } => println!("stream complete"),
    }
}

/// Number of cue timing lines in a WebVTT document.
fn count_cues(vtt: &str) -> usize {
    vtt.lines().filter(|l| l.contains("-->")).count()
}
