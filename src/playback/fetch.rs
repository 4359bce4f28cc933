//! Streaming fetch of the fMP4 body.
//!
//! Each fetch runs in its own task and forwards body chunks, tagged with the
//! session they belong to, over a bounded channel. The controller can pause
//! pulling (flow control) and cancel it (restart, teardown). Dropping the
//! [`FetchHandle`] cancels the fetch.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use sratim_common::{Error, Result, SessionId};

use crate::endpoint::{MediaEndpoint, StreamRequest};

/// Progress of one fetch, as seen by the controller.
#[derive(Debug)]
pub enum FetchEvent {
    /// The endpoint accepted the request.
    Opened {
        session: SessionId,
        actual_start: Option<f64>,
    },
    /// Next body chunk, in order.
    Chunk { session: SessionId, bytes: Bytes },
    /// The body ended normally.
    Exhausted { session: SessionId },
    /// Opening or reading failed.
    Failed { session: SessionId, error: Error },
}

impl FetchEvent {
    pub fn session(&self) -> SessionId {
        match self {
            Self::Opened { session, .. }
            | Self::Chunk { session, .. }
            | Self::Exhausted { session }
            | Self::Failed { session, .. } => *session,
        }
    }
}

/// Control side of a running fetch.
#[derive(Debug)]
pub struct FetchHandle {
    session: SessionId,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
}

impl FetchHandle {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Stop the fetch. No further events are sent once this returns,
    /// except one that was already queued.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(session_id = %self.session, "Cancelling fetch");
            self.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop pulling from the body until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }
}

impl Drop for FetchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns fetch tasks.
pub struct FetchPipeline;

impl FetchPipeline {
    /// Open `request` on `endpoint` in a background task.
    ///
    /// `capacity` bounds the number of chunks in flight between the task and
    /// the controller.
    pub fn spawn(
        endpoint: Arc<dyn MediaEndpoint>,
        request: StreamRequest,
        session: SessionId,
        capacity: usize,
    ) -> (FetchHandle, mpsc::Receiver<FetchEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (paused_tx, paused_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let handle = FetchHandle {
            session,
            cancel: cancel.clone(),
            paused: paused_tx,
        };

        tokio::spawn(run_fetch(endpoint, request, session, tx, cancel, paused_rx));

        (handle, rx)
    }
}

async fn run_fetch(
    endpoint: Arc<dyn MediaEndpoint>,
    request: StreamRequest,
    session: SessionId,
    tx: mpsc::Sender<FetchEvent>,
    cancel: CancellationToken,
    mut paused: watch::Receiver<bool>,
) {
    tracing::debug!(
        session_id = %session,
        media = %request.media,
        start = request.start_secs,
        audio_track = ?request.audio_track,
        "Opening stream"
    );

    match pump(endpoint.as_ref(), &request, session, &tx, &cancel, &mut paused).await {
        Ok(chunks) => {
            tracing::debug!(session_id = %session, chunks, "Stream exhausted");
            let _ = send(&tx, &cancel, FetchEvent::Exhausted { session }).await;
        }
        Err(Error::FetchAborted) => {
            tracing::debug!(session_id = %session, "Fetch aborted");
        }
        Err(e) => {
            let error = match e {
                e @ Error::FetchFailed(_) => e,
                other => Error::fetch_failed(other.to_string()),
            };
            tracing::warn!(session_id = %session, "Fetch failed: {}", error);
            let _ = send(&tx, &cancel, FetchEvent::Failed { session, error }).await;
        }
    }
}

/// Open the stream and forward its body. Returns the number of chunks sent.
async fn pump(
    endpoint: &dyn MediaEndpoint,
    request: &StreamRequest,
    session: SessionId,
    tx: &mpsc::Sender<FetchEvent>,
    cancel: &CancellationToken,
    paused: &mut watch::Receiver<bool>,
) -> Result<u64> {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::FetchAborted),
        opened = endpoint.open_stream(request) => opened?,
    };

    send(
        tx,
        cancel,
        FetchEvent::Opened {
            session,
            actual_start: opened.actual_start,
        },
    )
    .await?;

    let mut body = opened.body;
    let mut chunks = 0u64;
    loop {
        wait_unpaused(paused, cancel).await?;

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::FetchAborted),
            next = body.next() => next,
        };

        match next {
            None => return Ok(chunks),
            Some(Err(e)) => return Err(e),
            Some(Ok(bytes)) if bytes.is_empty() => continue,
            Some(Ok(bytes)) => {
                send(tx, cancel, FetchEvent::Chunk { session, bytes }).await?;
                chunks += 1;
            }
        }
    }
}

async fn send(
    tx: &mpsc::Sender<FetchEvent>,
    cancel: &CancellationToken,
    event: FetchEvent,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::FetchAborted),
        sent = tx.send(event) => sent.map_err(|_| Error::FetchAborted),
    }
}

async fn wait_unpaused(
    paused: &mut watch::Receiver<bool>,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        if !*paused.borrow_and_update() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::FetchAborted),
            changed = paused.changed() => {
                if changed.is_err() {
                    return Err(Error::FetchAborted);
                }
            }
        }
    }
}
