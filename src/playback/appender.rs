//! Ordered, serialized delivery of chunks into the sink.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use sratim_common::{buffered_start, Error, Result, TimeRange};

use super::sink::{MediaSink, SinkError};
use crate::config::PlayerConfig;

/// What one call to [`SinkAppender::append_next`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// Nothing was queued.
    Idle,
    /// The chunk was appended, after trimming `trimmed` when the sink was full.
    Appended {
        bytes: usize,
        trimmed: Option<TimeRange>,
    },
    /// The sink stayed full and the chunk was discarded.
    Dropped { bytes: usize },
}

/// FIFO of pending chunks plus the sink operation discipline.
///
/// Every sink operation goes through a deadline; quiescence is polled a
/// bounded number of times. Either limit yields [`Error::SinkBusyTimeout`].
#[derive(Debug)]
pub struct SinkAppender {
    queue: VecDeque<Bytes>,
    queued_bytes: usize,
    retention_secs: f64,
    op_timeout: Duration,
    poll_interval: Duration,
    max_polls: u32,
}

impl SinkAppender {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            queued_bytes: 0,
            retention_secs: config.retention_secs,
            op_timeout: config.sink_op_timeout(),
            poll_interval: config.quiesce_poll_interval(),
            max_polls: config.quiesce_max_polls,
        }
    }

    pub fn enqueue(&mut self, chunk: Bytes) {
        self.queued_bytes += chunk.len();
        self.queue.push_back(chunk);
    }

    /// Discard every pending chunk. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        self.queued_bytes = 0;
        discarded
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// Append the oldest pending chunk.
    ///
    /// On quota exhaustion, content older than `position - retention` is
    /// removed and the append retried once. A chunk that still does not fit
    /// is handed to [`MediaSink::discard`].
    pub async fn append_next(
        &mut self,
        sink: &mut dyn MediaSink,
        position: f64,
    ) -> Result<AppendOutcome> {
        let Some(chunk) = self.queue.pop_front() else {
            return Ok(AppendOutcome::Idle);
        };
        let bytes = chunk.len();
        self.queued_bytes -= bytes;

        match self.bounded("append", sink.append(chunk.clone())).await? {
            Ok(()) => {
                return Ok(AppendOutcome::Appended {
                    bytes,
                    trimmed: None,
                })
            }
            Err(SinkError::QuotaExceeded) => {}
            Err(e) => return Err(e.into()),
        }

        let Some(range) = self.trim_range(&sink.buffered(), position) else {
            tracing::warn!(
                bytes,
                position,
                "Sink full with nothing older than the retention window; dropping chunk"
            );
            self.op("discard", sink.discard(chunk)).await?;
            return Ok(AppendOutcome::Dropped { bytes });
        };

        tracing::debug!(range = %range, position, "Sink full, trimming played content");
        self.op("remove", sink.remove(range)).await?;
        self.quiesce(sink).await?;

        match self.bounded("append", sink.append(chunk.clone())).await? {
            Ok(()) => Ok(AppendOutcome::Appended {
                bytes,
                trimmed: Some(range),
            }),
            Err(SinkError::QuotaExceeded) => {
                tracing::warn!(bytes, range = %range, "Sink still full after trimming; dropping chunk");
                self.op("discard", sink.discard(chunk)).await?;
                Ok(AppendOutcome::Dropped { bytes })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Clear the queue, remove everything the sink holds and wait until it
    /// is idle.
    pub async fn flush(&mut self, sink: &mut dyn MediaSink) -> Result<()> {
        let discarded = self.clear();
        if discarded > 0 {
            tracing::trace!(discarded, "Discarded queued chunks");
        }
        self.op("remove", sink.remove(TimeRange::everything())).await?;
        self.quiesce(sink).await
    }

    /// Range eligible for trimming: from the oldest buffered content up to
    /// `position - retention`.
    pub fn trim_range(&self, buffered: &[TimeRange], position: f64) -> Option<TimeRange> {
        let start = buffered_start(buffered)?;
        let cutoff = position - self.retention_secs;
        (cutoff > start).then(|| TimeRange::new(start, cutoff))
    }

    /// Run a sink operation under the deadline, mapping its error.
    pub async fn op<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, SinkError>>,
    {
        self.bounded(operation, fut).await?.map_err(Error::from)
    }

    /// Run a sink operation under the deadline, leaving its own error intact.
    async fn bounded<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<std::result::Result<T, SinkError>>
    where
        F: Future<Output = std::result::Result<T, SinkError>>,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| Error::SinkBusyTimeout {
                operation,
                waited_ms: self.op_timeout.as_millis() as u64,
            })
    }

    /// Wait for the sink to finish any in-progress update.
    pub async fn quiesce(&self, sink: &mut dyn MediaSink) -> Result<()> {
        for _ in 0..self.max_polls {
            if !sink.is_updating() {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        if !sink.is_updating() {
            return Ok(());
        }
        Err(Error::SinkBusyTimeout {
            operation: "quiesce",
            waited_ms: (self.poll_interval * self.max_polls).as_millis() as u64,
        })
    }
}
