use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub player: PlayerConfig,

    #[serde(default)]
    pub sink: SinkConfig,
}

/// Remote media server connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Base URL of the media server, without a trailing `/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value of the `session` cookie for authenticated servers
    #[serde(default)]
    pub session_token: Option<String>,

    /// Library used when a command does not name one
    #[serde(default)]
    pub library_id: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for metadata and subtitle requests (streams only use the
    /// connect timeout)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_token: None,
            library_id: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl EndpointConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Tuning for the playback session manager.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Pause fetching once this many seconds are buffered ahead (default: 30)
    #[serde(default = "default_look_ahead_ceiling")]
    pub look_ahead_ceiling_secs: f64,

    /// Content older than `position - retention` may be trimmed when the
    /// sink is full (default: 30)
    #[serde(default = "default_retention")]
    pub retention_secs: f64,

    /// Decode faults closer together than this are unrecoverable (default: 5)
    #[serde(default = "default_decode_cooldown")]
    pub decode_cooldown_secs: f64,

    /// How far past a decode fault playback restarts (default: 2)
    #[serde(default = "default_decode_skip")]
    pub decode_skip_secs: f64,

    /// Seeks are clamped this far before the end of the media (default: 0.1)
    #[serde(default = "default_seek_end_guard")]
    pub seek_end_guard_secs: f64,

    /// Deadline for any single sink operation
    #[serde(default = "default_sink_op_timeout")]
    pub sink_op_timeout_ms: u64,

    #[serde(default = "default_quiesce_poll_interval")]
    pub quiesce_poll_interval_ms: u64,

    #[serde(default = "default_quiesce_max_polls")]
    pub quiesce_max_polls: u32,

    /// Chunks a fetch may hold in flight before it waits for the controller
    #[serde(default = "default_fetch_channel_capacity")]
    pub fetch_channel_capacity: usize,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_look_ahead_ceiling() -> f64 {
    30.0
}
fn default_retention() -> f64 {
    30.0
}
fn default_decode_cooldown() -> f64 {
    5.0
}
fn default_decode_skip() -> f64 {
    2.0
}
fn default_seek_end_guard() -> f64 {
    0.1
}
fn default_sink_op_timeout() -> u64 {
    10_000
}
fn default_quiesce_poll_interval() -> u64 {
    20
}
fn default_quiesce_max_polls() -> u32 {
    250
}
fn default_fetch_channel_capacity() -> usize {
    8
}
fn default_event_capacity() -> usize {
    256
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            look_ahead_ceiling_secs: default_look_ahead_ceiling(),
            retention_secs: default_retention(),
            decode_cooldown_secs: default_decode_cooldown(),
            decode_skip_secs: default_decode_skip(),
            seek_end_guard_secs: default_seek_end_guard(),
            sink_op_timeout_ms: default_sink_op_timeout(),
            quiesce_poll_interval_ms: default_quiesce_poll_interval(),
            quiesce_max_polls: default_quiesce_max_polls(),
            fetch_channel_capacity: default_fetch_channel_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl PlayerConfig {
    pub fn sink_op_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_op_timeout_ms)
    }

    pub fn quiesce_poll_interval(&self) -> Duration {
        Duration::from_millis(self.quiesce_poll_interval_ms)
    }

    pub fn decode_cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.decode_cooldown_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Bundled in-memory sink.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    /// Byte budget before appends are refused (default: 256 MiB)
    #[serde(default = "default_sink_capacity")]
    pub capacity_mb: u64,
}

fn default_sink_capacity() -> u64 {
    256
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity_mb: default_sink_capacity(),
        }
    }
}

impl SinkConfig {
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_mb.saturating_mul(1024 * 1024)
    }
}
