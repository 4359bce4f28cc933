mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./sratim.toml",
        "~/.config/sratim/config.toml",
        "/etc/sratim/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Longest decode-fault cool-down accepted (one day).
const MAX_DECODE_COOLDOWN_SECS: f64 = 86_400.0;

/// Largest sink budget accepted (64 GiB).
const MAX_SINK_CAPACITY_MB: u64 = 64 * 1024;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let base = &config.endpoint.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        anyhow::bail!("Endpoint base_url must be an http(s) URL, got '{}'", base);
    }
    if config.endpoint.connect_timeout_secs == 0 {
        anyhow::bail!("Endpoint connect_timeout_secs cannot be 0");
    }

    let player = &config.player;
    for (name, value) in [
        ("look_ahead_ceiling_secs", player.look_ahead_ceiling_secs),
        ("retention_secs", player.retention_secs),
        ("decode_cooldown_secs", player.decode_cooldown_secs),
    ] {
        if !value.is_finite() || value <= 0.0 {
            anyhow::bail!("Player {} must be a positive number, got {}", name, value);
        }
    }
    if player.decode_cooldown_secs > MAX_DECODE_COOLDOWN_SECS {
        anyhow::bail!(
            "Player decode_cooldown_secs cannot exceed {}, got {}",
            MAX_DECODE_COOLDOWN_SECS,
            player.decode_cooldown_secs
        );
    }
    for (name, value) in [
        ("decode_skip_secs", player.decode_skip_secs),
        ("seek_end_guard_secs", player.seek_end_guard_secs),
    ] {
        if !value.is_finite() || value < 0.0 {
            anyhow::bail!("Player {} cannot be negative, got {}", name, value);
        }
    }
    if player.sink_op_timeout_ms == 0 {
        anyhow::bail!("Player sink_op_timeout_ms cannot be 0");
    }
    if player.quiesce_max_polls == 0 {
        anyhow::bail!("Player quiesce_max_polls cannot be 0");
    }
    if player.fetch_channel_capacity == 0 || player.event_capacity == 0 {
        anyhow::bail!("Player channel capacities cannot be 0");
    }

    if config.sink.capacity_mb == 0 {
        anyhow::bail!("Sink capacity_mb cannot be 0");
    }
    if config.sink.capacity_mb > MAX_SINK_CAPACITY_MB {
        anyhow::bail!(
            "Sink capacity_mb cannot exceed {}, got {}",
            MAX_SINK_CAPACITY_MB,
            config.sink.capacity_mb
        );
    }
    if player.retention_secs < player.look_ahead_ceiling_secs / 10.0 {
        tracing::warn!(
            retention = player.retention_secs,
            ceiling = player.look_ahead_ceiling_secs,
            "Retention is much shorter than the look-ahead ceiling; trimming may discard content just played"
        );
    }

    Ok(())
}
