mod cli;

use sratim::{
    config, endpoint::HttpEndpoint, endpoint::MediaEndpoint, headless, playback::SinkFormat,
};
use sratim_common::MediaRef;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "sratim=trace,sratim_media=trace,sratim_common=debug,reqwest=debug".to_string()
        } else {
            "sratim=info,sratim_media=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Play {
            path,
            library,
            start,
            audio_track,
            subtitle_track,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let media = media_ref(path, library, config.endpoint.library_id.as_deref());
            let options = headless::PlayOptions {
                media,
                start_secs: headless::parse_time(&start)?,
                audio_track,
                subtitle_track,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(headless::run(&config, options))
        }
        Commands::Probe {
            path,
            library,
            json,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let media = media_ref(path, library, config.endpoint.library_id.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe(&config, &media, json))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("sratim {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn media_ref(path: String, library: Option<String>, default_library: Option<&str>) -> MediaRef {
    let media = MediaRef::new(path);
    match library.as_deref().or(default_library) {
        Some(id) => media.with_library(id),
        None => media,
    }
}

async fn probe(config: &config::Config, media: &MediaRef, json: bool) -> Result<()> {
    let endpoint = HttpEndpoint::new(&config.endpoint)?;
    let descriptor = endpoint
        .describe(media)
        .await
        .with_context(|| format!("Failed to describe {}", media))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(());
    }

    println!("Media: {}", media);
    if let Some(ref title) = descriptor.title {
        println!("Title: {}", title);
    }
    match descriptor.duration_secs {
        Some(duration) => println!("Duration: {}", headless::format_time(duration)),
        None => println!("Duration: unknown"),
    }
    println!("Video: {}", descriptor.video_codec_family);
    match SinkFormat::for_descriptor(&descriptor) {
        Some(format) => println!("Sink format: {}", format.mime_type),
        None => println!("Sink format: not playable"),
    }

    println!("\nAudio Tracks: {}", descriptor.audio_tracks.len());
    for track in &descriptor.audio_tracks {
        print!("  [{}] {}", track.index, track.codec_name);
        if let Some(channels) = track.channels {
            print!(" {}ch", channels);
        }
        println!(" - {}", track.display_name());
    }

    println!("\nSubtitle Tracks: {}", descriptor.subtitle_tracks.len());
    for track in &descriptor.subtitle_tracks {
        println!("  [{}] {}", track.index, track.display_name());
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Endpoint: {}", config.endpoint.base_url);
            println!(
                "  Authenticated: {}",
                config.endpoint.session_token.is_some()
            );
            println!(
                "  Look-ahead ceiling: {}s",
                config.player.look_ahead_ceiling_secs
            );
            println!("  Retention: {}s", config.player.retention_secs);
            println!("  Sink capacity: {} MiB", config.sink.capacity_mb);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Endpoint: {}", config.endpoint.base_url);
        }
    }

    Ok(())
}
