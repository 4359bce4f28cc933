//! Sratim - adaptive playback for remote media libraries
//!
//! This library crate exposes the playback engine for the CLI and for
//! integration testing.

pub mod config;
pub mod endpoint;
pub mod headless;
pub mod playback;
pub mod sink;
