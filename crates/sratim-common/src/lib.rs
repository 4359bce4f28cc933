//! Sratim-Common: Shared types, IDs, and the playback error taxonomy.
//!
//! This crate provides the vocabulary shared by the playback engine, the
//! remote endpoint client and the media helpers:
//!
//! - **Typed IDs**: [`SessionId`] identifies one playback session
//! - **Core Types**: media references, descriptors, tracks and time ranges
//! - **Error Handling**: the [`Error`] taxonomy and [`Result`] alias
//!
//! # Examples
//!
//! ```
//! use sratim_common::{Error, MediaRef, Result, SessionId, VideoCodecFamily};
//!
//! let media = MediaRef::new("Movies/Heat (1995)/Heat.mkv").with_library("movies");
//! assert_eq!(media.library_id.as_deref(), Some("movies"));
//!
//! assert_eq!(VideoCodecFamily::from_codec_name("hevc"), VideoCodecFamily::Hevc);
//!
//! let first = SessionId::new();
//! assert_ne!(first, SessionId::new());
//!
//! fn example() -> Result<()> {
//!     Err(Error::metadata_unavailable("server returned 404"))
//! }
//! assert!(example().is_err());
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
