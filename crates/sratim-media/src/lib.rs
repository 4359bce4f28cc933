//! Sratim-Media: fragmented MP4 helpers for the playback engine.
//!
//! The remote endpoint streams fragmented MP4 (`ftyp` + `moov`, then
//! `moof`/`mdat` pairs). The playback engine treats that byte stream as
//! opaque, but a sink still has to know which presentation times it holds.
//!
//! # Modules
//!
//! - `mp4` - box header parsing and a bounds-checked byte cursor
//! - `fmp4` - incremental fragment scanner plus init/fragment writers
//! - `codec` - MIME type and codec strings per video codec family
//!
//! # Architecture
//!
//! [`FragmentScanner`] is fed arbitrary chunk boundaries. It buffers only
//! box headers and metadata boxes; `mdat` payloads are counted and skipped.
//! For every completed `moof`+`mdat` pair it reports the fragment's time
//! span, derived from `tfdt` and the sample durations in `trun` (falling back
//! to `tfhd`/`trex` defaults), divided by the track's `mdhd` timescale.

pub mod codec;
pub mod error;
pub mod fmp4;
pub mod mp4;

pub use codec::mime_type;
pub use error::{Error, Result};
pub use fmp4::{
    FragmentBuilder, FragmentScanner, FragmentTiming, InitSegmentBuilder, SampleSpec, ScanEvent,
};
