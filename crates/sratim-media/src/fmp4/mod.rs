//! Fragmented MP4 (fMP4) scanning and writing.
//!
//! - [`FragmentScanner`] follows a live fMP4 byte stream and reports the
//!   presentation span of each completed fragment
//! - [`InitSegmentBuilder`] and [`FragmentBuilder`] produce timing-accurate
//!   streams for fixtures and benchmarks

mod scanner;
mod writer;

pub use scanner::{FragmentScanner, FragmentTiming, ScanEvent, TrackTiming};
pub use writer::{FragmentBuilder, InitSegmentBuilder, SampleSpec};
