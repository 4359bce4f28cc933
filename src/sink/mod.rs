//! Bundled [`MediaSink`](crate::playback::MediaSink) implementations.

mod memory;

pub use memory::MemorySink;
