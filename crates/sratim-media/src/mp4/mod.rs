//! MP4 box primitives.

mod atoms;

pub use atoms::{AtomHeader, AtomType, ByteCursor, ChildAtoms};
