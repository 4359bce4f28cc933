//! MP4 atom definitions and header parsing.

use crate::{Error, Result};

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const STYP: Self = Self(*b"styp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const MDAT: Self = Self(*b"mdat");
    pub const SIDX: Self = Self(*b"sidx");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHeader {
    /// Atom type code.
    pub atom_type: AtomType,
    /// Atom size including header.
    pub size: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl AtomHeader {
    /// Parse a header from the start of `data`.
    ///
    /// Returns `Ok(None)` when `data` does not yet hold a complete header.
    /// Size-zero atoms ("extends to end of file") cannot be framed in a
    /// stream and are rejected.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < 8 {
            return Ok(None);
        }
        let size32 = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let atom_type = AtomType([data[4], data[5], data[6], data[7]]);

        let (size, header_size) = match size32 {
            0 => {
                return Err(Error::unsupported(format!(
                    "open-ended '{}' atom in a stream",
                    atom_type
                )))
            }
            1 => {
                if data.len() < 16 {
                    return Ok(None);
                }
                let mut large = [0u8; 8];
                large.copy_from_slice(&data[8..16]);
                (u64::from_be_bytes(large), 16u8)
            }
            n => (n as u64, 8u8),
        };

        if size < header_size as u64 {
            return Err(Error::invalid_mp4(format!(
                "atom '{}' declares size {} smaller than its header",
                atom_type, size
            )));
        }

        Ok(Some(Self {
            atom_type,
            size,
            header_size,
        }))
    }

    /// Get the payload size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }
}

/// Bounds-checked big-endian reader over an atom payload.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::BufferUnderflow {
                need: n,
                have: self.remaining(),
            });
        }
        let data = self.data;
        let slice = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    /// Read a full-box version byte and 24-bit flags.
    pub fn read_version_flags(&mut self) -> Result<(u8, u32)> {
        let word = self.read_u32()?;
        Ok(((word >> 24) as u8, word & 0x00FF_FFFF))
    }

    /// Iterate the child atoms of the remaining payload.
    pub fn children(&self) -> ChildAtoms<'a> {
        let data = self.data;
        ChildAtoms {
            data: &data[self.pos..],
        }
    }
}

/// Iterator over sibling atoms in a fully-buffered container payload.
pub struct ChildAtoms<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for ChildAtoms<'a> {
    type Item = Result<(AtomType, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data;
        if data.is_empty() {
            return None;
        }
        let header = match AtomHeader::parse(data) {
            Ok(Some(h)) => h,
            Ok(None) => {
                let err = Error::invalid_mp4("truncated child atom header");
                self.data = &[];
                return Some(Err(err));
            }
            Err(e) => {
                self.data = &[];
                return Some(Err(e));
            }
        };
        let size = match usize::try_from(header.size) {
            Ok(size) if size <= data.len() => size,
            _ => {
                let err = Error::invalid_mp4(format!(
                    "child atom '{}' overruns its parent",
                    header.atom_type
                ));
                self.data = &[];
                return Some(Err(err));
            }
        };
        let payload = &data[header.header_size as usize..size];
        self.data = &data[size..];
        Some(Ok((header.atom_type, payload)))
    }
}
