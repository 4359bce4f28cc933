//! Incremental fragment scanner.

use std::collections::HashMap;

use bytes::{Buf, BytesMut};

use crate::mp4::{AtomHeader, AtomType, ByteCursor};
use crate::{Error, Result};

/// Largest non-`mdat` atom the scanner is willing to buffer.
const MAX_METADATA_ATOM_SIZE: u64 = 16 * 1024 * 1024;

// tfhd flags
const TFHD_BASE_DATA_OFFSET: u32 = 0x000001;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x000008;

// trun flags
const TRUN_DATA_OFFSET: u32 = 0x000001;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
const TRUN_SAMPLE_DURATION: u32 = 0x000100;
const TRUN_SAMPLE_SIZE: u32 = 0x000200;
const TRUN_SAMPLE_FLAGS: u32 = 0x000400;
const TRUN_SAMPLE_CTS: u32 = 0x000800;

/// Timing parameters of one track, taken from the init segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackTiming {
    pub track_id: u32,
    /// Handler fourcc (`vide`, `soun`, ...).
    pub handler: [u8; 4],
    /// Media timescale from `mdhd`.
    pub timescale: u32,
    /// Default sample duration from `trex`, 0 when absent.
    pub default_sample_duration: u32,
}

impl TrackTiming {
    pub fn is_video(&self) -> bool {
        &self.handler == b"vide"
    }

    pub fn is_audio(&self) -> bool {
        &self.handler == b"soun"
    }
}

/// Presentation span of one complete `moof`+`mdat` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentTiming {
    pub sequence_number: u32,
    pub start_secs: f64,
    pub end_secs: f64,
    /// Bytes of the `moof` and its `mdat`.
    pub byte_size: u64,
}

impl FragmentTiming {
    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }
}

/// Something the scanner recognised in the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A `moov` box was parsed; timing state now follows these tracks.
    Init { tracks: Vec<TrackTiming>, byte_size: u64 },
    /// A fragment was completed.
    Fragment(FragmentTiming),
    /// A fragment completed that lost bytes to [`FragmentScanner::skip`].
    Damaged(FragmentTiming),
}

#[derive(Debug, Clone)]
struct TrackState {
    timing: TrackTiming,
    next_decode_time: u64,
}

/// Tracks fragment timing across arbitrary chunk boundaries.
///
/// Only box headers and metadata boxes are buffered; `mdat` payloads are
/// counted and dropped, so memory stays bounded by the largest `moof`.
#[derive(Debug, Default)]
pub struct FragmentScanner {
    pending: BytesMut,
    tracks: HashMap<u32, TrackState>,
    open_fragment: Option<FragmentTiming>,
    /// The open fragment's `moof` lost bytes.
    open_damaged: bool,
    /// The atom in progress lost bytes.
    damaged: bool,
    /// Inside [`FragmentScanner::skip`].
    skipping: bool,
    mdat_size: u64,
    skip_remaining: u64,
    bytes_seen: u64,
    bytes_attributed: u64,
}

impl FragmentScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an init segment has been seen.
    pub fn has_init(&self) -> bool {
        !self.tracks.is_empty()
    }

    /// Track timing parameters, ordered by track id.
    pub fn tracks(&self) -> Vec<TrackTiming> {
        let mut tracks: Vec<_> = self.tracks.values().map(|t| t.timing).collect();
        tracks.sort_by_key(|t| t.track_id);
        tracks
    }

    /// Total bytes pushed so far.
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Bytes that belong to atoms that have not completed yet.
    pub fn unattributed_bytes(&self) -> u64 {
        self.bytes_seen - self.bytes_attributed
    }

    /// Whether the atom or fragment in progress lost bytes.
    pub fn is_damaged(&self) -> bool {
        self.damaged || self.open_damaged
    }

    /// Forget everything, including track timing.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed bytes that were dropped instead of delivered.
    ///
    /// Atom boundaries stay aligned with the stream. Every fragment that
    /// contains any of these bytes is reported as [`ScanEvent::Damaged`].
    pub fn skip(&mut self, data: &[u8]) -> Result<Vec<ScanEvent>> {
        self.skipping = true;
        let events = self.push(data);
        self.skipping = false;
        let events = events?;
        self.damaged = !self.pending.is_empty() || self.skip_remaining > 0;
        Ok(events)
    }

    /// Feed the next chunk of the stream.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<ScanEvent>> {
        let mut events = Vec::new();
        let mut data = data;
        self.bytes_seen += data.len() as u64;

        if self.skip_remaining > 0 {
            let n = self.skip_remaining.min(data.len() as u64);
            self.skip_remaining -= n;
            data = &data[n as usize..];
            if self.skip_remaining > 0 {
                return Ok(events);
            }
            self.finish_mdat(&mut events)?;
        }

        self.pending.extend_from_slice(data);

        while let Some(header) = AtomHeader::parse(&self.pending)? {
            if header.atom_type == AtomType::MDAT {
                self.pending.advance(header.header_size as usize);
                let payload = header.data_size();
                let available = (self.pending.len() as u64).min(payload);
                self.pending.advance(available as usize);
                self.mdat_size = header.size;
                self.skip_remaining = payload - available;
                if self.skip_remaining > 0 {
                    break;
                }
                self.finish_mdat(&mut events)?;
                continue;
            }

            if header.size > MAX_METADATA_ATOM_SIZE {
                return Err(Error::invalid_mp4(format!(
                    "'{}' atom of {} bytes exceeds the metadata limit",
                    header.atom_type, header.size
                )));
            }
            let size = header.size as usize;
            if self.pending.len() < size {
                break;
            }

            let atom = self.pending.split_to(size).freeze();
            let payload = &atom[header.header_size as usize..];
            let damaged = std::mem::take(&mut self.damaged) | self.skipping;
            match header.atom_type {
                AtomType::MOOV => {
                    let tracks = self.parse_moov(payload)?;
                    self.bytes_attributed += header.size;
                    events.push(ScanEvent::Init {
                        tracks,
                        byte_size: header.size,
                    });
                }
                AtomType::MOOF => {
                    self.parse_moof(payload, header.size, damaged)?;
                }
                other => {
                    tracing::trace!(atom = %other, size = header.size, "skipping atom");
                    self.bytes_attributed += header.size;
                }
            }
        }

        Ok(events)
    }

    fn finish_mdat(&mut self, events: &mut Vec<ScanEvent>) -> Result<()> {
        let damaged = std::mem::take(&mut self.damaged)
            | std::mem::take(&mut self.open_damaged)
            | self.skipping;
        match self.open_fragment.take() {
            Some(mut fragment) => {
                fragment.byte_size = checked_add(fragment.byte_size, self.mdat_size)?;
                self.bytes_attributed += fragment.byte_size;
                events.push(if damaged {
                    ScanEvent::Damaged(fragment)
                } else {
                    ScanEvent::Fragment(fragment)
                });
            }
            None => {
                tracing::trace!(size = self.mdat_size, "mdat without a preceding moof");
                self.bytes_attributed += self.mdat_size;
            }
        }
        self.mdat_size = 0;
        Ok(())
    }

    fn parse_moov(&mut self, payload: &[u8]) -> Result<Vec<TrackTiming>> {
        let mut tracks: HashMap<u32, TrackState> = HashMap::new();
        let mut trex_defaults: HashMap<u32, u32> = HashMap::new();

        for child in ByteCursor::new(payload).children() {
            let (atom_type, body) = child?;
            match atom_type {
                AtomType::TRAK => {
                    let timing = parse_trak(body)?;
                    tracks.insert(
                        timing.track_id,
                        TrackState {
                            timing,
                            next_decode_time: 0,
                        },
                    );
                }
                AtomType::MVEX => {
                    for entry in ByteCursor::new(body).children() {
                        let (entry_type, entry_body) = entry?;
                        if entry_type == AtomType::TREX {
                            let mut c = ByteCursor::new(entry_body);
                            c.read_version_flags()?;
                            let track_id = c.read_u32()?;
                            c.skip(4)?; // default_sample_description_index
                            let duration = c.read_u32()?;
                            trex_defaults.insert(track_id, duration);
                        }
                    }
                }
                _ => {}
            }
        }

        if tracks.is_empty() {
            return Err(Error::MissingAtom("trak"));
        }
        for (track_id, duration) in trex_defaults {
            if let Some(track) = tracks.get_mut(&track_id) {
                track.timing.default_sample_duration = duration;
            }
        }

        self.tracks = tracks;
        Ok(self.tracks())
    }

    fn parse_moof(&mut self, payload: &[u8], moof_size: u64, damaged: bool) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(Error::MissingAtom("moov"));
        }

        let mut sequence_number = 0;
        let mut span: Option<(f64, f64)> = None;

        for child in ByteCursor::new(payload).children() {
            let (atom_type, body) = child?;
            match atom_type {
                AtomType::MFHD => {
                    let mut c = ByteCursor::new(body);
                    c.read_version_flags()?;
                    sequence_number = c.read_u32()?;
                }
                AtomType::TRAF => {
                    let (start, end) = self.parse_traf(body)?;
                    span = Some(match span {
                        Some((s, e)) => (s.min(start), e.max(end)),
                        None => (start, end),
                    });
                }
                _ => {}
            }
        }

        let Some((start_secs, end_secs)) = span else {
            tracing::trace!(sequence_number, "moof without track fragments");
            self.bytes_attributed += moof_size;
            return Ok(());
        };

        if let Some(previous) = self.open_fragment.take() {
            tracing::warn!(
                sequence_number = previous.sequence_number,
                "moof was not followed by mdat"
            );
            self.bytes_attributed += previous.byte_size;
        }
        self.open_damaged = damaged;
        self.open_fragment = Some(FragmentTiming {
            sequence_number,
            start_secs,
            end_secs,
            byte_size: moof_size,
        });
        Ok(())
    }

    fn parse_traf(&mut self, payload: &[u8]) -> Result<(f64, f64)> {
        let mut track_id = None;
        let mut default_duration = None;
        let mut base_decode_time = None;
        let mut total_duration: u64 = 0;

        for child in ByteCursor::new(payload).children() {
            let (atom_type, body) = child?;
            let mut c = ByteCursor::new(body);
            match atom_type {
                AtomType::TFHD => {
                    let (_, flags) = c.read_version_flags()?;
                    track_id = Some(c.read_u32()?);
                    if flags & TFHD_BASE_DATA_OFFSET != 0 {
                        c.skip(8)?;
                    }
                    if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
                        c.skip(4)?;
                    }
                    if flags & TFHD_DEFAULT_SAMPLE_DURATION != 0 {
                        default_duration = Some(c.read_u32()?);
                    }
                }
                AtomType::TFDT => {
                    let (version, _) = c.read_version_flags()?;
                    base_decode_time = Some(if version == 1 {
                        c.read_u64()?
                    } else {
                        c.read_u32()? as u64
                    });
                }
                AtomType::TRUN => {
                    let track = track_id
                        .and_then(|id| self.tracks.get(&id))
                        .ok_or(Error::MissingAtom("tfhd"))?;
                    let fallback = default_duration.unwrap_or(track.timing.default_sample_duration);
                    total_duration = checked_add(total_duration, trun_duration(&mut c, fallback)?)?;
                }
                _ => {}
            }
        }

        let track_id = track_id.ok_or(Error::MissingAtom("tfhd"))?;
        let track = self.tracks.get_mut(&track_id).ok_or_else(|| {
            Error::invalid_mp4(format!("fragment for unknown track {}", track_id))
        })?;

        let base = base_decode_time.unwrap_or(track.next_decode_time);
        let end = checked_add(base, total_duration)?;
        track.next_decode_time = end;

        let timescale = track.timing.timescale.max(1) as f64;
        Ok((base as f64 / timescale, end as f64 / timescale))
    }
}

fn checked_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| Error::invalid_mp4("decode time overflows 64 bits"))
}

fn parse_trak(payload: &[u8]) -> Result<TrackTiming> {
    let mut timing = TrackTiming {
        track_id: 0,
        handler: [0; 4],
        timescale: 0,
        default_sample_duration: 0,
    };

    for child in ByteCursor::new(payload).children() {
        let (atom_type, body) = child?;
        match atom_type {
            AtomType::TKHD => {
                let mut c = ByteCursor::new(body);
                let (version, _) = c.read_version_flags()?;
                c.skip(if version == 1 { 16 } else { 8 })?;
                timing.track_id = c.read_u32()?;
            }
            AtomType::MDIA => {
                for media_child in ByteCursor::new(body).children() {
                    let (media_type, media_body) = media_child?;
                    let mut c = ByteCursor::new(media_body);
                    match media_type {
                        AtomType::MDHD => {
                            let (version, _) = c.read_version_flags()?;
                            c.skip(if version == 1 { 16 } else { 8 })?;
                            timing.timescale = c.read_u32()?;
                        }
                        AtomType::HDLR => {
                            c.skip(8)?; // version/flags + pre_defined
                            let mut handler = [0u8; 4];
                            for byte in handler.iter_mut() {
                                *byte = c.read_u8()?;
                            }
                            timing.handler = handler;
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    if timing.track_id == 0 {
        return Err(Error::MissingAtom("tkhd"));
    }
    if timing.timescale == 0 {
        return Err(Error::MissingAtom("mdhd"));
    }
    Ok(timing)
}

fn trun_duration(c: &mut ByteCursor<'_>, default_duration: u32) -> Result<u64> {
    let (_, flags) = c.read_version_flags()?;
    let sample_count = c.read_u32()?;
    if flags & TRUN_DATA_OFFSET != 0 {
        c.skip(4)?;
    }
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        c.skip(4)?;
    }

    if flags & TRUN_SAMPLE_DURATION == 0 {
        return Ok(sample_count as u64 * default_duration as u64);
    }

    let mut total = 0u64;
    for _ in 0..sample_count {
        total = checked_add(total, c.read_u32()? as u64)?;
        for flag in [TRUN_SAMPLE_SIZE, TRUN_SAMPLE_FLAGS, TRUN_SAMPLE_CTS] {
            if flags & flag != 0 {
                c.skip(4)?;
            }
        }
    }
    Ok(total)
}
