//! Init segment and fragment writers.
//!
//! These produce the timing skeleton of a fragmented MP4 stream: enough
//! structure (`mvhd`, `tkhd`, `mdhd`, `hdlr`, `trex`, `mfhd`, `tfhd`, `tfdt`,
//! `trun`, `mdat`) for a demuxer to place fragments on the timeline. Sample
//! payloads are zero-filled.

use bytes::{BufMut, Bytes, BytesMut};

/// Write a box header with a placeholder size and return its offset.
fn begin_box(buf: &mut BytesMut, fourcc: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(fourcc);
    start
}

/// Patch the size of the box started at `start`.
fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        buf.put_u32(value);
    }
}

#[derive(Debug, Clone)]
struct TrackSpec {
    track_id: u32,
    handler: [u8; 4],
    timescale: u32,
    default_sample_duration: u32,
}

/// Builder for `ftyp` + `moov` init segments.
#[derive(Debug, Clone, Default)]
pub struct InitSegmentBuilder {
    tracks: Vec<TrackSpec>,
    duration: u64,
}

impl InitSegmentBuilder {
    /// Create a new builder with no tracks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a video track.
    pub fn video(self, timescale: u32, default_sample_duration: u32) -> Self {
        self.track(*b"vide", timescale, default_sample_duration)
    }

    /// Add an audio track.
    pub fn audio(self, timescale: u32, default_sample_duration: u32) -> Self {
        self.track(*b"soun", timescale, default_sample_duration)
    }

    /// Set the movie duration, in the first track's timescale.
    pub fn duration(mut self, duration: u64) -> Self {
        self.duration = duration;
        self
    }

    fn track(mut self, handler: [u8; 4], timescale: u32, default_sample_duration: u32) -> Self {
        let track_id = self.tracks.len() as u32 + 1;
        self.tracks.push(TrackSpec {
            track_id,
            handler,
            timescale,
            default_sample_duration,
        });
        self
    }

    /// Build the init segment.
    pub fn build(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(512 + self.tracks.len() * 256);

        // ftyp: isom, iso5, dash, mp42
        let ftyp = begin_box(&mut buf, b"ftyp");
        buf.put_slice(b"isom");
        buf.put_u32(0x200);
        for brand in [b"isom", b"iso5", b"dash", b"mp42"] {
            buf.put_slice(brand);
        }
        end_box(&mut buf, ftyp);

        let moov = begin_box(&mut buf, b"moov");
        self.write_mvhd(&mut buf);
        for track in &self.tracks {
            self.write_trak(&mut buf, track);
        }
        let mvex = begin_box(&mut buf, b"mvex");
        for track in &self.tracks {
            let trex = begin_box(&mut buf, b"trex");
            buf.put_u32(0); // version/flags
            buf.put_u32(track.track_id);
            buf.put_u32(1); // default sample description index
            buf.put_u32(track.default_sample_duration);
            buf.put_u32(0); // default sample size
            buf.put_u32(0); // default sample flags
            end_box(&mut buf, trex);
        }
        end_box(&mut buf, mvex);
        end_box(&mut buf, moov);

        buf.freeze()
    }

    fn movie_timescale(&self) -> u32 {
        self.tracks.first().map(|t| t.timescale).unwrap_or(1000)
    }

    fn write_mvhd(&self, buf: &mut BytesMut) {
        let mvhd = begin_box(buf, b"mvhd");
        buf.put_u32(0x01000000); // version 1
        buf.put_u64(0); // creation time
        buf.put_u64(0); // modification time
        buf.put_u32(self.movie_timescale());
        buf.put_u64(self.duration);
        buf.put_u32(0x00010000); // rate = 1.0
        buf.put_u16(0x0100); // volume = 1.0
        buf.put_u16(0);
        buf.put_u64(0);
        put_identity_matrix(buf);
        for _ in 0..6 {
            buf.put_u32(0); // pre_defined
        }
        buf.put_u32(self.tracks.len() as u32 + 1); // next track ID
        end_box(buf, mvhd);
    }

    fn write_trak(&self, buf: &mut BytesMut, track: &TrackSpec) {
        let is_video = &track.handler == b"vide";
        let trak = begin_box(buf, b"trak");

        let tkhd = begin_box(buf, b"tkhd");
        buf.put_u32(0x01000007); // version 1, enabled | in_movie | in_preview
        buf.put_u64(0);
        buf.put_u64(0);
        buf.put_u32(track.track_id);
        buf.put_u32(0);
        buf.put_u64(self.duration);
        buf.put_u64(0);
        buf.put_u16(0); // layer
        buf.put_u16(0); // alternate group
        buf.put_u16(if is_video { 0 } else { 0x0100 });
        buf.put_u16(0);
        put_identity_matrix(buf);
        if is_video {
            buf.put_u32(1920 << 16);
            buf.put_u32(1080 << 16);
        } else {
            buf.put_u32(0);
            buf.put_u32(0);
        }
        end_box(buf, tkhd);

        let mdia = begin_box(buf, b"mdia");
        let mdhd = begin_box(buf, b"mdhd");
        buf.put_u32(0x01000000); // version 1
        buf.put_u64(0);
        buf.put_u64(0);
        buf.put_u32(track.timescale);
        buf.put_u64(0);
        buf.put_u16(0x55C4); // language: und
        buf.put_u16(0);
        end_box(buf, mdhd);

        let name: &[u8] = if is_video { b"VideoHandler" } else { b"SoundHandler" };
        let hdlr = begin_box(buf, b"hdlr");
        buf.put_u32(0); // version/flags
        buf.put_u32(0); // pre_defined
        buf.put_slice(&track.handler);
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_slice(name);
        buf.put_u8(0);
        end_box(buf, hdlr);
        end_box(buf, mdia);

        end_box(buf, trak);
    }
}

/// Duration and size of one sample in a track run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub duration: u32,
    pub size: u32,
    pub keyframe: bool,
}

impl SampleSpec {
    /// `count` equal samples, the first one a keyframe.
    pub fn uniform(count: usize, duration: u32, size: u32) -> Vec<SampleSpec> {
        (0..count)
            .map(|i| SampleSpec {
                duration,
                size,
                keyframe: i == 0,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct TrackRun {
    track_id: u32,
    base_media_decode_time: u64,
    samples: Vec<SampleSpec>,
}

impl TrackRun {
    fn data_size(&self) -> u64 {
        self.samples.iter().map(|s| s.size as u64).sum()
    }
}

/// Builder for one `moof` + `mdat` fragment.
#[derive(Debug, Clone)]
pub struct FragmentBuilder {
    sequence_number: u32,
    runs: Vec<TrackRun>,
    write_decode_time: bool,
}

impl FragmentBuilder {
    /// Create a new fragment builder.
    pub fn new(sequence_number: u32) -> Self {
        Self {
            sequence_number,
            runs: Vec::new(),
            write_decode_time: true,
        }
    }

    /// Add a track fragment.
    pub fn track(mut self, track_id: u32, base_media_decode_time: u64, samples: Vec<SampleSpec>) -> Self {
        self.runs.push(TrackRun {
            track_id,
            base_media_decode_time,
            samples,
        });
        self
    }

    /// Omit `tfdt`, leaving decode time implied by the previous fragment.
    pub fn without_decode_time(mut self) -> Self {
        self.write_decode_time = false;
        self
    }

    /// Build the `moof` followed by a zero-filled `mdat`.
    pub fn build(self) -> Bytes {
        let sample_count: usize = self.runs.iter().map(|r| r.samples.len()).sum();
        let data_size: u64 = self.runs.iter().map(TrackRun::data_size).sum();
        let mut buf = BytesMut::with_capacity(256 + sample_count * 12 + data_size as usize);

        let moof = begin_box(&mut buf, b"moof");

        let mfhd = begin_box(&mut buf, b"mfhd");
        buf.put_u32(0);
        buf.put_u32(self.sequence_number);
        end_box(&mut buf, mfhd);

        let mut data_offset_slots = Vec::with_capacity(self.runs.len());
        for run in &self.runs {
            let traf = begin_box(&mut buf, b"traf");

            let tfhd = begin_box(&mut buf, b"tfhd");
            buf.put_u32(0x020000); // default-base-is-moof
            buf.put_u32(run.track_id);
            end_box(&mut buf, tfhd);

            if self.write_decode_time {
                let tfdt = begin_box(&mut buf, b"tfdt");
                buf.put_u32(0x01000000); // version 1
                buf.put_u64(run.base_media_decode_time);
                end_box(&mut buf, tfdt);
            }

            // data offset | sample duration | sample size | sample flags
            let trun = begin_box(&mut buf, b"trun");
            buf.put_u32(0x000001 | 0x000100 | 0x000200 | 0x000400);
            buf.put_u32(run.samples.len() as u32);
            data_offset_slots.push(buf.len());
            buf.put_u32(0);
            for sample in &run.samples {
                buf.put_u32(sample.duration);
                buf.put_u32(sample.size);
                buf.put_u32(if sample.keyframe { 0x02000000 } else { 0x01010000 });
            }
            end_box(&mut buf, trun);

            end_box(&mut buf, traf);
        }
        end_box(&mut buf, moof);

        let mdat_header_size = if data_size + 8 > u32::MAX as u64 { 16 } else { 8 };
        let mut offset = (buf.len() - moof) as u64 + mdat_header_size;
        for (slot, run) in data_offset_slots.into_iter().zip(&self.runs) {
            buf[slot..slot + 4].copy_from_slice(&(offset as u32).to_be_bytes());
            offset += run.data_size();
        }

        if mdat_header_size == 16 {
            buf.put_u32(1);
            buf.put_slice(b"mdat");
            buf.put_u64(data_size + 16);
        } else {
            buf.put_u32((data_size + 8) as u32);
            buf.put_slice(b"mdat");
        }
        buf.put_bytes(0, data_size as usize);

        buf.freeze()
    }
}
