//! MIME types for configuring a media sink.
//!
//! The endpoint copies the video bitstream and tags HEVC as `hvc1`; audio is
//! always transcoded to stereo AAC-LC. The codec strings below describe that
//! output closely enough for a sink to pick a decoder.

use sratim_common::VideoCodecFamily;

/// Container MIME type of the stream.
pub const CONTAINER: &str = "video/mp4";

/// H.264 High profile, level 4.0.
pub const H264_CODEC: &str = "avc1.640028";

/// HEVC Main profile, level 5.0, tagged `hvc1`.
pub const HEVC_CODEC: &str = "hvc1.1.6.L150.B0";

/// AAC-LC.
pub const AAC_CODEC: &str = "mp4a.40.2";

/// RFC 6381 codec list for a stream, or `None` when the family has no
/// playable representation.
pub fn codecs(family: VideoCodecFamily, has_audio: bool) -> Option<String> {
    let video = match family {
        VideoCodecFamily::H264 => H264_CODEC,
        VideoCodecFamily::Hevc => HEVC_CODEC,
        VideoCodecFamily::Other => return None,
    };
    Some(if has_audio {
        format!("{}, {}", video, AAC_CODEC)
    } else {
        video.to_string()
    })
}

/// Full MIME type including the `codecs` parameter.
pub fn mime_type(family: VideoCodecFamily, has_audio: bool) -> Option<String> {
    codecs(family, has_audio).map(|c| format!("{}; codecs=\"{}\"", CONTAINER, c))
}
