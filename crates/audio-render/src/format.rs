//! Source format description and output channel/format vocabulary.

pub const MIME_AUDIO_RAW: &str = "audio/raw";
pub const MIME_AUDIO_MPEG: &str = "audio/mpeg";
pub const MIME_AUDIO_AAC: &str = "audio/mp4a-latm";
pub const MIME_AUDIO_VORBIS: &str = "audio/vorbis";
pub const MIME_AUDIO_FLAC: &str = "audio/flac";
pub const MIME_AUDIO_OPUS: &str = "audio/opus";

pub const CHANNEL_OUT_FRONT_LEFT: u32 = 0x1;
pub const CHANNEL_OUT_FRONT_RIGHT: u32 = 0x2;
pub const CHANNEL_OUT_FRONT_CENTER: u32 = 0x4;
pub const CHANNEL_OUT_LOW_FREQUENCY: u32 = 0x8;
pub const CHANNEL_OUT_BACK_LEFT: u32 = 0x10;
pub const CHANNEL_OUT_BACK_RIGHT: u32 = 0x20;
pub const CHANNEL_OUT_BACK_CENTER: u32 = 0x100;
pub const CHANNEL_OUT_SIDE_LEFT: u32 = 0x200;
pub const CHANNEL_OUT_SIDE_RIGHT: u32 = 0x400;

pub const CHANNEL_OUT_MONO: u32 = CHANNEL_OUT_FRONT_LEFT;
pub const CHANNEL_OUT_STEREO: u32 = CHANNEL_OUT_FRONT_LEFT | CHANNEL_OUT_FRONT_RIGHT;
pub const CHANNEL_OUT_QUAD: u32 = CHANNEL_OUT_STEREO | CHANNEL_OUT_BACK_LEFT | CHANNEL_OUT_BACK_RIGHT;
pub const CHANNEL_OUT_5POINT1: u32 =
    CHANNEL_OUT_QUAD | CHANNEL_OUT_FRONT_CENTER | CHANNEL_OUT_LOW_FREQUENCY;
pub const CHANNEL_OUT_7POINT1: u32 =
    CHANNEL_OUT_5POINT1 | CHANNEL_OUT_SIDE_LEFT | CHANNEL_OUT_SIDE_RIGHT;

/// Format reported by a [`MediaSource`](crate::source::MediaSource).
///
/// Keys are optional because sources only know some of them; negotiation at start decides
/// which ones are mandatory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaFormat {
    pub mime: String,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u32>,
    /// Explicit output channel mask. Absent means "use channel order".
    pub channel_mask: Option<u32>,
    /// Average bit rate, used by offload outputs.
    pub bit_rate: Option<u32>,
    pub duration_us: Option<i64>,
}

impl MediaFormat {
    /// Raw 16-bit PCM at `sample_rate` with `channels` interleaved channels.
    pub fn raw_pcm(sample_rate: u32, channels: u32) -> Self {
        Self {
            mime: MIME_AUDIO_RAW.to_string(),
            sample_rate: Some(sample_rate),
            channel_count: Some(channels),
            ..Self::default()
        }
    }

    pub fn is_raw(&self) -> bool {
        self.mime.eq_ignore_ascii_case(MIME_AUDIO_RAW)
    }
}

/// Sample encoding handed to the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioFormat {
    Pcm16Bit,
    Mp3,
    Aac,
    Vorbis,
    Flac,
    Opus,
}

impl AudioFormat {
    /// Map a MIME type onto an output format (case-insensitive).
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.to_ascii_lowercase();
        let format = match mime.as_str() {
            MIME_AUDIO_RAW => Self::Pcm16Bit,
            MIME_AUDIO_MPEG => Self::Mp3,
            MIME_AUDIO_AAC => Self::Aac,
            MIME_AUDIO_VORBIS => Self::Vorbis,
            MIME_AUDIO_FLAC => Self::Flac,
            MIME_AUDIO_OPUS => Self::Opus,
            _ => return None,
        };
        Some(format)
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, Self::Pcm16Bit)
    }
}

/// Channel layout requested from the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMask {
    /// No explicit layout; the output picks the canonical mask for the channel count.
    UseChannelOrder,
    Mask(u32),
}

impl ChannelMask {
    /// Resolve to a concrete mask. Returns 0 when no canonical mask exists.
    pub fn resolve(self, channels: u32) -> u32 {
        match self {
            Self::UseChannelOrder => channel_out_mask_from_count(channels),
            Self::Mask(mask) => mask,
        }
    }
}

/// Canonical output mask for a channel count, or 0 when there is none.
pub fn channel_out_mask_from_count(channels: u32) -> u32 {
    match channels {
        1 => CHANNEL_OUT_MONO,
        2 => CHANNEL_OUT_STEREO,
        3 => CHANNEL_OUT_STEREO | CHANNEL_OUT_FRONT_CENTER,
        4 => CHANNEL_OUT_QUAD,
        5 => CHANNEL_OUT_QUAD | CHANNEL_OUT_FRONT_CENTER,
        6 => CHANNEL_OUT_5POINT1,
        7 => CHANNEL_OUT_5POINT1 | CHANNEL_OUT_BACK_CENTER,
        8 => CHANNEL_OUT_7POINT1,
        _ => 0,
    }
}

/// Output path requested when opening a sink or building a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFlags {
    #[default]
    None,
    /// Larger buffers, higher latency, lower wakeup rate.
    DeepBuffer,
    /// Compressed data decoded by dedicated hardware.
    CompressOffload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_from_count_matches_canonical_layouts() {
        assert_eq!(channel_out_mask_from_count(1), 0x1);
        assert_eq!(channel_out_mask_from_count(2), 0x3);
        assert_eq!(channel_out_mask_from_count(4), 0x33);
        assert_eq!(channel_out_mask_from_count(6), 0x3f);
        assert_eq!(channel_out_mask_from_count(8), 0x63f);
        assert_eq!(channel_out_mask_from_count(0), 0);
        assert_eq!(channel_out_mask_from_count(9), 0);
    }

    #[test]
    fn channel_mask_resolve_prefers_explicit_mask() {
        assert_eq!(ChannelMask::Mask(0x4).resolve(2), 0x4);
        assert_eq!(ChannelMask::UseChannelOrder.resolve(2), CHANNEL_OUT_STEREO);
        assert_eq!(ChannelMask::UseChannelOrder.resolve(12), 0);
    }

    #[test]
    fn audio_format_from_mime_is_case_insensitive() {
        assert_eq!(AudioFormat::from_mime("AUDIO/RAW"), Some(AudioFormat::Pcm16Bit));
        assert_eq!(AudioFormat::from_mime("audio/mpeg"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_mime("video/avc"), None);
        assert!(AudioFormat::Aac.is_compressed());
        assert!(!AudioFormat::Pcm16Bit.is_compressed());
    }

    #[test]
    fn raw_pcm_format_is_raw() {
        let format = MediaFormat::raw_pcm(48_000, 2);
        assert!(format.is_raw());
        assert_eq!(format.sample_rate, Some(48_000));
        assert_eq!(format.channel_mask, None);
    }
}
