use crate::error::{RenderError, RenderResult};
use crate::format::{AudioFormat, ChannelMask, MediaFormat, OutputFlags};

/// Buffer count requested from sinks when opening them.
pub const DEFAULT_SINK_BUFFER_COUNT: u32 = 4;

/// Player construction options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerOptions {
    /// Ask the output for deep buffering (low power, high latency).
    pub allow_deep_buffering: bool,
    /// Hand compressed data in this format to an offload-capable output.
    pub offload: Option<AudioFormat>,
    /// Buffer count passed to sinks on open.
    pub buffer_count: u32,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            allow_deep_buffering: false,
            offload: None,
            buffer_count: DEFAULT_SINK_BUFFER_COUNT,
        }
    }
}

impl PlayerOptions {
    /// Options for compressed offload playback of `format`.
    pub fn offload(format: AudioFormat) -> Self {
        Self {
            offload: Some(format),
            ..Self::default()
        }
    }

    pub fn output_flags(&self) -> OutputFlags {
        if self.offload.is_some() {
            OutputFlags::CompressOffload
        } else if self.allow_deep_buffering {
            OutputFlags::DeepBuffer
        } else {
            OutputFlags::None
        }
    }
}

/// Output configuration negotiated from the source format at start.
///
/// Immutable for the lifetime of a started session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackConfig {
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_mask: ChannelMask,
    /// Bytes per sample frame, as reported by the opened output.
    pub frame_size: usize,
    pub format: AudioFormat,
    pub bit_rate: Option<u32>,
    pub output_flags: OutputFlags,
}

impl PlaybackConfig {
    /// Validate `format` against `options` and derive the output configuration.
    ///
    /// `frame_size` starts as the PCM16 frame size and is replaced by what the output reports
    /// once it is open.
    pub fn negotiate(format: &MediaFormat, options: &PlayerOptions) -> RenderResult<Self> {
        let unsupported = || RenderError::UnsupportedMime {
            mime: format.mime.clone(),
        };
        let audio_format = match options.offload {
            // Offload hands the encoded stream through, so it must be a known compressed type.
            Some(_) => AudioFormat::from_mime(&format.mime)
                .filter(|f| f.is_compressed())
                .ok_or_else(unsupported)?,
            None if format.is_raw() => AudioFormat::Pcm16Bit,
            None => return Err(unsupported()),
        };

        let sample_rate = format
            .sample_rate
            .ok_or(RenderError::MissingFormatKey { key: "sample-rate" })?;
        if sample_rate == 0 {
            return Err(RenderError::InvalidSampleRate);
        }
        let channels = format
            .channel_count
            .ok_or(RenderError::MissingFormatKey { key: "channel-count" })?;

        let channel_mask = match format.channel_mask {
            Some(mask) => ChannelMask::Mask(mask),
            None => {
                if channels > 2 {
                    tracing::info!(
                        channels,
                        "source format didn't specify channel mask, using channel order"
                    );
                }
                ChannelMask::UseChannelOrder
            }
        };

        Ok(Self {
            sample_rate,
            channels,
            channel_mask,
            frame_size: channels as usize * 2,
            format: audio_format,
            bit_rate: format.bit_rate,
            output_flags: options.output_flags(),
        })
    }

    pub fn is_offload(&self) -> bool {
        self.output_flags == OutputFlags::CompressOffload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_raw_pcm_defaults_to_channel_order() {
        let cfg = PlaybackConfig::negotiate(
            &MediaFormat::raw_pcm(44_100, 2),
            &PlayerOptions::default(),
        )
        .unwrap();
        assert_eq!(cfg.sample_rate, 44_100);
        assert_eq!(cfg.channels, 2);
        assert_eq!(cfg.channel_mask, ChannelMask::UseChannelOrder);
        assert_eq!(cfg.frame_size, 4);
        assert_eq!(cfg.format, AudioFormat::Pcm16Bit);
        assert_eq!(cfg.output_flags, OutputFlags::None);
    }

    #[test]
    fn negotiate_rejects_compressed_without_offload() {
        let format = MediaFormat {
            mime: "audio/mpeg".to_string(),
            ..MediaFormat::raw_pcm(44_100, 2)
        };
        let err = PlaybackConfig::negotiate(&format, &PlayerOptions::default()).unwrap_err();
        assert_eq!(
            err,
            RenderError::UnsupportedMime {
                mime: "audio/mpeg".to_string()
            }
        );
    }

    #[test]
    fn negotiate_accepts_compressed_with_offload() {
        let format = MediaFormat {
            mime: "audio/mpeg".to_string(),
            bit_rate: Some(128_000),
            ..MediaFormat::raw_pcm(44_100, 2)
        };
        let cfg = PlaybackConfig::negotiate(&format, &PlayerOptions::offload(AudioFormat::Mp3))
            .unwrap();
        assert!(cfg.is_offload());
        assert_eq!(cfg.format, AudioFormat::Mp3);
        assert_eq!(cfg.bit_rate, Some(128_000));
    }

    #[test]
    fn offload_rejects_non_audio_and_raw_mime() {
        let options = PlayerOptions::offload(AudioFormat::Aac);
        for mime in ["video/avc", "audio/raw"] {
            let format = MediaFormat {
                mime: mime.to_string(),
                ..MediaFormat::raw_pcm(44_100, 2)
            };
            assert_eq!(
                PlaybackConfig::negotiate(&format, &options).unwrap_err(),
                RenderError::UnsupportedMime {
                    mime: mime.to_string()
                }
            );
        }

        let format = MediaFormat {
            mime: "audio/mp4a-latm".to_string(),
            ..MediaFormat::raw_pcm(48_000, 2)
        };
        let cfg = PlaybackConfig::negotiate(&format, &options).unwrap();
        assert_eq!(cfg.format, AudioFormat::Aac);
    }

    #[test]
    fn negotiate_requires_rate_and_channels() {
        let mut format = MediaFormat::raw_pcm(44_100, 2);
        format.sample_rate = None;
        assert_eq!(
            PlaybackConfig::negotiate(&format, &PlayerOptions::default()).unwrap_err(),
            RenderError::MissingFormatKey { key: "sample-rate" }
        );

        let mut format = MediaFormat::raw_pcm(0, 2);
        assert_eq!(
            PlaybackConfig::negotiate(&format, &PlayerOptions::default()).unwrap_err(),
            RenderError::InvalidSampleRate
        );

        format.sample_rate = Some(48_000);
        format.channel_count = None;
        assert_eq!(
            PlaybackConfig::negotiate(&format, &PlayerOptions::default()).unwrap_err(),
            RenderError::MissingFormatKey { key: "channel-count" }
        );
    }

    #[test]
    fn deep_buffering_selects_deep_buffer_flag() {
        let options = PlayerOptions {
            allow_deep_buffering: true,
            ..PlayerOptions::default()
        };
        assert_eq!(options.output_flags(), OutputFlags::DeepBuffer);
        let options = PlayerOptions {
            allow_deep_buffering: true,
            offload: Some(AudioFormat::Aac),
            ..PlayerOptions::default()
        };
        assert_eq!(options.output_flags(), OutputFlags::CompressOffload);
    }
}
