//! Capability policy
//!
//! Stateless decisions consulted by the builder and the track lifecycle
//! manager: which channel a track is mixed into, whether the encoded stream
//! fans out, and which raw formats, depayloaders, decoders and encoders a
//! codec implies. Every decision is an exhaustive match over a closed enum.

use crate::config::{AudioMixing, PipelineConfig};
use crate::errors::{EgressError, Result};
use crate::pipeline::engine::Factory;
use crate::pipeline::types::{MimeType, ParticipantRole};

/// Logical channel a track is mixed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioChannel {
    Stereo,
    Left,
    Right,
}

/// Side taken by the first arrival under [`AudioMixing::DualChannelAlternate`].
pub const ALTERNATE_FIRST_CHANNEL: AudioChannel = AudioChannel::Right;

impl AudioChannel {
    /// Channel-mask bit of a mono side; stereo has none.
    pub fn mask(&self) -> Option<u32> {
        match self {
            AudioChannel::Stereo => None,
            AudioChannel::Left => Some(0x1),
            AudioChannel::Right => Some(0x2),
        }
    }

    pub fn opposite(&self) -> AudioChannel {
        match self {
            AudioChannel::Stereo => AudioChannel::Stereo,
            AudioChannel::Left => AudioChannel::Right,
            AudioChannel::Right => AudioChannel::Left,
        }
    }

    /// Channel part of a raw audio caps string.
    pub fn caps_fragment(&self) -> String {
        match self.mask() {
            None => "channels=2".to_string(),
            Some(mask) => format!("channels=1,channel-mask=(bitmask)0x{:x}", mask),
        }
    }
}

/// Pick the channel for a track.
///
/// `arrival` is the 1-based, session-scoped arrival ordinal of the track.
pub fn assign_channel(mixing: AudioMixing, role: ParticipantRole, arrival: u64) -> AudioChannel {
    match mixing {
        AudioMixing::Default => AudioChannel::Stereo,
        AudioMixing::DualChannelAgent => match role {
            ParticipantRole::Agent => AudioChannel::Left,
            ParticipantRole::Standard | ParticipantRole::Ingress | ParticipantRole::Sip => {
                AudioChannel::Right
            }
        },
        AudioMixing::DualChannelAlternate => {
            if arrival % 2 == 1 {
                ALTERNATE_FIRST_CHANNEL
            } else {
                ALTERNATE_FIRST_CHANNEL.opposite()
            }
        }
    }
}

/// Shape of the link between the encoder and the outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTopology {
    /// One consumer behind a buffered link.
    Single,
    /// A fan-out point duplicating the stream to every consumer.
    FanOut,
}

pub fn output_topology(encoded_outputs: usize) -> OutputTopology {
    if encoded_outputs > 1 {
        OutputTopology::FanOut
    } else {
        OutputTopology::Single
    }
}

/// Raw sample layout the capture/convert stage must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAudioFormat {
    pub format: &'static str,
    pub layout: &'static str,
    pub rate: u32,
}

impl RawAudioFormat {
    pub fn caps(&self, channel: AudioChannel) -> String {
        format!(
            "audio/x-raw,format={},layout={},rate={},{}",
            self.format,
            self.layout,
            self.rate,
            channel.caps_fragment()
        )
    }
}

pub fn raw_audio_format(conf: &PipelineConfig) -> Result<RawAudioFormat> {
    match conf.audio_out_codec {
        MimeType::Opus | MimeType::RawAudio => Ok(RawAudioFormat {
            format: "S16LE",
            layout: "interleaved",
            rate: 48000,
        }),
        MimeType::Aac => Ok(RawAudioFormat {
            format: "S16LE",
            layout: "interleaved",
            rate: conf.audio_frequency,
        }),
        MimeType::H264 | MimeType::Vp8 | MimeType::Vp9 | MimeType::RawVideo => {
            Err(EgressError::unsupported(conf.audio_out_codec))
        }
    }
}

pub fn raw_video_caps(conf: &PipelineConfig) -> Result<String> {
    match conf.video_out_codec {
        MimeType::H264 | MimeType::Vp8 | MimeType::RawVideo => Ok(format!(
            "video/x-raw,format=I420,width={},height={},framerate={}/1",
            conf.width, conf.height, conf.framerate
        )),
        MimeType::Vp9 | MimeType::Opus | MimeType::Aac | MimeType::RawAudio => {
            Err(EgressError::unsupported(conf.video_out_codec))
        }
    }
}

/// RTP encoding name for an inbound track.
pub fn rtp_encoding_name(mime: MimeType) -> Result<&'static str> {
    match mime {
        MimeType::Opus => Ok("OPUS"),
        MimeType::H264 => Ok("H264"),
        MimeType::Vp8 => Ok("VP8"),
        MimeType::Vp9 => Ok("VP9"),
        MimeType::Aac | MimeType::RawAudio | MimeType::RawVideo => {
            Err(EgressError::unsupported(mime))
        }
    }
}

/// Depayloader and decoder turning an inbound RTP track into raw media.
pub fn depay_and_decoder(mime: MimeType) -> Result<(Factory, Factory)> {
    match mime {
        MimeType::Opus => Ok((Factory::RtpOpusDepay, Factory::OpusDec)),
        MimeType::H264 => Ok((Factory::RtpH264Depay, Factory::AvDecH264)),
        MimeType::Vp8 => Ok((Factory::RtpVp8Depay, Factory::Vp8Dec)),
        MimeType::Vp9 => Ok((Factory::RtpVp9Depay, Factory::Vp9Dec)),
        MimeType::Aac | MimeType::RawAudio | MimeType::RawVideo => {
            Err(EgressError::unsupported(mime))
        }
    }
}

/// Audio encoder for the output codec; `None` when raw audio is requested.
pub fn audio_encoder(codec: MimeType) -> Result<Option<Factory>> {
    match codec {
        MimeType::Opus => Ok(Some(Factory::OpusEnc)),
        MimeType::Aac => Ok(Some(Factory::Faac)),
        MimeType::RawAudio => Ok(None),
        MimeType::H264 | MimeType::Vp8 | MimeType::Vp9 | MimeType::RawVideo => {
            Err(EgressError::unsupported(codec))
        }
    }
}

/// Video encoder for the output codec; `None` when raw video is requested.
pub fn video_encoder(codec: MimeType) -> Result<Option<Factory>> {
    match codec {
        MimeType::H264 => Ok(Some(Factory::X264Enc)),
        MimeType::Vp8 => Ok(Some(Factory::Vp8Enc)),
        MimeType::RawVideo => Ok(None),
        MimeType::Vp9 | MimeType::Opus | MimeType::Aac | MimeType::RawAudio => {
            Err(EgressError::unsupported(codec))
        }
    }
}
