//! Core types for the pipeline system

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::pipeline::engine::{Engine, Factory, Stage};

/// Kind of media data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Video frame data
    Video,
    /// Audio sample data
    Audio,
}

impl MediaKind {
    /// Name prefix used for the branch bin and its fan-out/queue stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// Wire and output formats the graph knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MimeType {
    #[serde(rename = "audio/opus")]
    Opus,
    #[serde(rename = "audio/aac")]
    Aac,
    #[serde(rename = "audio/x-raw")]
    RawAudio,
    #[serde(rename = "video/h264")]
    H264,
    #[serde(rename = "video/vp8")]
    Vp8,
    #[serde(rename = "video/vp9")]
    Vp9,
    #[serde(rename = "video/x-raw")]
    RawVideo,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Opus => "audio/opus",
            MimeType::Aac => "audio/aac",
            MimeType::RawAudio => "audio/x-raw",
            MimeType::H264 => "video/h264",
            MimeType::Vp8 => "video/vp8",
            MimeType::Vp9 => "video/vp9",
            MimeType::RawVideo => "video/x-raw",
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            MimeType::Opus | MimeType::Aac | MimeType::RawAudio => MediaKind::Audio,
            MimeType::H264 | MimeType::Vp8 | MimeType::Vp9 | MimeType::RawVideo => MediaKind::Video,
        }
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of the participant publishing a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    #[default]
    Standard,
    Ingress,
    Sip,
    /// Automated agent; gets its own side in dual-channel recordings.
    Agent,
}

/// Injection point the session layer pushes RTP packets into.
///
/// The session creates it through the engine and hands it over with the
/// [`TrackSource`]; the track bin embeds it as its first stage.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSrc {
    stage: Stage,
}

impl AppSrc {
    pub fn new(engine: &dyn Engine, name: &str) -> Result<Self> {
        Ok(Self {
            stage: engine.make_stage(Factory::AppSrc, name)?,
        })
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }
}

/// One inbound media track.
#[derive(Debug, Clone)]
pub struct TrackSource {
    /// External identifier, unique per session.
    pub track_id: String,
    pub kind: MediaKind,
    pub mime_type: MimeType,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub participant_role: ParticipantRole,
    pub app_src: AppSrc,
}

impl TrackSource {
    /// Audio track with the usual Opus RTP parameters.
    pub fn opus(engine: &dyn Engine, track_id: &str, role: ParticipantRole) -> Result<Self> {
        Ok(Self {
            track_id: track_id.to_string(),
            kind: MediaKind::Audio,
            mime_type: MimeType::Opus,
            payload_type: 111,
            clock_rate: 48000,
            participant_role: role,
            app_src: AppSrc::new(engine, &format!("app_{}", track_id))?,
        })
    }

    /// Video track with the given codec and a 90 kHz RTP clock.
    pub fn video(engine: &dyn Engine, track_id: &str, mime_type: MimeType) -> Result<Self> {
        let payload_type = match mime_type {
            MimeType::Vp8 => 96,
            MimeType::Vp9 => 98,
            _ => 102,
        };
        Ok(Self {
            track_id: track_id.to_string(),
            kind: MediaKind::Video,
            mime_type,
            payload_type,
            clock_rate: 90000,
            participant_role: ParticipantRole::Standard,
            app_src: AppSrc::new(engine, &format!("app_{}", track_id))?,
        })
    }
}
