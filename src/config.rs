use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{EgressError, Result};
use crate::pipeline::types::{MimeType, TrackSource};

pub const DEFAULT_SEGMENT_DURATION: u32 = 4;

/// Where the session's media comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Single capture of a rendered page (system audio + screen).
    #[default]
    Web,
    /// One inbound track per published participant track.
    Sdk,
}

/// How audio tracks are laid out in the mixed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMixing {
    /// Everything mixed into the same stereo channel.
    #[default]
    Default,
    /// Agents on the left, everybody else on the right.
    DualChannelAgent,
    /// Tracks alternate between right and left in arrival order.
    DualChannelAlternate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentProtocol {
    #[default]
    Hls,
}

/// Raw segmented output request, as submitted by the user.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentOutputRequest {
    pub filename_prefix: String,
    pub playlist_name: String,
    pub live_playlist_name: String,
    /// Seconds; 0 selects [`DEFAULT_SEGMENT_DURATION`].
    pub segment_duration: u32,
    pub protocol: SegmentProtocol,
    pub disable_manifest: bool,
}

impl SegmentOutputRequest {
    pub fn segment_duration(&self) -> u32 {
        if self.segment_duration == 0 {
            DEFAULT_SEGMENT_DURATION
        } else {
            self.segment_duration
        }
    }
}

/// One requested encoded output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputConfig {
    File { filepath: String },
    Stream { urls: Vec<String> },
    Segments(SegmentOutputRequest),
    Websocket { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub pipeline_latency_ms: u64,
    pub audio_mixer_latency_ms: u64,
}

impl LatencyConfig {
    pub fn pipeline_latency(&self) -> Duration {
        Duration::from_millis(self.pipeline_latency_ms)
    }

    pub fn audio_mixer_latency(&self) -> Duration {
        Duration::from_millis(self.audio_mixer_latency_ms)
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            pipeline_latency_ms: 3000,
            audio_mixer_latency_ms: 2750,
        }
    }
}

/// Immutable per-session pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub egress_id: String,
    pub room_name: String,
    pub room_id: String,
    pub source_type: SourceType,

    /// Tracks already published when the graph is built. Handed over by the
    /// session layer, never part of the request document.
    #[serde(skip)]
    pub audio_tracks: Vec<TrackSource>,
    #[serde(skip)]
    pub video_tracks: Vec<TrackSource>,

    pub audio_enabled: bool,
    pub audio_mixing: AudioMixing,
    pub audio_transcoding: bool,
    pub audio_out_codec: MimeType,
    /// kbps
    pub audio_bitrate: u32,
    /// Hz
    pub audio_frequency: u32,

    pub video_enabled: bool,
    pub video_transcoding: bool,
    pub video_out_codec: MimeType,
    /// kbps
    pub video_bitrate: u32,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// X display the Web source captures from.
    pub display: String,

    pub latency: LatencyConfig,
    pub outputs: Vec<OutputConfig>,
    /// Session-scoped local working root.
    pub tmp_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            egress_id: String::new(),
            room_name: String::new(),
            room_id: String::new(),
            source_type: SourceType::Web,
            audio_tracks: Vec::new(),
            video_tracks: Vec::new(),
            audio_enabled: true,
            audio_mixing: AudioMixing::Default,
            audio_transcoding: true,
            audio_out_codec: MimeType::Opus,
            audio_bitrate: 128,
            audio_frequency: 48000,
            video_enabled: false,
            video_transcoding: true,
            video_out_codec: MimeType::H264,
            video_bitrate: 4500,
            width: 1920,
            height: 1080,
            framerate: 30,
            display: ":99".to_string(),
            latency: LatencyConfig::default(),
            outputs: Vec::new(),
            tmp_dir: std::env::temp_dir(),
        }
    }
}

impl PipelineConfig {
    /// Load a request document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let conf: PipelineConfig = serde_json::from_str(raw)?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn validate(&self) -> Result<()> {
        if self.outputs.is_empty() {
            return Err(EgressError::invalid_input("no outputs requested"));
        }
        if !self.audio_enabled && !self.video_enabled {
            return Err(EgressError::invalid_input(
                "at least one of audio or video must be enabled",
            ));
        }
        if self.segment_outputs().count() > 1 {
            return Err(EgressError::invalid_input(
                "only one segmented output is supported",
            ));
        }
        Ok(())
    }

    /// Number of consumers the encoded stream feeds.
    pub fn encoded_output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn segment_request(&self) -> Option<&SegmentOutputRequest> {
        self.segment_outputs().next()
    }

    fn segment_outputs(&self) -> impl Iterator<Item = &SegmentOutputRequest> {
        self.outputs.iter().filter_map(|o| match o {
            OutputConfig::Segments(s) => Some(s),
            _ => None,
        })
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
