//! Processing engine interface
//!
//! The graph is realized by an external media engine. The builder and the
//! track lifecycle manager only describe stages and bins and hand them to an
//! [`Engine`], whose calls are synchronous and fallible. Engines are created
//! once per process and passed around as `Arc<dyn Engine>`.

use std::collections::BTreeMap;

use crate::errors::{EgressError, Result};

/// Name of the top-level container every branch bin is attached to.
pub const ROOT_BIN: &str = "pipeline";

/// Stage kinds the builder knows how to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Factory {
    AppSrc,
    PulseSrc,
    XImageSrc,
    AudioTestSrc,
    VideoTestSrc,
    Queue,
    AudioConvert,
    AudioResample,
    VideoConvert,
    VideoScale,
    VideoRate,
    CapsFilter,
    AudioMixer,
    Compositor,
    RtpOpusDepay,
    RtpH264Depay,
    RtpVp8Depay,
    RtpVp9Depay,
    OpusDec,
    AvDecH264,
    Vp8Dec,
    Vp9Dec,
    OpusEnc,
    Faac,
    X264Enc,
    Vp8Enc,
    Tee,
    Mp4Mux,
    FlvMux,
    FileSink,
    RtmpSink,
    HlsSink,
    AppSink,
}

impl Factory {
    /// Engine-side factory name.
    pub fn name(&self) -> &'static str {
        match self {
            Factory::AppSrc => "appsrc",
            Factory::PulseSrc => "pulsesrc",
            Factory::XImageSrc => "ximagesrc",
            Factory::AudioTestSrc => "audiotestsrc",
            Factory::VideoTestSrc => "videotestsrc",
            Factory::Queue => "queue",
            Factory::AudioConvert => "audioconvert",
            Factory::AudioResample => "audioresample",
            Factory::VideoConvert => "videoconvert",
            Factory::VideoScale => "videoscale",
            Factory::VideoRate => "videorate",
            Factory::CapsFilter => "capsfilter",
            Factory::AudioMixer => "audiomixer",
            Factory::Compositor => "compositor",
            Factory::RtpOpusDepay => "rtpopusdepay",
            Factory::RtpH264Depay => "rtph264depay",
            Factory::RtpVp8Depay => "rtpvp8depay",
            Factory::RtpVp9Depay => "rtpvp9depay",
            Factory::OpusDec => "opusdec",
            Factory::AvDecH264 => "avdec_h264",
            Factory::Vp8Dec => "vp8dec",
            Factory::Vp9Dec => "vp9dec",
            Factory::OpusEnc => "opusenc",
            Factory::Faac => "faac",
            Factory::X264Enc => "x264enc",
            Factory::Vp8Enc => "vp8enc",
            Factory::Tee => "tee",
            Factory::Mp4Mux => "mp4mux",
            Factory::FlvMux => "flvmux",
            Factory::FileSink => "filesink",
            Factory::RtmpSink => "rtmp2sink",
            Factory::HlsSink => "hlssink2",
            Factory::AppSink => "appsink",
        }
    }

    /// Properties a stage of this kind accepts.
    pub fn properties(&self) -> &'static [&'static str] {
        match self {
            Factory::AppSrc => &["caps", "format", "is-live", "do-timestamp"],
            Factory::PulseSrc => &["device", "do-timestamp"],
            Factory::XImageSrc => &["display-name", "use-damage", "show-pointer"],
            Factory::AudioTestSrc => &["volume", "do-timestamp", "is-live", "wave"],
            Factory::VideoTestSrc => &["pattern", "is-live", "do-timestamp"],
            Factory::Queue => &[
                "max-size-time",
                "max-size-bytes",
                "max-size-buffers",
                "leaky",
            ],
            Factory::CapsFilter => &["caps"],
            Factory::AudioMixer => &["latency", "alignment-threshold"],
            Factory::Compositor => &["background", "latency"],
            Factory::OpusEnc => &["bitrate"],
            Factory::Faac => &["bitrate"],
            Factory::X264Enc => &["bitrate", "speed-preset", "tune", "key-int-max"],
            Factory::Vp8Enc => &["target-bitrate", "deadline", "keyframe-max-dist"],
            Factory::Mp4Mux => &["faststart"],
            Factory::FlvMux => &["streamable"],
            Factory::FileSink => &["location", "sync"],
            Factory::RtmpSink => &["location", "async-connect"],
            Factory::HlsSink => &[
                "location",
                "playlist-location",
                "target-duration",
                "playlist-length",
                "max-files",
            ],
            Factory::AppSink => &["emit-signals", "sync"],
            Factory::AudioConvert
            | Factory::AudioResample
            | Factory::VideoConvert
            | Factory::VideoScale
            | Factory::VideoRate
            | Factory::RtpOpusDepay
            | Factory::RtpH264Depay
            | Factory::RtpVp8Depay
            | Factory::RtpVp9Depay
            | Factory::OpusDec
            | Factory::AvDecH264
            | Factory::Vp8Dec
            | Factory::Vp9Dec
            | Factory::Tee => &[],
        }
    }
}

impl std::fmt::Display for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed stage property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Str(String),
    Caps(String),
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}

impl From<u64> for PropValue {
    fn from(v: u64) -> Self {
        PropValue::UInt(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Double(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

impl std::fmt::Display for PropValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropValue::Bool(v) => write!(f, "{}", v),
            PropValue::Int(v) => write!(f, "{}", v),
            PropValue::UInt(v) => write!(f, "{}", v),
            PropValue::Double(v) => write!(f, "{}", v),
            PropValue::Str(v) => write!(f, "\"{}\"", v),
            PropValue::Caps(v) => write!(f, "{}", v),
        }
    }
}

/// One processing step inside a bin.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    name: String,
    factory: Factory,
    properties: BTreeMap<String, PropValue>,
}

impl Stage {
    /// For [`Engine`] implementations; builders go through [`Engine::make_stage`].
    pub fn new(factory: Factory, name: &str) -> Self {
        Self {
            name: name.to_string(),
            factory,
            properties: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory(&self) -> Factory {
        self.factory
    }

    pub fn property(&self, key: &str) -> Option<&PropValue> {
        self.properties.get(key)
    }

    /// Store a property without validation. Engines call this from
    /// [`Engine::set_property`] once the key is accepted.
    pub fn insert_property(&mut self, key: &str, value: PropValue) {
        self.properties.insert(key.to_string(), value);
    }
}

/// A named, independently attachable group of stages ("bin").
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    name: String,
    stages: Vec<Stage>,
    bins: Vec<Bin>,
    eos_forwarding: bool,
}

impl Bin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            bins: Vec::new(),
            eos_forwarding: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Whether end-of-stream from this bin propagates to its parent.
    pub fn eos_forwarding(&self) -> bool {
        self.eos_forwarding
    }

    pub fn set_eos_forwarding(&mut self, forward: bool) {
        self.eos_forwarding = forward;
    }

    /// Append a stage to the chain. Stage names are unique within a bin.
    pub fn add_stage(&mut self, stage: Stage) -> Result<()> {
        if self.stages.iter().any(|s| s.name == stage.name) {
            return Err(EgressError::engine(format!(
                "bin {} already has a stage named {}",
                self.name, stage.name
            )));
        }
        self.stages.push(stage);
        Ok(())
    }

    pub fn add_stages(&mut self, stages: impl IntoIterator<Item = Stage>) -> Result<()> {
        for stage in stages {
            self.add_stage(stage)?;
        }
        Ok(())
    }

    pub fn add_bin(&mut self, bin: Bin) {
        self.bins.push(bin);
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Depth-first search for a bin by name, including `self`.
    pub fn find(&self, name: &str) -> Option<&Bin> {
        if self.name == name {
            return Some(self);
        }
        self.bins.iter().find_map(|b| b.find(name))
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Bin> {
        if self.name == name {
            return Some(self);
        }
        self.bins.iter_mut().find_map(|b| b.find_mut(name))
    }

    /// Remove a direct child bin.
    pub fn remove_bin(&mut self, name: &str) -> Option<Bin> {
        let idx = self.bins.iter().position(|b| b.name == name)?;
        Some(self.bins.remove(idx))
    }

    /// Names of this bin and every nested bin.
    pub fn bin_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for bin in &self.bins {
            names.extend(bin.bin_names());
        }
        names
    }
}

/// Synchronous, fallible calls into the processing engine.
pub trait Engine: Send + Sync {
    /// Construct a stage from a factory.
    fn make_stage(&self, factory: Factory, name: &str) -> Result<Stage>;

    /// Set a parameter on a stage that has not been attached yet.
    fn set_property(&self, stage: &mut Stage, key: &str, value: PropValue) -> Result<()>;

    /// Read a parameter from a stage of a live bin.
    fn property(&self, bin: &str, stage: &str, key: &str) -> Result<PropValue>;

    /// Attach `bin` under the live bin named `parent`.
    ///
    /// Must not disturb branches that are already flowing.
    fn attach_bin(&self, parent: &str, bin: Bin) -> Result<()>;

    /// Detach and release the child `name` of the live bin `parent`.
    fn detach_bin(&self, parent: &str, name: &str) -> Result<()>;
}

/// Construct a stage and apply `props` in order.
pub fn make_stage_with(
    engine: &dyn Engine,
    factory: Factory,
    name: &str,
    props: impl IntoIterator<Item = (&'static str, PropValue)>,
) -> Result<Stage> {
    let mut stage = engine.make_stage(factory, name)?;
    for (key, value) in props {
        engine.set_property(&mut stage, key, value)?;
    }
    Ok(stage)
}
