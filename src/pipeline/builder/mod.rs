//! Pipeline graph builder
//!
//! Describes the bins of each media branch. A branch bin holds the mixer (or
//! the single capture chain for web sources), the encoder and the link towards
//! the outputs; SDK branches also hold one child bin per track plus a filler
//! source. The flow inside a branch:
//! ```text
//! track bins ─┐
//! filler ─────┴→ mixer → caps → encoder → queue | tee → output bins
//! ```

pub mod audio;
pub mod output;
pub mod video;

use std::time::Duration;

pub use audio::AudioBranch;
pub use output::build_output_bins;
pub use video::VideoBranch;

use crate::config::PipelineConfig;
use crate::errors::{EgressError, Result};
use crate::pipeline::engine::{Bin, Engine, Factory, PropValue, make_stage_with};
use crate::pipeline::policy::{
    OutputTopology, depay_and_decoder, output_topology, rtp_encoding_name,
};
use crate::pipeline::registry::Reservation;
use crate::pipeline::types::{MediaKind, TrackSource};

/// Closed set of branches the graph can carry.
pub enum Branch {
    Audio(AudioBranch),
    Video(VideoBranch),
}

impl Branch {
    pub fn kind(&self) -> MediaKind {
        match self {
            Branch::Audio(_) => MediaKind::Audio,
            Branch::Video(_) => MediaKind::Video,
        }
    }

    /// Fail early on output formats the branch cannot produce.
    pub fn check_formats(&self) -> Result<()> {
        match self {
            Branch::Audio(b) => b.check_formats(),
            Branch::Video(b) => b.check_formats(),
        }
    }

    /// Stages of a web capture branch, up to and including the encoder.
    pub fn build_web_input(&self, engine: &dyn Engine, bin: &mut Bin) -> Result<()> {
        match self {
            Branch::Audio(b) => b.build_web_input(engine, bin),
            Branch::Video(b) => b.build_web_input(engine, bin),
        }
    }

    /// Whether an inbound track can be depacketized and decoded by this branch.
    pub fn check_track(&self, ts: &TrackSource) -> Result<()> {
        if ts.mime_type.kind() != self.kind() {
            return Err(EgressError::unsupported(ts.mime_type));
        }
        rtp_encoding_name(ts.mime_type)?;
        depay_and_decoder(ts.mime_type)?;
        Ok(())
    }

    /// Depacketize → decode → normalize chain for one inbound track.
    pub fn build_track_bin(
        &self,
        engine: &dyn Engine,
        ts: &TrackSource,
        reservation: &Reservation,
    ) -> Result<Bin> {
        match self {
            Branch::Audio(b) => b.build_track_bin(engine, ts, reservation),
            Branch::Video(b) => b.build_track_bin(engine, ts, reservation),
        }
    }

    /// Always-present source keeping the mixer fed.
    pub fn build_filler(&self, engine: &dyn Engine) -> Result<Bin> {
        match self {
            Branch::Audio(b) => b.build_filler(engine),
            Branch::Video(b) => b.build_filler(engine),
        }
    }

    /// Mixer and encoder stages of an SDK branch.
    pub fn build_mixer(&self, engine: &dyn Engine, bin: &mut Bin) -> Result<()> {
        match self {
            Branch::Audio(b) => b.build_mixer(engine, bin),
            Branch::Video(b) => b.build_mixer(engine, bin),
        }
    }
}

/// Nanoseconds for engine time properties, saturating at `u64::MAX`.
pub fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Leaky-or-blocking queue bounded by time only.
pub fn build_queue(
    engine: &dyn Engine,
    name: &str,
    latency: Duration,
    leaky: bool,
) -> Result<crate::pipeline::engine::Stage> {
    let mut props: Vec<(&'static str, PropValue)> = vec![
        ("max-size-time", PropValue::UInt(duration_nanos(latency))),
        ("max-size-bytes", PropValue::UInt(0)),
        ("max-size-buffers", PropValue::UInt(0)),
    ];
    if leaky {
        // 2 = drop oldest
        props.push(("leaky", PropValue::UInt(2)));
    }
    make_stage_with(engine, Factory::Queue, name, props)
}

pub fn build_caps_filter(
    engine: &dyn Engine,
    name: &str,
    caps: String,
) -> Result<crate::pipeline::engine::Stage> {
    make_stage_with(engine, Factory::CapsFilter, name, [("caps", PropValue::Caps(caps))])
}

/// Terminate a branch with a single buffered link or a fan-out point.
pub fn add_output_link(
    engine: &dyn Engine,
    bin: &mut Bin,
    kind: MediaKind,
    conf: &PipelineConfig,
) -> Result<OutputTopology> {
    let topology = output_topology(conf.encoded_output_count());
    let stage = match topology {
        OutputTopology::FanOut => {
            engine.make_stage(Factory::Tee, &format!("{}_tee", kind.as_str()))?
        }
        OutputTopology::Single => build_queue(
            engine,
            &format!("{}_queue", kind.as_str()),
            conf.latency.pipeline_latency(),
            true,
        )?,
    };
    bin.add_stage(stage)?;
    Ok(topology)
}
