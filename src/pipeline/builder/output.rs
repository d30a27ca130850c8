//! One sink bin per requested output, fed by the branch queue or tee.

use crate::config::{OutputConfig, PipelineConfig};
use crate::errors::{EgressError, Result};
use crate::output::naming::NamingPlan;
use crate::pipeline::engine::{Bin, Engine, Factory, PropValue, make_stage_with};

fn output_type(output: &OutputConfig) -> &'static str {
    match output {
        OutputConfig::File { .. } => "file",
        OutputConfig::Stream { .. } => "stream",
        OutputConfig::Segments(_) => "segment",
        OutputConfig::Websocket { .. } => "websocket",
    }
}

/// Describe the sink bins for every output in `conf`.
///
/// `plan` must be present when a segmented output is requested.
pub fn build_output_bins(
    engine: &dyn Engine,
    conf: &PipelineConfig,
    plan: Option<&NamingPlan>,
) -> Result<Vec<Bin>> {
    conf.outputs
        .iter()
        .enumerate()
        .map(|(i, output)| -> Result<Bin> {
            let mut bin = Bin::new(format!("{}_sink_{}", output_type(output), i));
            match output {
                OutputConfig::File { filepath } => {
                    let location = conf.tmp_dir.join(filepath);
                    bin.add_stage(make_stage_with(
                        engine,
                        Factory::Mp4Mux,
                        "mp4mux",
                        [("faststart", PropValue::Bool(true))],
                    )?)?;
                    bin.add_stage(make_stage_with(
                        engine,
                        Factory::FileSink,
                        "filesink",
                        [
                            ("location", PropValue::from(location.display().to_string())),
                            ("sync", PropValue::Bool(false)),
                        ],
                    )?)?;
                }
                OutputConfig::Stream { urls } => {
                    let url = urls
                        .first()
                        .ok_or_else(|| EgressError::invalid_input("stream output without urls"))?;
                    bin.add_stage(make_stage_with(
                        engine,
                        Factory::FlvMux,
                        "flvmux",
                        [("streamable", PropValue::Bool(true))],
                    )?)?;
                    bin.add_stage(make_stage_with(
                        engine,
                        Factory::RtmpSink,
                        "rtmp2sink",
                        [
                            ("location", PropValue::from(url.as_str())),
                            ("async-connect", PropValue::Bool(true)),
                        ],
                    )?)?;
                }
                OutputConfig::Segments(_) => {
                    let plan = plan.ok_or_else(|| {
                        EgressError::invalid_input("segmented output without a naming plan")
                    })?;
                    bin.add_stage(make_stage_with(
                        engine,
                        Factory::HlsSink,
                        "hlssink",
                        [
                            (
                                "playlist-location",
                                PropValue::from(plan.local_playlist_path().display().to_string()),
                            ),
                            (
                                "location",
                                PropValue::from(
                                    plan.local_segment_pattern().display().to_string(),
                                ),
                            ),
                            (
                                "target-duration",
                                PropValue::UInt(plan.segment_duration as u64),
                            ),
                            // 0 = unlimited
                            ("playlist-length", PropValue::UInt(0)),
                            ("max-files", PropValue::UInt(0)),
                        ],
                    )?)?;
                }
                OutputConfig::Websocket { .. } => {
                    bin.add_stage(make_stage_with(
                        engine,
                        Factory::AppSink,
                        "appsink",
                        [
                            ("emit-signals", PropValue::Bool(true)),
                            ("sync", PropValue::Bool(false)),
                        ],
                    )?)?;
                }
            }
            Ok(bin)
        })
        .collect()
}
