//! Video branch: screen capture for web sources, per-track decode chains
//! composited over a black filler for SDK sources.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::errors::{EgressError, Result};
use crate::pipeline::builder::{build_caps_filter, build_queue, duration_nanos};
use crate::pipeline::engine::{Bin, Engine, Factory, PropValue, Stage, make_stage_with};
use crate::pipeline::policy::{self, depay_and_decoder, raw_video_caps, rtp_encoding_name};
use crate::pipeline::registry::Reservation;
use crate::pipeline::types::{MediaKind, TrackSource};

pub const FILLER_BIN: &str = "video_test_src";

pub struct VideoBranch {
    conf: Arc<PipelineConfig>,
}

impl VideoBranch {
    pub fn new(conf: Arc<PipelineConfig>) -> Self {
        Self { conf }
    }

    pub fn check_formats(&self) -> Result<()> {
        raw_video_caps(&self.conf)?;
        if self.conf.video_transcoding {
            policy::video_encoder(self.conf.video_out_codec)?;
        }
        Ok(())
    }

    pub fn build_web_input(&self, engine: &dyn Engine, bin: &mut Bin) -> Result<()> {
        let capture = make_stage_with(
            engine,
            Factory::XImageSrc,
            "ximagesrc",
            [
                ("display-name", PropValue::from(self.conf.display.as_str())),
                ("use-damage", PropValue::Bool(false)),
                ("show-pointer", PropValue::Bool(false)),
            ],
        )?;
        bin.add_stage(capture)?;
        bin.add_stages(self.converter(engine)?)?;
        bin.add_stage(engine.make_stage(Factory::VideoRate, "videorate")?)?;
        self.add_encoder(engine, bin)
    }

    pub fn build_track_bin(
        &self,
        engine: &dyn Engine,
        ts: &TrackSource,
        reservation: &Reservation,
    ) -> Result<Bin> {
        let mut bin = Bin::new(reservation.name.clone());
        bin.set_eos_forwarding(false);

        if ts.mime_type.kind() != MediaKind::Video {
            return Err(EgressError::unsupported(ts.mime_type));
        }
        let encoding = rtp_encoding_name(ts.mime_type)?;
        let (depay, decoder) = depay_and_decoder(ts.mime_type)?;

        let mut app_src = ts.app_src.stage().clone();
        engine.set_property(&mut app_src, "format", "time".into())?;
        engine.set_property(&mut app_src, "is-live", true.into())?;
        engine.set_property(
            &mut app_src,
            "caps",
            PropValue::Caps(format!(
                "application/x-rtp,media=video,payload={},encoding-name={},clock-rate={}",
                ts.payload_type, encoding, ts.clock_rate
            )),
        )?;

        bin.add_stage(app_src)?;
        bin.add_stage(engine.make_stage(depay, depay.name())?)?;
        bin.add_stage(engine.make_stage(decoder, decoder.name())?)?;
        bin.add_stages(self.converter(engine)?)?;
        Ok(bin)
    }

    pub fn build_filler(&self, engine: &dyn Engine) -> Result<Bin> {
        let mut bin = Bin::new(FILLER_BIN);
        let test_src = make_stage_with(
            engine,
            Factory::VideoTestSrc,
            "videotestsrc",
            [
                ("pattern", PropValue::from("black")),
                ("is-live", PropValue::Bool(true)),
            ],
        )?;
        bin.add_stage(test_src)?;
        bin.add_stage(build_caps_filter(
            engine,
            "video_test_caps",
            raw_video_caps(&self.conf)?,
        )?)?;
        Ok(bin)
    }

    pub fn build_mixer(&self, engine: &dyn Engine, bin: &mut Bin) -> Result<()> {
        let compositor = make_stage_with(
            engine,
            Factory::Compositor,
            "compositor",
            [
                ("background", PropValue::from("black")),
                (
                    "latency",
                    PropValue::UInt(duration_nanos(self.conf.latency.pipeline_latency())),
                ),
            ],
        )?;
        bin.add_stage(compositor)?;
        bin.add_stage(build_caps_filter(
            engine,
            "video_mixer_caps",
            raw_video_caps(&self.conf)?,
        )?)?;
        self.add_encoder(engine, bin)
    }

    fn add_encoder(&self, engine: &dyn Engine, bin: &mut Bin) -> Result<()> {
        if !self.conf.video_transcoding {
            return Ok(());
        }
        let kbps = self.conf.video_bitrate as u64;
        let encoder = match policy::video_encoder(self.conf.video_out_codec)? {
            None => return Ok(()),
            Some(Factory::Vp8Enc) => make_stage_with(
                engine,
                Factory::Vp8Enc,
                "vp8enc",
                [
                    ("target-bitrate", PropValue::UInt(kbps * 1000)),
                    ("deadline", PropValue::Int(1)),
                ],
            )?,
            Some(factory) => make_stage_with(
                engine,
                factory,
                factory.name(),
                [
                    ("bitrate", PropValue::UInt(kbps)),
                    ("speed-preset", PropValue::from("veryfast")),
                    ("tune", PropValue::from("zerolatency")),
                    (
                        "key-int-max",
                        PropValue::UInt(self.conf.framerate as u64 * 2),
                    ),
                ],
            )?,
        };
        bin.add_stage(encoder)
    }

    /// queue → videoconvert → videoscale → raw caps.
    fn converter(&self, engine: &dyn Engine) -> Result<Vec<Stage>> {
        Ok(vec![
            build_queue(
                engine,
                "video_input_queue",
                self.conf.latency.pipeline_latency(),
                true,
            )?,
            engine.make_stage(Factory::VideoConvert, "videoconvert")?,
            engine.make_stage(Factory::VideoScale, "videoscale")?,
            build_caps_filter(engine, "video_caps", raw_video_caps(&self.conf)?)?,
        ])
    }
}
