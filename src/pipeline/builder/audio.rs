//! Audio branch: system-audio capture for web sources, per-track
//! depacketize/decode chains feeding a mixer for SDK sources.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::errors::{EgressError, Result};
use crate::pipeline::builder::{build_caps_filter, build_queue, duration_nanos};
use crate::pipeline::engine::{Bin, Engine, Factory, PropValue, Stage, make_stage_with};
use crate::pipeline::policy::{
    self, AudioChannel, assign_channel, depay_and_decoder, raw_audio_format, rtp_encoding_name,
};
use crate::pipeline::registry::Reservation;
use crate::pipeline::types::{MediaKind, TrackSource};

pub const FILLER_BIN: &str = "audio_test_src";

pub struct AudioBranch {
    conf: Arc<PipelineConfig>,
}

impl AudioBranch {
    pub fn new(conf: Arc<PipelineConfig>) -> Self {
        Self { conf }
    }

    pub fn check_formats(&self) -> Result<()> {
        raw_audio_format(&self.conf)?;
        if self.conf.audio_transcoding {
            policy::audio_encoder(self.conf.audio_out_codec)?;
        }
        Ok(())
    }

    pub fn build_web_input(&self, engine: &dyn Engine, bin: &mut Bin) -> Result<()> {
        let pulse_src = make_stage_with(
            engine,
            Factory::PulseSrc,
            "pulsesrc",
            [(
                "device",
                PropValue::from(format!("{}.monitor", self.conf.egress_id)),
            )],
        )?;
        bin.add_stage(pulse_src)?;
        bin.add_stages(self.converter(engine, AudioChannel::Stereo)?)?;
        self.add_encoder(engine, bin)
    }

    pub fn build_track_bin(
        &self,
        engine: &dyn Engine,
        ts: &TrackSource,
        reservation: &Reservation,
    ) -> Result<Bin> {
        let mut bin = Bin::new(reservation.name.clone());
        // a leaving track must not end the whole recording
        bin.set_eos_forwarding(false);

        if ts.mime_type.kind() != MediaKind::Audio {
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
                "application/x-rtp,media=audio,payload={},encoding-name={},clock-rate={}",
                ts.payload_type, encoding, ts.clock_rate
            )),
        )?;

        bin.add_stage(app_src)?;
        bin.add_stage(engine.make_stage(depay, depay.name())?)?;
        bin.add_stage(engine.make_stage(decoder, decoder.name())?)?;

        let channel = assign_channel(
            self.conf.audio_mixing,
            ts.participant_role,
            reservation.arrival,
        );
        bin.add_stages(self.converter(engine, channel)?)?;
        Ok(bin)
    }

    pub fn build_filler(&self, engine: &dyn Engine) -> Result<Bin> {
        let mut bin = Bin::new(FILLER_BIN);
        let test_src = make_stage_with(
            engine,
            Factory::AudioTestSrc,
            "audiotestsrc",
            [
                ("volume", PropValue::Double(0.0)),
                ("do-timestamp", PropValue::Bool(true)),
                ("is-live", PropValue::Bool(true)),
            ],
        )?;
        let format = raw_audio_format(&self.conf)?;
        bin.add_stage(test_src)?;
        bin.add_stage(build_caps_filter(
            engine,
            "audio_test_caps",
            format.caps(AudioChannel::Stereo),
        )?)?;
        Ok(bin)
    }

    pub fn build_mixer(&self, engine: &dyn Engine, bin: &mut Bin) -> Result<()> {
        let latency = &self.conf.latency;
        let mixer = make_stage_with(
            engine,
            Factory::AudioMixer,
            "audiomixer",
            [
                (
                    "latency",
                    PropValue::UInt(duration_nanos(latency.audio_mixer_latency())),
                ),
                (
                    "alignment-threshold",
                    PropValue::UInt(duration_nanos(latency.pipeline_latency())),
                ),
            ],
        )?;
        let format = raw_audio_format(&self.conf)?;
        bin.add_stage(mixer)?;
        bin.add_stage(build_caps_filter(
            engine,
            "audio_mixer_caps",
            format.caps(AudioChannel::Stereo),
        )?)?;
        self.add_encoder(engine, bin)
    }

    fn add_encoder(&self, engine: &dyn Engine, bin: &mut Bin) -> Result<()> {
        if !self.conf.audio_transcoding {
            return Ok(());
        }
        let Some(factory) = policy::audio_encoder(self.conf.audio_out_codec)? else {
            return Ok(());
        };
        let bitrate = PropValue::Int(self.conf.audio_bitrate as i64 * 1000);
        bin.add_stage(make_stage_with(
            engine,
            factory,
            factory.name(),
            [("bitrate", bitrate)],
        )?)
    }

    /// queue → audioconvert → audioresample → caps tagged with `channel`.
    fn converter(&self, engine: &dyn Engine, channel: AudioChannel) -> Result<Vec<Stage>> {
        let format = raw_audio_format(&self.conf)?;
        Ok(vec![
            build_queue(
                engine,
                "audio_input_queue",
                self.conf.latency.pipeline_latency(),
                true,
            )?,
            engine.make_stage(Factory::AudioConvert, "audioconvert")?,
            engine.make_stage(Factory::AudioResample, "audioresample")?,
            build_caps_filter(engine, "audio_caps", format.caps(channel))?,
        ])
    }
}
