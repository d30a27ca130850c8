//! Track lifecycle management for one media branch
//!
//! A [`SourceBin`] owns the live branch bin (`audio` or `video`) and keeps
//! the set of per-track child bins in step with track publications. Add and
//! remove requests arrive from event callbacks on arbitrary threads; they
//! never return errors and push failures to the [`ErrorReporter`] instead.
//! Web branches capture a single rendered source and ignore track events.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::{PipelineConfig, SourceType};
use crate::errors::Result;
use crate::pipeline::builder::{Branch, add_output_link};
use crate::pipeline::engine::{Bin, Engine, ROOT_BIN};
use crate::pipeline::registry::TrackRegistry;
use crate::pipeline::report::ErrorReporter;
use crate::pipeline::state::LifecycleState;
use crate::pipeline::types::{MediaKind, TrackSource};

pub struct SourceBin {
    name: String,
    source_type: SourceType,
    branch: Branch,
    engine: Arc<dyn Engine>,
    state: Arc<LifecycleState>,
    registry: TrackRegistry,
    errors: ErrorReporter,
}

impl SourceBin {
    /// Build the whole branch in memory and attach it under the root bin.
    ///
    /// SDK branches start with one track bin per entry of `initial`, built the
    /// same way as runtime arrivals, plus the filler source. Nothing is
    /// attached when any step fails.
    pub fn build(
        branch: Branch,
        conf: &PipelineConfig,
        initial: &[TrackSource],
        engine: Arc<dyn Engine>,
        state: Arc<LifecycleState>,
        errors: ErrorReporter,
    ) -> Result<Self> {
        branch.check_formats()?;

        let kind = branch.kind();
        let source = Self {
            name: kind.as_str().to_string(),
            source_type: conf.source_type,
            branch,
            engine,
            state,
            registry: TrackRegistry::new(),
            errors,
        };

        let mut bin = Bin::new(source.name.clone());
        let engine = source.engine.as_ref();
        match conf.source_type {
            SourceType::Web => source.branch.build_web_input(engine, &mut bin)?,
            SourceType::Sdk => {
                for ts in initial {
                    if ts.kind != kind {
                        warn!("{}: skipping {} track {}", source.name, ts.kind, ts.track_id);
                        continue;
                    }
                    let Some(reservation) = source.registry.reserve(&ts.track_id) else {
                        warn!("{}: track {} listed twice", source.name, ts.track_id);
                        continue;
                    };
                    let track_bin = source.branch.build_track_bin(engine, ts, &reservation)?;
                    source
                        .registry
                        .commit(&ts.track_id, &reservation.name, || {
                            bin.add_bin(track_bin);
                            Ok(())
                        })?;
                }
                bin.add_bin(source.branch.build_filler(engine)?);
                source.branch.build_mixer(engine, &mut bin)?;
            }
        }
        let topology = add_output_link(engine, &mut bin, kind, conf)?;

        if let Err(e) = engine.attach_bin(ROOT_BIN, bin) {
            source.registry.drain();
            return Err(e);
        }
        info!(
            "{}: branch attached ({:?} output, {} tracks)",
            source.name,
            topology,
            source.registry.len()
        );
        Ok(source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MediaKind {
        self.branch.kind()
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    /// Build and attach a bin for a newly published track.
    pub fn on_track_added(&self, ts: &TrackSource) {
        if self.source_type == SourceType::Web {
            debug!("{}: web capture, ignoring track {}", self.name, ts.track_id);
            return;
        }
        let state = self.state.get();
        if !state.accepts_mutations() {
            debug!("{}: ignoring track {} while {}", self.name, ts.track_id, state);
            return;
        }
        if ts.kind != self.kind() {
            debug!("{}: ignoring {} track {}", self.name, ts.kind, ts.track_id);
            return;
        }

        // unsupported tracks never take an arrival ordinal
        if let Err(e) = self.branch.check_track(ts) {
            self.errors.report(&e);
            return;
        }

        let Some(reservation) = self.registry.reserve(&ts.track_id) else {
            warn!("{}: track {} already present", self.name, ts.track_id);
            return;
        };

        // construction can be slow, keep it outside the registry lock
        let bin = match self
            .branch
            .build_track_bin(self.engine.as_ref(), ts, &reservation)
        {
            Ok(bin) => bin,
            Err(e) => {
                self.registry.abandon(&ts.track_id);
                self.errors.report(&e);
                return;
            }
        };

        let res = self.registry.commit(&ts.track_id, &reservation.name, || {
            self.engine.attach_bin(&self.name, bin)
        });
        match res {
            Ok(()) => info!("{}: track {} added as {}", self.name, ts.track_id, reservation.name),
            Err(e) => self.errors.report(&e),
        }
    }

    /// Detach the bin of an unpublished track. Unknown ids are ignored.
    pub fn on_track_removed(&self, track_id: &str) {
        if self.source_type == SourceType::Web {
            debug!("{}: web capture, ignoring removal of {}", self.name, track_id);
            return;
        }
        let state = self.state.get();
        if !state.accepts_mutations() {
            debug!("{}: ignoring removal of {} while {}", self.name, track_id, state);
            return;
        }

        let res = self
            .registry
            .release(track_id, |name| self.engine.detach_bin(&self.name, name));
        match res {
            Ok(Some(name)) => info!("{}: track {} removed ({})", self.name, track_id, name),
            Ok(None) => debug!("{}: no bin for track {}", self.name, track_id),
            Err(e) => self.errors.report(&e),
        }
    }

    /// Forget every track and detach the branch from the root.
    pub fn teardown(&self) -> Result<()> {
        let names = self.registry.drain();
        debug!("{}: dropping {} track bins", self.name, names.len());
        self.engine.detach_bin(ROOT_BIN, &self.name)
    }

    /// Ids of the tracks that currently have a bin attached.
    pub fn track_ids(&self) -> Vec<String> {
        self.registry.track_ids()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.registry.contains(track_id)
    }

    pub fn bin_name_of(&self, track_id: &str) -> Option<String> {
        self.registry.name_of(track_id)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioMixing, OutputConfig};
    use crate::errors::ErrorKind;
    use crate::pipeline::builder::{AudioBranch, VideoBranch};
    use crate::pipeline::engine::{Factory, PropValue};
    use crate::pipeline::memory::MemoryEngine;
    use crate::pipeline::state::PipelineState;
    use crate::pipeline::types::{MimeType, ParticipantRole};

    fn sdk_conf(mixing: AudioMixing) -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig {
            egress_id: "EG_1".into(),
            source_type: SourceType::Sdk,
            audio_mixing: mixing,
            video_enabled: true,
            outputs: vec![OutputConfig::File {
                filepath: "out.mp4".into(),
            }],
            ..Default::default()
        })
    }

    struct Fixture {
        engine: Arc<MemoryEngine>,
        state: Arc<LifecycleState>,
        rx: tokio::sync::mpsc::UnboundedReceiver<crate::pipeline::report::PipelineError>,
        audio: SourceBin,
    }

    fn audio_fixture(mixing: AudioMixing, initial: &[TrackSource], engine: MemoryEngine) -> Fixture {
        let conf = sdk_conf(mixing);
        let engine = Arc::new(engine);
        let state = Arc::new(LifecycleState::new());
        let (errors, rx) = ErrorReporter::new();
        let audio = SourceBin::build(
            Branch::Audio(AudioBranch::new(conf.clone())),
            &conf,
            initial,
            engine.clone(),
            state.clone(),
            errors,
        )
        .unwrap();
        Fixture {
            engine,
            state,
            rx,
            audio,
        }
    }

    fn channel_caps(engine: &MemoryEngine, bin: &str) -> PropValue {
        engine.property(bin, "audio_caps", "caps").unwrap()
    }

    #[test]
    fn test_sdk_branch_layout() {
        let engine = MemoryEngine::new();
        let initial = vec![TrackSource::opus(&engine, "TR_a", ParticipantRole::Standard).unwrap()];
        let f = audio_fixture(AudioMixing::Default, &initial, engine);

        assert_eq!(f.audio.track_ids(), vec!["TR_a"]);
        assert_eq!(f.engine.children(ROOT_BIN), vec!["audio"]);
        assert_eq!(f.engine.children("audio"), vec!["TR_a_0", "audio_test_src"]);

        let graph = f.engine.snapshot();
        let audio = graph.find("audio").unwrap();
        assert_eq!(audio.stages()[0].factory(), Factory::AudioMixer);
        assert_eq!(audio.stage("audio_queue").unwrap().factory(), Factory::Queue);
    }

    #[test]
    fn test_add_and_remove_track() {
        let engine = MemoryEngine::new();
        let mut f = audio_fixture(AudioMixing::Default, &[], engine);
        f.state.advance(PipelineState::Running);

        let ts = TrackSource::opus(f.engine.as_ref(), "TR_b", ParticipantRole::Standard).unwrap();
        f.audio.on_track_added(&ts);
        let name = f.audio.bin_name_of("TR_b").unwrap();
        assert!(f.engine.contains_bin(&name));

        f.audio.on_track_removed("TR_b");
        assert!(!f.audio.contains("TR_b"));
        assert!(!f.engine.contains_bin(&name));

        // second removal is a silent no-op
        f.audio.on_track_removed("TR_b");
        assert!(f.rx.try_recv().is_err());
    }

    #[test]
    fn test_duplicate_add_is_ignored() {
        let engine = MemoryEngine::new();
        let f = audio_fixture(AudioMixing::Default, &[], engine);
        let ts = TrackSource::opus(f.engine.as_ref(), "TR_a", ParticipantRole::Standard).unwrap();

        f.audio.on_track_added(&ts);
        f.audio.on_track_added(&ts);
        assert_eq!(f.audio.len(), 1);
        assert_eq!(f.engine.children("audio").len(), 2);
    }

    #[test]
    fn test_video_track_ignored_by_audio_branch() {
        let engine = MemoryEngine::new();
        let f = audio_fixture(AudioMixing::Default, &[], engine);
        let ts = TrackSource::video(f.engine.as_ref(), "TR_v", MimeType::Vp8).unwrap();

        f.audio.on_track_added(&ts);
        assert!(f.audio.is_empty());
    }

    #[test]
    fn test_mutations_ignored_after_stop() {
        let engine = MemoryEngine::new();
        let initial = vec![TrackSource::opus(&engine, "TR_a", ParticipantRole::Standard).unwrap()];
        let f = audio_fixture(AudioMixing::Default, &initial, engine);
        let late = TrackSource::opus(f.engine.as_ref(), "TR_late", ParticipantRole::Standard)
            .unwrap();

        f.state.advance(PipelineState::Stopping);
        let calls = f.engine.call_count();
        f.audio.on_track_added(&late);
        f.audio.on_track_removed("TR_a");

        assert_eq!(f.engine.call_count(), calls);
        assert!(f.audio.contains("TR_a"));
        assert!(!f.audio.contains("TR_late"));
    }

    #[test]
    fn test_alternating_channels_follow_arrival_order() {
        let engine = MemoryEngine::new();
        let f = audio_fixture(AudioMixing::DualChannelAlternate, &[], engine);

        let mut names = Vec::new();
        for id in ["TR_1", "TR_2", "TR_3"] {
            let ts = TrackSource::opus(f.engine.as_ref(), id, ParticipantRole::Agent).unwrap();
            f.audio.on_track_added(&ts);
            names.push(f.audio.bin_name_of(id).unwrap());
        }

        let right = "channels=1,channel-mask=(bitmask)0x2";
        let left = "channels=1,channel-mask=(bitmask)0x1";
        for (name, side) in names.iter().zip([right, left, right]) {
            match channel_caps(&f.engine, name) {
                PropValue::Caps(caps) => assert!(caps.ends_with(side), "{} has {}", name, caps),
                other => panic!("unexpected caps {:?}", other),
            }
        }
    }

    #[test]
    fn test_build_failure_reported() {
        let engine = MemoryEngine::new();
        let mut f = audio_fixture(AudioMixing::Default, &[], engine);

        let mut ts = TrackSource::opus(f.engine.as_ref(), "TR_x", ParticipantRole::Standard).unwrap();
        ts.mime_type = MimeType::Aac;
        f.audio.on_track_added(&ts);

        assert!(!f.audio.contains("TR_x"));
        let report = f.rx.try_recv().unwrap();
        assert_eq!(report.kind, ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_web_branch_has_no_track_bins() {
        let conf = Arc::new(PipelineConfig {
            egress_id: "EG_web".into(),
            video_enabled: true,
            outputs: vec![
                OutputConfig::File {
                    filepath: "a.mp4".into(),
                },
                OutputConfig::Websocket {
                    url: "ws://localhost/ingest".into(),
                },
            ],
            ..Default::default()
        });
        let engine = Arc::new(MemoryEngine::new());
        let (errors, _rx) = ErrorReporter::new();
        let video = SourceBin::build(
            Branch::Video(VideoBranch::new(conf.clone())),
            &conf,
            &[],
            engine.clone(),
            Arc::new(LifecycleState::new()),
            errors,
        )
        .unwrap();

        assert!(video.is_empty());
        let graph = engine.snapshot();
        let bin = graph.find("video").unwrap();
        assert!(bin.bins().is_empty());
        assert_eq!(bin.stages()[0].factory(), Factory::XImageSrc);
        assert!(bin.stage("video_tee").is_some());
    }

    #[test]
    fn test_web_branch_ignores_track_events() {
        let conf = Arc::new(PipelineConfig {
            egress_id: "EG_web".into(),
            outputs: vec![OutputConfig::File {
                filepath: "a.ogg".into(),
            }],
            ..Default::default()
        });
        let engine = Arc::new(MemoryEngine::new());
        let state = Arc::new(LifecycleState::new());
        let (errors, mut rx) = ErrorReporter::new();
        let audio = SourceBin::build(
            Branch::Audio(AudioBranch::new(conf.clone())),
            &conf,
            &[],
            engine.clone(),
            state.clone(),
            errors,
        )
        .unwrap();
        state.advance(PipelineState::Running);
        assert_eq!(audio.source_type(), SourceType::Web);

        let ts = TrackSource::opus(engine.as_ref(), "TR_x", ParticipantRole::Standard).unwrap();
        let calls = engine.call_count();
        audio.on_track_added(&ts);
        audio.on_track_removed("TR_x");

        assert_eq!(engine.call_count(), calls);
        assert!(audio.is_empty());
        assert!(engine.children("audio").is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsupported_track_keeps_alternation() {
        let engine = MemoryEngine::new();
        let f = audio_fixture(AudioMixing::DualChannelAlternate, &[], engine);

        let first = TrackSource::opus(f.engine.as_ref(), "TR_1", ParticipantRole::Standard).unwrap();
        f.audio.on_track_added(&first);

        let mut bad = TrackSource::opus(f.engine.as_ref(), "TR_bad", ParticipantRole::Standard)
            .unwrap();
        bad.mime_type = MimeType::Aac;
        f.audio.on_track_added(&bad);

        let second = TrackSource::opus(f.engine.as_ref(), "TR_2", ParticipantRole::Standard).unwrap();
        f.audio.on_track_added(&second);

        let name = f.audio.bin_name_of("TR_2").unwrap();
        match channel_caps(&f.engine, &name) {
            PropValue::Caps(caps) => assert!(caps.ends_with("channel-mask=(bitmask)0x1")),
            other => panic!("unexpected caps {:?}", other),
        }
    }

    #[test]
    fn test_engine_failure_frees_track_id() {
        let engine = MemoryEngine::new().without(Factory::OpusDec);
        let mut f = audio_fixture(AudioMixing::Default, &[], engine);
        let ts = TrackSource::opus(f.engine.as_ref(), "TR_a", ParticipantRole::Standard).unwrap();

        f.audio.on_track_added(&ts);
        assert!(!f.audio.contains("TR_a"));
        // a retry is built again, not refused as a duplicate
        f.audio.on_track_added(&ts);
        assert!(!f.audio.contains("TR_a"));
        for _ in 0..2 {
            assert_eq!(f.rx.try_recv().unwrap().kind, ErrorKind::EngineFailure);
        }
        assert!(f.engine.children("audio").iter().all(|n| n == "audio_test_src"));
    }

    #[test]
    fn test_failed_attach_leaves_nothing() {
        let engine = MemoryEngine::new();
        let conf = sdk_conf(AudioMixing::Default);
        // occupy the branch name
        engine.attach_bin(ROOT_BIN, Bin::new("audio")).unwrap();
        let engine = Arc::new(engine);
        let initial = vec![TrackSource::opus(engine.as_ref(), "TR_a", ParticipantRole::Standard).unwrap()];
        let (errors, _rx) = ErrorReporter::new();

        let res = SourceBin::build(
            Branch::Audio(AudioBranch::new(conf.clone())),
            &conf,
            &initial,
            engine.clone(),
            Arc::new(LifecycleState::new()),
            errors,
        );
        assert!(res.is_err());
        assert!(!engine.contains_bin("TR_a_0"));
    }
}
