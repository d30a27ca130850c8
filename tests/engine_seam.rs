use std::sync::{Arc, Mutex};

use egress_core::config::{OutputConfig, PipelineConfig, SourceType};
use egress_core::pipeline::report::ErrorReporter;
use egress_core::pipeline::{
    Bin, Engine, Factory, ParticipantRole, PipelineCoordinator, PropValue, ROOT_BIN, Stage,
    TrackSource,
};
use egress_core::{EgressError, Result};

/// Engine kept by the caller: accepts every property and records the graph.
struct TreeEngine {
    root: Mutex<Bin>,
}

impl TreeEngine {
    fn new() -> Self {
        Self {
            root: Mutex::new(Bin::new(ROOT_BIN)),
        }
    }

    fn children(&self, parent: &str) -> Vec<String> {
        let root = self.root.lock().unwrap();
        root.find(parent)
            .map(|b| b.bins().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default()
    }
}

impl Engine for TreeEngine {
    fn make_stage(&self, factory: Factory, name: &str) -> Result<Stage> {
        Ok(Stage::new(factory, name))
    }

    fn set_property(&self, stage: &mut Stage, key: &str, value: PropValue) -> Result<()> {
        stage.insert_property(key, value);
        Ok(())
    }

    fn property(&self, bin: &str, stage: &str, key: &str) -> Result<PropValue> {
        let root = self.root.lock().unwrap();
        root.find(bin)
            .and_then(|b| b.stage(stage))
            .and_then(|s| s.property(key))
            .cloned()
            .ok_or_else(|| EgressError::engine(format!("{}/{} has no {}", bin, stage, key)))
    }

    fn attach_bin(&self, parent: &str, bin: Bin) -> Result<()> {
        let mut root = self.root.lock().unwrap();
        root.find_mut(parent)
            .ok_or_else(|| EgressError::engine(format!("no parent {}", parent)))?
            .add_bin(bin);
        Ok(())
    }

    fn detach_bin(&self, parent: &str, name: &str) -> Result<()> {
        let mut root = self.root.lock().unwrap();
        root.find_mut(parent)
            .and_then(|p| p.remove_bin(name))
            .map(|_| ())
            .ok_or_else(|| EgressError::engine(format!("no bin {}", name)))
    }
}

#[test]
fn test_graph_built_through_caller_engine() {
    let engine = Arc::new(TreeEngine::new());
    let conf = PipelineConfig {
        egress_id: "EG_ext".into(),
        source_type: SourceType::Sdk,
        outputs: vec![OutputConfig::Stream {
            urls: vec!["rtmp://live/app/key".into()],
        }],
        ..Default::default()
    };
    let (errors, _rx) = ErrorReporter::new();
    let coordinator = PipelineCoordinator::build(
        engine.clone() as Arc<dyn Engine>,
        Arc::new(conf),
        None,
        errors,
    )
    .unwrap();
    coordinator.start().unwrap();

    assert_eq!(engine.children(ROOT_BIN), vec!["audio", "stream_sink_0"]);
    assert_eq!(
        engine.property("stream_sink_0", "rtmp2sink", "location").unwrap(),
        PropValue::Str("rtmp://live/app/key".into())
    );

    let ts = TrackSource::opus(engine.as_ref(), "TR_ext", ParticipantRole::Standard).unwrap();
    coordinator.notify_track_added(&ts);
    assert_eq!(engine.children("audio"), vec!["audio_test_src", "TR_ext_0"]);
    assert!(matches!(
        engine.property("TR_ext_0", "audio_caps", "caps"),
        Ok(PropValue::Caps(_))
    ));

    coordinator.notify_track_removed("TR_ext");
    assert_eq!(engine.children("audio"), vec!["audio_test_src"]);
}
