//! Session-level graph handle
//!
//! Builds every enabled branch plus the output bins, drives the lifecycle
//! state, and routes track events to the branch that owns the track kind.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::errors::{EgressError, Result};
use crate::output::naming::NamingPlan;
use crate::pipeline::builder::{AudioBranch, Branch, VideoBranch, build_output_bins};
use crate::pipeline::engine::{Engine, ROOT_BIN};
use crate::pipeline::report::ErrorReporter;
use crate::pipeline::source_bin::SourceBin;
use crate::pipeline::state::{LifecycleState, PipelineState};
use crate::pipeline::types::{MediaKind, TrackSource};

pub struct PipelineCoordinator {
    engine: Arc<dyn Engine>,
    state: Arc<LifecycleState>,
    audio: Option<SourceBin>,
    video: Option<SourceBin>,
    outputs: Vec<String>,
}

impl PipelineCoordinator {
    /// Build the graph for a session.
    ///
    /// `plan` is required when `conf` requests a segmented output. On failure
    /// every bin attached so far is detached again before the error is
    /// returned.
    pub fn build(
        engine: Arc<dyn Engine>,
        conf: Arc<PipelineConfig>,
        plan: Option<&NamingPlan>,
        errors: ErrorReporter,
    ) -> Result<Self> {
        conf.validate()?;

        let mut coordinator = Self {
            engine,
            state: Arc::new(LifecycleState::new()),
            audio: None,
            video: None,
            outputs: Vec::new(),
        };
        if let Err(e) = coordinator.assemble(conf, plan, errors) {
            warn!("pipeline build failed: {}", e);
            coordinator.release_graph();
            return Err(e);
        }
        info!(
            "pipeline built: audio={} video={} outputs={}",
            coordinator.audio.is_some(),
            coordinator.video.is_some(),
            coordinator.outputs.len()
        );
        Ok(coordinator)
    }

    fn assemble(
        &mut self,
        conf: Arc<PipelineConfig>,
        plan: Option<&NamingPlan>,
        errors: ErrorReporter,
    ) -> Result<()> {
        if conf.audio_enabled {
            self.audio = Some(SourceBin::build(
                Branch::Audio(AudioBranch::new(conf.clone())),
                &conf,
                &conf.audio_tracks,
                self.engine.clone(),
                self.state.clone(),
                errors.clone(),
            )?);
        }
        if conf.video_enabled {
            self.video = Some(SourceBin::build(
                Branch::Video(VideoBranch::new(conf.clone())),
                &conf,
                &conf.video_tracks,
                self.engine.clone(),
                self.state.clone(),
                errors,
            )?);
        }
        for bin in build_output_bins(self.engine.as_ref(), &conf, plan)? {
            let name = bin.name().to_string();
            self.engine.attach_bin(ROOT_BIN, bin)?;
            self.outputs.push(name);
        }
        Ok(())
    }

    /// Detach everything this coordinator attached. Best effort.
    fn release_graph(&mut self) {
        for name in self.outputs.drain(..) {
            if let Err(e) = self.engine.detach_bin(ROOT_BIN, &name) {
                warn!("failed to detach {}: {}", name, e);
            }
        }
        for source in [self.audio.take(), self.video.take()].into_iter().flatten() {
            if let Err(e) = source.teardown() {
                warn!("failed to detach {}: {}", source.name(), e);
            }
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn start(&self) -> Result<()> {
        match self.state.advance(PipelineState::Running) {
            Some(prev) => {
                info!("pipeline: {} -> {}", prev, PipelineState::Running);
                Ok(())
            }
            None => Err(EgressError::invalid_input(format!(
                "cannot start a {} pipeline",
                self.state()
            ))),
        }
    }

    /// Stop accepting track changes and tear the graph down. Calling it again
    /// is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        match self.state.advance(PipelineState::Stopping) {
            Some(prev) if prev < PipelineState::Stopping => {
                info!("pipeline: {} -> {}", prev, PipelineState::Stopping)
            }
            _ => {
                debug!("pipeline already {}", self.state());
                return Ok(());
            }
        }
        self.release_graph();
        self.state.advance(PipelineState::Stopped);
        info!("pipeline: {}", PipelineState::Stopped);
        Ok(())
    }

    pub fn notify_track_added(&self, ts: &TrackSource) {
        let target = match ts.kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
        };
        match target {
            Some(source) => source.on_track_added(ts),
            None => debug!("{} disabled, ignoring track {}", ts.kind, ts.track_id),
        }
    }

    /// Removal carries no kind; only the owning branch finds the id.
    pub fn notify_track_removed(&self, track_id: &str) {
        for source in [self.audio.as_ref(), self.video.as_ref()].into_iter().flatten() {
            source.on_track_removed(track_id);
        }
    }

    pub fn audio(&self) -> Option<&SourceBin> {
        self.audio.as_ref()
    }

    pub fn video(&self) -> Option<&SourceBin> {
        self.video.as_ref()
    }

    /// Names of the attached output bins, in request order.
    pub fn output_bins(&self) -> &[String] {
        &self.outputs
    }
}
