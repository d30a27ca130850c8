//! In-process engine
//!
//! Keeps the live graph as a tree of [`Bin`]s behind a mutex and validates
//! every call the way a real engine would: unknown properties and missing
//! factories fail, bin names must stay unique across the graph.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::errors::{EgressError, Result};
use crate::pipeline::engine::{Bin, Engine, Factory, PropValue, ROOT_BIN, Stage};

pub struct MemoryEngine {
    graph: Mutex<Bin>,
    unavailable: HashSet<Factory>,
    calls: AtomicU64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            graph: Mutex::new(Bin::new(ROOT_BIN)),
            unavailable: HashSet::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Engine on which `factory` is not installed.
    pub fn without(mut self, factory: Factory) -> Self {
        self.unavailable.insert(factory);
        self
    }

    /// Number of engine calls made so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Copy of the live graph.
    pub fn snapshot(&self) -> Bin {
        self.lock().clone()
    }

    pub fn contains_bin(&self, name: &str) -> bool {
        self.lock().find(name).is_some()
    }

    /// Names of the direct children of `parent`.
    pub fn children(&self, parent: &str) -> Vec<String> {
        self.lock()
            .find(parent)
            .map(|b| b.bins().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Bin> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemoryEngine {
    fn make_stage(&self, factory: Factory, name: &str) -> Result<Stage> {
        self.record_call();
        if self.unavailable.contains(&factory) {
            return Err(EgressError::engine(format!(
                "could not create {} ({}): factory not installed",
                name, factory
            )));
        }
        Ok(Stage::new(factory, name))
    }

    fn set_property(&self, stage: &mut Stage, key: &str, value: PropValue) -> Result<()> {
        self.record_call();
        if !stage.factory().properties().contains(&key) {
            return Err(EgressError::engine(format!(
                "{} has no property {}",
                stage.factory(),
                key
            )));
        }
        stage.insert_property(key, value);
        Ok(())
    }

    fn property(&self, bin: &str, stage: &str, key: &str) -> Result<PropValue> {
        self.record_call();
        let graph = self.lock();
        graph
            .find(bin)
            .and_then(|b| b.stage(stage))
            .and_then(|s| s.property(key))
            .cloned()
            .ok_or_else(|| EgressError::engine(format!("no property {} on {}/{}", key, bin, stage)))
    }

    fn attach_bin(&self, parent: &str, bin: Bin) -> Result<()> {
        self.record_call();
        let mut graph = self.lock();

        let existing: HashSet<String> = graph.bin_names().into_iter().collect();
        if let Some(dup) = bin.bin_names().into_iter().find(|n| existing.contains(n)) {
            return Err(EgressError::engine(format!("bin {} already exists", dup)));
        }

        let target = graph
            .find_mut(parent)
            .ok_or_else(|| EgressError::engine(format!("parent bin {} not found", parent)))?;
        debug!("engine: attached {} under {}", bin.name(), parent);
        target.add_bin(bin);
        Ok(())
    }

    fn detach_bin(&self, parent: &str, name: &str) -> Result<()> {
        self.record_call();
        let mut graph = self.lock();
        let target = graph
            .find_mut(parent)
            .ok_or_else(|| EgressError::engine(format!("parent bin {} not found", parent)))?;
        target
            .remove_bin(name)
            .ok_or_else(|| EgressError::engine(format!("bin {} not found in {}", name, parent)))?;
        debug!("engine: detached {} from {}", name, parent);
        Ok(())
    }
}
