//! Track registry
//!
//! Maps external track ids to the internal name of the bin built for them.
//! A name is present exactly while its bin is attached: mappings are only
//! recorded after a successful attach and dropped together with the detach,
//! both under the registry lock. Between [`TrackRegistry::reserve`] and
//! [`TrackRegistry::commit`] the id is held as pending, so an overlapping
//! add of the same id is refused before it builds anything.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::{EgressError, Result};

#[derive(Debug, Default)]
struct Inner {
    names: HashMap<String, String>,
    pending: HashSet<String>,
    next_id: u64,
    arrivals: u64,
}

/// Fresh bin name and arrival ordinal handed out for one add request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub name: String,
    /// 1-based, counts every reserved add in this session.
    pub arrival: u64,
}

#[derive(Debug, Default)]
pub struct TrackRegistry {
    inner: Mutex<Inner>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate `<track_id>_<seq>` and the next arrival ordinal, and hold
    /// `track_id` as pending until [`commit`](Self::commit) or
    /// [`abandon`](Self::abandon).
    ///
    /// Returns `None` while `track_id` has a bin attached or an add in flight.
    pub fn reserve(&self, track_id: &str) -> Option<Reservation> {
        let mut inner = self.lock();
        if inner.names.contains_key(track_id) || inner.pending.contains(track_id) {
            return None;
        }
        inner.pending.insert(track_id.to_string());
        let name = format!("{}_{}", track_id, inner.next_id);
        inner.next_id += 1;
        inner.arrivals += 1;
        Some(Reservation {
            name,
            arrival: inner.arrivals,
        })
    }

    /// Release a pending id whose bin could not be built.
    pub fn abandon(&self, track_id: &str) {
        self.lock().pending.remove(track_id);
    }

    /// Run `attach` under the lock and record the mapping if it succeeds.
    pub fn commit(
        &self,
        track_id: &str,
        name: &str,
        attach: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.pending.remove(track_id);
        if inner.names.contains_key(track_id) {
            return Err(EgressError::invalid_input(format!(
                "track {} is already attached",
                track_id
            )));
        }
        attach()?;
        inner.names.insert(track_id.to_string(), name.to_string());
        Ok(())
    }

    /// Run `detach` on the bin registered for `track_id` and drop the mapping
    /// if it succeeds, under the lock. Returns `Ok(None)` when nothing is
    /// registered.
    pub fn release(
        &self,
        track_id: &str,
        detach: impl FnOnce(&str) -> Result<()>,
    ) -> Result<Option<String>> {
        let mut inner = self.lock();
        let Some(name) = inner.names.get(track_id).cloned() else {
            return Ok(None);
        };
        detach(&name)?;
        inner.names.remove(track_id);
        Ok(Some(name))
    }

    /// Drop every mapping, returning the bin names that were registered.
    pub fn drain(&self) -> Vec<String> {
        let mut inner = self.lock();
        inner.pending.clear();
        inner.names.drain().map(|(_, name)| name).collect()
    }

    pub fn name_of(&self, track_id: &str) -> Option<String> {
        self.lock().names.get(track_id).cloned()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.lock().names.contains_key(track_id)
    }

    /// Registered track ids, sorted.
    pub fn track_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().names.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_allocates_unique_names() {
        let registry = TrackRegistry::new();
        let a = registry.reserve("TR_a").unwrap();
        let b = registry.reserve("TR_b").unwrap();
        assert_eq!(a.name, "TR_a_0");
        assert_eq!(a.arrival, 1);
        assert_eq!(b.name, "TR_b_1");
        assert_eq!(b.arrival, 2);
        // reserving does not register
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reused_track_id_gets_fresh_name() {
        let registry = TrackRegistry::new();
        let first = registry.reserve("TR_a").unwrap();
        registry.commit("TR_a", &first.name, || Ok(())).unwrap();
        assert!(registry.reserve("TR_a").is_none());

        registry.release("TR_a", |_| Ok(())).unwrap();
        let second = registry.reserve("TR_a").unwrap();
        assert_ne!(first.name, second.name);
    }

    #[test]
    fn test_failed_attach_is_not_recorded() {
        let registry = TrackRegistry::new();
        let r = registry.reserve("TR_a").unwrap();
        let res = registry.commit("TR_a", &r.name, || Err(EgressError::engine("nope")));
        assert!(res.is_err());
        assert!(!registry.contains("TR_a"));
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let registry = TrackRegistry::new();
        let mut called = false;
        let res = registry.release("missing", |_| {
            called = true;
            Ok(())
        });
        assert!(matches!(res, Ok(None)));
        assert!(!called);
    }

    #[test]
    fn test_failed_detach_keeps_mapping() {
        let registry = TrackRegistry::new();
        let r = registry.reserve("TR_a").unwrap();
        registry.commit("TR_a", &r.name, || Ok(())).unwrap();

        let res = registry.release("TR_a", |_| Err(EgressError::engine("busy")));
        assert!(res.is_err());
        assert_eq!(registry.name_of("TR_a"), Some(r.name.clone()));

        let res = registry.release("TR_a", |_| Ok(())).unwrap();
        assert_eq!(res, Some(r.name));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_pending_id_refuses_second_reserve() {
        let registry = TrackRegistry::new();
        let first = registry.reserve("TR_a").unwrap();
        // add still in flight
        assert!(registry.reserve("TR_a").is_none());

        registry.commit("TR_a", &first.name, || Ok(())).unwrap();
        assert!(registry.reserve("TR_a").is_none());
        assert_eq!(registry.name_of("TR_a"), Some(first.name));
    }

    #[test]
    fn test_abandon_frees_pending_id() {
        let registry = TrackRegistry::new();
        registry.reserve("TR_a").unwrap();
        registry.abandon("TR_a");

        let again = registry.reserve("TR_a").unwrap();
        assert_eq!(again.name, "TR_a_1");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_commit_never_overwrites_attached_id() {
        let registry = TrackRegistry::new();
        let first = registry.reserve("TR_a").unwrap();
        registry.commit("TR_a", &first.name, || Ok(())).unwrap();

        let mut attached = false;
        let res = registry.commit("TR_a", "TR_a_9", || {
            attached = true;
            Ok(())
        });
        assert!(res.is_err());
        assert!(!attached);
        assert_eq!(registry.name_of("TR_a"), Some(first.name));
    }
}
