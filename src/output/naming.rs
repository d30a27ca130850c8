//! Output path resolver
//!
//! Turns the user supplied segment prefix, playlist name and live playlist
//! name into a [`NamingPlan`]. Resolution runs once, before the graph is
//! built. Every validation happens before the only side effect, creating
//! the local segment directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use crate::config::{PipelineConfig, SegmentOutputRequest, SegmentProtocol};
use crate::errors::{EgressError, Result};
use crate::utils::path::{clean, escapes_root, remove_known_extension, split};

const TIME_FORMAT: &str = "%Y-%m-%dT%H%M%S";
const UTC_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Session values the naming scheme is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySeed {
    /// Used for synthesized playlist names.
    pub identifier: String,
    pub room_name: String,
    pub room_id: String,
    pub egress_id: String,
    pub start_time: DateTime<Utc>,
}

impl IdentitySeed {
    /// Seed for a session; the identifier is the room name, or the egress id
    /// for sessions not bound to a room.
    pub fn from_config(conf: &PipelineConfig, start_time: DateTime<Utc>) -> Self {
        let identifier = if conf.room_name.is_empty() {
            conf.egress_id.clone()
        } else {
            conf.room_name.clone()
        };
        Self {
            identifier,
            room_name: conf.room_name.clone(),
            room_id: conf.room_id.clone(),
            egress_id: conf.egress_id.clone(),
            start_time,
        }
    }

    /// Replace filename tokens with session values.
    pub fn substitute(&self, raw: &str) -> String {
        raw.replace("{room_name}", &self.room_name)
            .replace("{room_id}", &self.room_id)
            .replace("{egress_id}", &self.egress_id)
            .replace("{time}", &self.start_time.format(TIME_FORMAT).to_string())
            .replace("{utc}", &self.start_time.format(UTC_FORMAT).to_string())
    }
}

/// Resolved naming and storage layout of a segmented output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamingPlan {
    /// Remote directory playlists and segments are stored under, empty or
    /// ending in `/`.
    pub storage_dir: String,
    pub playlist_filename: String,
    /// Empty when no live playlist was requested.
    pub live_playlist_filename: String,
    /// Segment name prefix, relative to `storage_dir` and `local_dir`.
    pub segment_prefix: String,
    /// Session-scoped local working directory.
    pub local_dir: PathBuf,
    /// Seconds.
    pub segment_duration: u32,
    pub disable_manifest: bool,
}

impl NamingPlan {
    pub fn playlist_location(&self) -> String {
        format!("{}{}", self.storage_dir, self.playlist_filename)
    }

    pub fn live_playlist_location(&self) -> Option<String> {
        if self.live_playlist_filename.is_empty() {
            None
        } else {
            Some(format!("{}{}", self.storage_dir, self.live_playlist_filename))
        }
    }

    pub fn local_playlist_path(&self) -> PathBuf {
        self.local_dir.join(&self.playlist_filename)
    }

    /// Local segment filename pattern, numbered by the segmenter.
    pub fn local_segment_pattern(&self) -> PathBuf {
        self.local_dir
            .join(format!("{}_%05d{}", self.segment_prefix, segment_extension()))
    }
}

fn playlist_extension(protocol: SegmentProtocol) -> &'static str {
    match protocol {
        SegmentProtocol::Hls => ".m3u8",
    }
}

fn segment_extension() -> &'static str {
    ".ts"
}

/// Derive the [`NamingPlan`] of a segmented output.
///
/// Fails with `InvalidInput` when the live playlist lives in another
/// directory than the playlist, when both resolve to the same file, or when
/// a name walks out of the storage directory. `local_root` is the session
/// working directory; a segment sub-directory is created below it.
pub fn resolve_naming(
    request: &SegmentOutputRequest,
    seed: &IdentitySeed,
    local_root: &Path,
) -> Result<NamingPlan> {
    let prefix = seed.substitute(&clean(&request.filename_prefix));
    let playlist = seed.substitute(&clean(&request.playlist_name));
    let live_playlist = seed.substitute(&clean(&request.live_playlist_name));

    for name in [&prefix, &playlist, &live_playlist] {
        if escapes_root(name) {
            return Err(EgressError::invalid_input(format!(
                "{} must stay inside the storage directory",
                name
            )));
        }
    }

    let (playlist_dir, playlist_name) = split(&playlist);
    let (live_dir, live_name) = split(&live_playlist);
    let (segment_dir, segment_base) = split(&prefix);

    if !live_dir.is_empty() && live_dir != playlist_dir {
        return Err(EgressError::invalid_input(
            "live_playlist_name must be in same directory as playlist_name",
        ));
    }

    let mut playlist_name = remove_known_extension(playlist_name).to_string();
    let live_name = remove_known_extension(live_name);

    // segments live in the playlist directory or below it
    let mut storage_dir = playlist_dir.to_string();
    let mut segment_dir = segment_dir.to_string();
    if !segment_dir.is_empty() {
        if segment_dir == storage_dir {
            segment_dir.clear();
        } else if storage_dir.is_empty() && playlist_name.is_empty() {
            storage_dir = std::mem::take(&mut segment_dir);
        } else if !storage_dir.is_empty() && segment_dir.starts_with(&storage_dir) {
            segment_dir.replace_range(..storage_dir.len(), "");
        }
    }

    if playlist_name.is_empty() {
        playlist_name = if segment_base.is_empty() {
            format!(
                "{}-{}",
                seed.identifier,
                seed.start_time.format(TIME_FORMAT)
            )
        } else {
            segment_base.to_string()
        };
    }
    let segment_base = if segment_base.is_empty() {
        playlist_name.as_str()
    } else {
        segment_base
    };

    let ext = playlist_extension(request.protocol);
    let playlist_filename = format!("{}{}", playlist_name, ext);
    let live_playlist_filename = if live_name.is_empty() {
        String::new()
    } else {
        format!("{}{}", live_name, ext)
    };
    if playlist_filename == live_playlist_filename {
        return Err(EgressError::invalid_input(
            "live_playlist_name cannot be identical to playlist_name",
        ));
    }

    if !segment_dir.is_empty() {
        let local_segment_dir = local_root.join(&segment_dir);
        debug!("creating local segment directory {}", local_segment_dir.display());
        std::fs::create_dir_all(&local_segment_dir)?;
    }

    let plan = NamingPlan {
        storage_dir,
        playlist_filename,
        live_playlist_filename,
        segment_prefix: format!("{}{}", segment_dir, segment_base),
        local_dir: local_root.to_path_buf(),
        segment_duration: request.segment_duration(),
        disable_manifest: request.disable_manifest,
    };
    info!(
        "segments: playlist {}, prefix {}",
        plan.playlist_location(),
        plan.segment_prefix
    );
    Ok(plan)
}

/// Resolve the naming plan of the session's segmented output, if any, then
/// create the local working root. A rejected request creates nothing.
pub fn prepare_output(conf: &PipelineConfig, seed: &IdentitySeed) -> Result<Option<NamingPlan>> {
    let plan = match conf.segment_request() {
        Some(request) => Some(resolve_naming(request, seed, &conf.tmp_dir)?),
        None => None,
    };
    std::fs::create_dir_all(&conf.tmp_dir)?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use chrono::TimeZone;

    fn seed() -> IdentitySeed {
        IdentitySeed {
            identifier: "room-1".into(),
            room_name: "room-1".into(),
            room_id: "RM_42".into(),
            egress_id: "EG_7".into(),
            start_time: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
        }
    }

    fn request(prefix: &str, playlist: &str, live: &str) -> SegmentOutputRequest {
        SegmentOutputRequest {
            filename_prefix: prefix.into(),
            playlist_name: playlist.into(),
            live_playlist_name: live.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_substitution() {
        let s = seed();
        assert_eq!(s.substitute("{room_name}/{time}"), "room-1/2024-03-09T140507");
        assert_eq!(s.substitute("{egress_id}-{room_id}"), "EG_7-RM_42");
        assert_eq!(s.substitute("{utc}"), "20240309140507000");
    }

    #[test]
    fn test_defaults_from_identifier() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = resolve_naming(&request("", "", ""), &seed(), tmp.path()).unwrap();
        assert_eq!(plan.storage_dir, "");
        assert_eq!(plan.playlist_filename, "room-1-2024-03-09T140507.m3u8");
        assert_eq!(plan.segment_prefix, "room-1-2024-03-09T140507");
        assert_eq!(plan.live_playlist_filename, "");
        assert_eq!(plan.live_playlist_location(), None);
        assert_eq!(plan.segment_duration, 4);
    }

    #[test]
    fn test_identical_playlists_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_naming(&request("", "show.m3u8", "show.m3u8"), &seed(), tmp.path())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // same base name, different extension still collides
        let err = resolve_naming(&request("", "show.m3u8", "show"), &seed(), tmp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_live_playlist_directory_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_naming(
            &request("", "a/out.m3u8", "b/live.m3u8"),
            &seed(),
            tmp.path(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        // nothing created on rejection
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_segment_subdirectory_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = resolve_naming(&request("segs/clip", "out.m3u8", ""), &seed(), tmp.path()).unwrap();
        assert_eq!(plan.storage_dir, "");
        assert_eq!(plan.playlist_filename, "out.m3u8");
        assert_eq!(plan.segment_prefix, "segs/clip");
        assert!(tmp.path().join("segs").is_dir());
    }

    #[test]
    fn test_segment_dir_collapsed_into_playlist_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = resolve_naming(
            &request("rec/clip", "rec/out.m3u8", "rec/live.m3u8"),
            &seed(),
            tmp.path(),
        )
        .unwrap();
        assert_eq!(plan.storage_dir, "rec/");
        assert_eq!(plan.segment_prefix, "clip");
        assert_eq!(plan.playlist_location(), "rec/out.m3u8");
        assert_eq!(plan.live_playlist_location().as_deref(), Some("rec/live.m3u8"));
        assert!(!tmp.path().join("rec").exists());
    }

    #[test]
    fn test_nested_segment_dir_made_relative() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = resolve_naming(
            &request("rec/parts/clip", "rec/out.m3u8", ""),
            &seed(),
            tmp.path(),
        )
        .unwrap();
        assert_eq!(plan.storage_dir, "rec/");
        assert_eq!(plan.segment_prefix, "parts/clip");
        assert!(tmp.path().join("parts").is_dir());
    }

    #[test]
    fn test_segment_dir_promoted_without_playlist() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = resolve_naming(&request("rec/clip", "", ""), &seed(), tmp.path()).unwrap();
        assert_eq!(plan.storage_dir, "rec/");
        assert_eq!(plan.playlist_filename, "clip.m3u8");
        assert_eq!(plan.segment_prefix, "clip");
    }

    #[test]
    fn test_prefix_defaults_to_playlist() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = resolve_naming(&request("", "/{room_name}.m3u8", "live"), &seed(), tmp.path())
            .unwrap();
        assert_eq!(plan.playlist_filename, "room-1.m3u8");
        assert_eq!(plan.live_playlist_filename, "live.m3u8");
        assert_eq!(plan.segment_prefix, "room-1");
    }

    #[test]
    fn test_parent_components_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_naming(&request("../clip", "out.m3u8", ""), &seed(), tmp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let req = request("segs/{room_name}", "{time}/index.m3u8", "{time}/live.m3u8");
        let a = resolve_naming(&req, &seed(), tmp.path()).unwrap();
        let b = resolve_naming(&req, &seed(), tmp.path()).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn test_local_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = resolve_naming(&request("segs/clip", "out.m3u8", ""), &seed(), tmp.path()).unwrap();
        assert_eq!(plan.local_playlist_path(), tmp.path().join("out.m3u8"));
        assert_eq!(
            plan.local_segment_pattern(),
            tmp.path().join("segs/clip_%05d.ts")
        );
    }

    fn session(tmp_dir: PathBuf, request: SegmentOutputRequest) -> PipelineConfig {
        PipelineConfig {
            tmp_dir,
            outputs: vec![crate::config::OutputConfig::Segments(request)],
            ..Default::default()
        }
    }

    #[test]
    fn test_prepare_output_rejects_before_creating() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("EG_7");
        let conf = session(root.clone(), request("segs/clip", "a/out.m3u8", "b/live.m3u8"));

        let err = prepare_output(&conf, &seed()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!root.exists());
    }

    #[test]
    fn test_prepare_output_creates_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("EG_7");
        let conf = session(root.clone(), request("", "out.m3u8", ""));

        let plan = prepare_output(&conf, &seed()).unwrap().unwrap();
        assert_eq!(plan.local_dir, root);
        assert!(root.is_dir());

        let conf = PipelineConfig {
            tmp_dir: tmp.path().join("EG_8"),
            ..Default::default()
        };
        assert!(prepare_output(&conf, &seed()).unwrap().is_none());
        assert!(tmp.path().join("EG_8").is_dir());
    }
}
