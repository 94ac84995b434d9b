//! Container reference parsing and cgroup path resolution.
//!
//! A pod's container is identified by a runtime-prefixed reference such as
//! `containerd://<64-hex>`; the agent maps it to the cgroup directory that
//! scopes the container's processes.

pub mod filter;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Length of a full container id in hex characters.
const CONTAINER_ID_LEN: usize = 40;

/// Length of the abbreviated id used by some runtimes in cgroup names.
const CONTAINER_ID_SHORT_LEN: usize = 12;

/// Search roots under the cgroup base, most specific first. Matching a
/// host-system scope when a pod scope also exists would mis-target
/// ingestion, so the order is semantic.
const SEARCH_SLICES: &[&str] = &["kubepods.slice", "system.slice", "user.slice"];

/// Resolution failures, matchable by variant rather than message text.
#[derive(Debug, Error)]
pub enum CgroupError {
    #[error("invalid container ID format: {reference:?}")]
    InvalidFormat { reference: String },

    #[error("invalid container ID: {id:?}")]
    InvalidId { id: String },

    #[error("cgroup path not found for container {id}")]
    NotFound { id: String },
}

/// A parsed `<runtime>://<hex-id>` container reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    /// Runtime scheme: containerd, docker, cri-o, ...
    pub runtime: String,
    /// Full lowercase hex id.
    pub id: String,
}

impl ContainerRef {
    /// Parse and validate a container reference.
    ///
    /// A missing `://` separator is a format error; a present separator with
    /// an absent, short, or non-hex id is an id error.
    pub fn parse(reference: &str) -> Result<Self, CgroupError> {
        let (runtime, id) = reference
            .split_once("://")
            .ok_or_else(|| CgroupError::InvalidFormat {
                reference: reference.to_string(),
            })?;

        if id.len() != CONTAINER_ID_LEN
            || !id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(CgroupError::InvalidId { id: id.to_string() });
        }

        Ok(Self {
            runtime: runtime.to_string(),
            id: id.to_string(),
        })
    }

    /// Abbreviated id as it appears in some cgroup directory names.
    pub fn short_id(&self) -> &str {
        &self.id[..CONTAINER_ID_SHORT_LEN]
    }
}

/// Locate the cgroup directory for a container id under `base`.
///
/// Walks `kubepods.slice`, then `system.slice`, then `user.slice`, then the
/// base itself, returning the first directory whose basename contains the
/// full id or, failing that within the same root, its 12-character prefix.
pub fn find_cgroup_path(base: &Path, container_id: &str) -> Result<String, CgroupError> {
    let short_id = if container_id.len() >= CONTAINER_ID_SHORT_LEN {
        &container_id[..CONTAINER_ID_SHORT_LEN]
    } else {
        container_id
    };

    let mut roots: Vec<PathBuf> = SEARCH_SLICES.iter().map(|s| base.join(s)).collect();
    roots.push(base.to_path_buf());

    for root in &roots {
        if !root.is_dir() {
            continue;
        }
        if let Some(found) = walk_for_id(root, container_id, short_id) {
            return Ok(found.to_string_lossy().into_owned());
        }
    }

    Err(CgroupError::NotFound {
        id: container_id.to_string(),
    })
}

/// Depth-first search for a directory basename containing the id.
/// Unreadable directories are skipped; the walk is best-effort.
fn walk_for_id(dir: &Path, full_id: &str, short_id: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.contains(full_id) || (!short_id.is_empty() && name.contains(short_id)) {
            return Some(path);
        }

        if let Some(found) = walk_for_id(&path, full_id, short_id) {
            return Some(found);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_id() -> String {
        "abcdef1234567890abcdef1234567890abcdef12".to_string()
    }

    #[test]
    fn test_parse_valid_reference() {
        let id = valid_id();
        let parsed = ContainerRef::parse(&format!("containerd://{id}")).expect("parse");
        assert_eq!(parsed.runtime, "containerd");
        assert_eq!(parsed.id, id);
        assert_eq!(parsed.short_id(), "abcdef123456");
    }

    #[test]
    fn test_parse_other_runtimes() {
        let id = valid_id();
        assert!(ContainerRef::parse(&format!("docker://{id}")).is_ok());
        assert!(ContainerRef::parse(&format!("cri-o://{id}")).is_ok());
    }

    #[test]
    fn test_parse_missing_separator_is_format_error() {
        for reference in ["", "no-separator-here", "invalid-format"] {
            match ContainerRef::parse(reference) {
                Err(CgroupError::InvalidFormat { .. }) => {}
                other => panic!("expected InvalidFormat for {reference:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_bad_id_is_id_error() {
        for reference in [
            "containerd://",
            "containerd://invalid",
            "containerd://abc123",
            // Uppercase hex is rejected.
            "containerd://ABCDEF1234567890ABCDEF1234567890ABCDEF12",
        ] {
            match ContainerRef::parse(reference) {
                Err(CgroupError::InvalidId { .. }) => {}
                other => panic!("expected InvalidId for {reference:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_error_messages() {
        let err = ContainerRef::parse("oops").unwrap_err();
        assert!(err.to_string().contains("invalid container ID format"));

        let err = ContainerRef::parse("containerd://oops").unwrap_err();
        assert!(err.to_string().starts_with("invalid container ID"));
        assert!(!err.to_string().contains("format"));
    }

    #[test]
    fn test_find_cgroup_path_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = find_cgroup_path(dir.path(), "nonexistent").unwrap_err();
        assert!(matches!(err, CgroupError::NotFound { .. }));
        assert!(err.to_string().contains("cgroup path not found"));
    }

    #[test]
    fn test_find_cgroup_path_full_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = valid_id();
        let target = dir.path().join("kubepods.slice").join(format!("pod_{id}"));
        std::fs::create_dir_all(&target).expect("mkdir");

        let found = find_cgroup_path(dir.path(), &id).expect("find");
        assert_eq!(found, target.to_string_lossy());
    }

    #[test]
    fn test_find_cgroup_path_short_id_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = valid_id();
        let target = dir
            .path()
            .join("kubepods.slice")
            .join(format!("pod_{}", &id[..12]));
        std::fs::create_dir_all(&target).expect("mkdir");

        let found = find_cgroup_path(dir.path(), &id).expect("find");
        assert_eq!(found, target.to_string_lossy());
    }

    #[test]
    fn test_find_cgroup_path_system_slice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = valid_id();
        let target = dir
            .path()
            .join("system.slice")
            .join(format!("docker-{id}.scope"));
        std::fs::create_dir_all(&target).expect("mkdir");

        let found = find_cgroup_path(dir.path(), &id).expect("find");
        assert_eq!(found, target.to_string_lossy());
    }

    #[test]
    fn test_find_cgroup_path_nested_user_slice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = valid_id();
        let target = dir
            .path()
            .join("user.slice")
            .join("user-1000.slice")
            .join(format!("docker-{id}.scope"));
        std::fs::create_dir_all(&target).expect("mkdir");

        let found = find_cgroup_path(dir.path(), &id).expect("find");
        assert_eq!(found, target.to_string_lossy());
    }

    #[test]
    fn test_find_cgroup_path_prefers_kubepods_over_system() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = valid_id();
        let pod = dir.path().join("kubepods.slice").join(format!("pod_{id}"));
        let sys = dir
            .path()
            .join("system.slice")
            .join(format!("docker-{id}.scope"));
        std::fs::create_dir_all(&pod).expect("mkdir");
        std::fs::create_dir_all(&sys).expect("mkdir");

        let found = find_cgroup_path(dir.path(), &id).expect("find");
        assert_eq!(found, pod.to_string_lossy());
    }
}
