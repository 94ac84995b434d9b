//! Loading of the pre-built probe object.
//!
//! The object ships alongside the agent binary; a one-level-up fallback
//! covers layouts where the binary sits in a `bin/` subdirectory.

use std::path::PathBuf;

use aya::Ebpf;

use crate::config::PROBE_OBJECT_NAME;
use crate::tracer::errors::TracerError;

/// Load the probe object from next to the binary, falling back one level up.
/// A missing object is fatal: without it there is nothing to attach.
pub fn load_probe_object() -> Result<Ebpf, TracerError> {
    let primary = object_path_near_exe();
    load_from(&primary).or_else(|first_err| {
        let fallback = primary
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.join(PROBE_OBJECT_NAME));

        match fallback {
            Some(path) => load_from(&path).map_err(|_| first_err),
            None => Err(first_err),
        }
    })
}

/// Load a probe object from an explicit path.
pub fn load_probe_object_from(path: &std::path::Path) -> Result<Ebpf, TracerError> {
    load_from(&path.to_path_buf())
}

fn load_from(path: &PathBuf) -> Result<Ebpf, TracerError> {
    Ebpf::load_file(path).map_err(|e| TracerError::LoadFailed {
        path: path.to_string_lossy().into_owned(),
        source: e.into(),
    })
}

fn object_path_near_exe() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(PROBE_OBJECT_NAME)))
        .unwrap_or_else(|| PathBuf::from(PROBE_OBJECT_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_object_is_load_error() {
        let err = load_probe_object_from(std::path::Path::new("/nonexistent/podscope.bpf.o"))
            .err()
            .expect("missing object must fail");
        assert!(matches!(err, TracerError::LoadFailed { .. }));
    }

    #[test]
    fn test_object_path_is_exe_adjacent() {
        let path = object_path_near_exe();
        assert!(path.to_string_lossy().ends_with(PROBE_OBJECT_NAME));
    }
}
