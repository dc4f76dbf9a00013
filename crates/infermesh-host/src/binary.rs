//! Inference binary resolution.

use crate::error::{HostError, Result};
use std::path::{Path, PathBuf};

pub const BINARY_NAME: &str = "infermesh-node";

/// Fallback locations checked after PATH, in order.
fn fallback_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/opt/infermesh/bin"),
        PathBuf::from("/usr/bin"),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        dirs.insert(0, PathBuf::from(home).join(".infermesh/bin"));
    }
    dirs
}

/// Resolve the inference binary: explicit path first, then PATH, then
/// the canonical fallback list.
pub fn resolve_binary(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(HostError::Config(format!("binary_path {} does not exist", path.display())));
    }

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(BINARY_NAME);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    for dir in fallback_dirs() {
        let candidate = dir.join(BINARY_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(HostError::BinaryNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_must_exist() {
        let missing = Path::new("/definitely/not/here/infermesh-node");
        assert!(matches!(resolve_binary(Some(missing)), Err(HostError::Config(_))));
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BINARY_NAME);
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        assert_eq!(resolve_binary(Some(&path)).unwrap(), path);
    }
}
