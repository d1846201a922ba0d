//! Shared repository utilities.
//!
//! File-system helpers used by the sample, review and morphology repositories:
//!
//! - **Directory allocation**: `create_uuid_and_shard_dir` reserves a unique sharded record
//!   directory for a new sample
//! - **Traversal**: `record_dirs` walks the `<s1>/<s2>/<uuid>` layout
//! - **Record files**: YAML/JSON readers and writers mapping I/O failures onto [`LabError`]
//! - **Exclusive create**: `create_new_file` writes a file only if it does not already exist,
//!   which is the compare-and-swap behind finalize-once

use crate::{LabError, LabResult};
use lab_uuid::LabUuid;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::{
    fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

/// Creates a unique sharded directory within the base records directory.
///
/// Generates UUIDs using the provided source function and attempts to create the
/// corresponding sharded directory, retrying up to 5 times with different UUIDs.
///
/// # Errors
///
/// Returns `LabError::StorageDirCreation` if:
/// - directory creation fails after 5 attempts,
/// - parent directory creation fails.
pub(crate) fn create_uuid_and_shard_dir(
    base_dir: &Path,
    mut uuid_source: impl FnMut() -> LabUuid,
) -> LabResult<(LabUuid, PathBuf)> {
    for _attempt in 0..5 {
        let uuid = uuid_source();
        let candidate = uuid.sharded_dir(base_dir);

        if candidate.exists() {
            continue;
        }

        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(LabError::StorageDirCreation)?;
        }

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok((uuid, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(LabError::StorageDirCreation(e)),
        }
    }

    Err(LabError::StorageDirCreation(io::Error::new(
        ErrorKind::AlreadyExists,
        "failed to allocate a unique sample directory after 5 attempts",
    )))
}

/// Lists every `<base>/<s1>/<s2>/<uuid>` directory whose name is a canonical UUID.
///
/// A missing base directory yields an empty list. Unreadable shard directories are skipped.
pub(crate) fn record_dirs(base_dir: &Path) -> Vec<(LabUuid, PathBuf)> {
    let mut dirs = Vec::new();

    let s1_iter = match fs::read_dir(base_dir) {
        Ok(it) => it,
        Err(_) => return dirs,
    };
    for s1 in s1_iter.flatten() {
        let s1_path = s1.path();
        if !s1_path.is_dir() {
            continue;
        }

        let s2_iter = match fs::read_dir(&s1_path) {
            Ok(it) => it,
            Err(_) => continue,
        };
        for s2 in s2_iter.flatten() {
            let s2_path = s2.path();
            if !s2_path.is_dir() {
                continue;
            }

            let id_iter = match fs::read_dir(&s2_path) {
                Ok(it) => it,
                Err(_) => continue,
            };
            for id_ent in id_iter.flatten() {
                let id_path = id_ent.path();
                if !id_path.is_dir() {
                    continue;
                }
                let Some(name) = id_path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Ok(uuid) = LabUuid::parse(name) {
                    dirs.push((uuid, id_path));
                }
            }
        }
    }

    dirs
}

pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> LabResult<T> {
    let contents = fs::read_to_string(path).map_err(LabError::FileRead)?;
    serde_yaml::from_str(&contents).map_err(LabError::YamlDeserialization)
}

pub(crate) fn write_yaml<T: Serialize>(path: &Path, value: &T) -> LabResult<()> {
    let yaml = serde_yaml::to_string(value).map_err(LabError::YamlSerialization)?;
    fs::write(path, yaml).map_err(LabError::FileWrite)
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> LabResult<T> {
    let contents = fs::read_to_string(path).map_err(LabError::FileRead)?;
    serde_json::from_str(&contents).map_err(LabError::Deserialization)
}

/// Writes `contents` to `path` only if the file does not exist yet.
///
/// Returns `Ok(false)` without touching the file when it already exists.
///
/// # Errors
///
/// Returns `LabError::FileWrite` for any other I/O failure.
pub(crate) fn create_new_file(path: &Path, contents: &[u8]) -> LabResult<bool> {
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(LabError::FileWrite(e)),
    };

    file.write_all(contents).map_err(LabError::FileWrite)?;
    file.sync_all().map_err(LabError::FileWrite)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_uuid_and_shard_dir_creates_sharded_layout() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path().join("samples");

        let (uuid, dir) = create_uuid_and_shard_dir(&base, LabUuid::new).unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir, uuid.sharded_dir(&base));
    }

    #[test]
    fn test_create_uuid_and_shard_dir_retries_on_collision() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let taken = LabUuid::new();
        fs::create_dir_all(taken.sharded_dir(base)).unwrap();
        let fresh = LabUuid::new();

        let mut sequence = vec![fresh, taken].into_iter().rev();
        let (uuid, _) =
            create_uuid_and_shard_dir(base, || sequence.next().unwrap_or_else(LabUuid::new))
                .unwrap();
        assert_eq!(uuid, fresh);
    }

    #[test]
    fn test_create_uuid_and_shard_dir_gives_up_after_five_attempts() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let taken = LabUuid::new();
        fs::create_dir_all(taken.sharded_dir(base)).unwrap();

        let err = create_uuid_and_shard_dir(base, || taken).unwrap_err();
        assert!(matches!(err, LabError::StorageDirCreation(_)));
    }

    #[test]
    fn test_record_dirs_skips_non_uuid_entries() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let (uuid, _) = create_uuid_and_shard_dir(base, LabUuid::new).unwrap();
        fs::create_dir_all(base.join("ab").join("cd").join("not-a-uuid")).unwrap();
        fs::write(base.join("stray.txt"), "x").unwrap();

        let dirs = record_dirs(base);
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].0, uuid);
    }

    #[test]
    fn test_record_dirs_missing_base_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        assert!(record_dirs(&temp_dir.path().join("absent")).is_empty());
    }

    #[test]
    fn test_create_new_file_refuses_to_overwrite() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("DIFFERENTIAL.json");

        assert!(create_new_file(&path, b"first").unwrap());
        assert!(!create_new_file(&path, b"second").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");
    }
}
