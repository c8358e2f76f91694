//! JSON state-snapshot persistence for the reclaimer binary.
//!
//! The snapshot is a map of collection name to records. Writes go through a
//! temp file and rename so a crashed pass never leaves a torn state file.

use fs_err as fs;
use std::collections::BTreeMap;
use std::path::Path;

use veridoc_records::Record;

pub type Snapshot = BTreeMap<String, Vec<Record>>;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode state file {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub fn load(path: &Path) -> Result<Snapshot, SnapshotError> {
    let data = fs::read(path).map_err(|source| SnapshotError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| SnapshotError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let write_err = |source| SnapshotError::Write {
        path: path.display().to_string(),
        source,
    };
    let payload = serde_json::to_vec_pretty(snapshot).map_err(|source| SnapshotError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}
