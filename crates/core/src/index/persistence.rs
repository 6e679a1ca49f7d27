//! On-disk index layout.
//!
//! An index saves under a prefix directory as a fixed set of artifacts:
//! `meta.bin` (type tag, metric, shape), `graph.bin` (intra + cross
//! adjacency), `groups.bin` (group table with medoids and entry tables),
//! `lng.bin`, plus the reordered base vectors and labels in the raw
//! load formats (`vectors.bin` / `labels.txt`). Binary artifacts are
//! bincode payloads followed by a 4-byte magic and a big-endian CRC32
//! footer; every file is written to a temp path and renamed so a failed
//! save never leaves a truncated artifact behind.

use crate::config;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::BuildScenario;
use crate::storage::DataType;
use crate::IdxType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Magic bytes separating a bincode payload from its CRC32 footer.
const ARTIFACT_MAGIC: &[u8; 4] = b"UNG1";

pub const META_FILE: &str = "meta.bin";
pub const GRAPH_FILE: &str = "graph.bin";
pub const GROUPS_FILE: &str = "groups.bin";
pub const LNG_FILE: &str = "lng.bin";
pub const IDMAP_FILE: &str = "idmap.bin";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const LABELS_FILE: &str = "labels.txt";

/// Index-wide facts recorded alongside the graph artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub data_type: DataType,
    pub metric: DistanceMetric,
    pub num_points: IdxType,
    pub dim: IdxType,
    pub max_degree: u32,
    pub num_cross_edges: u32,
    pub build_scenario: BuildScenario,
}

/// Serializes one artifact: `[bincode][magic][CRC32 BE]`, atomically.
pub fn write_artifact<S: Serialize>(dir: &Path, name: &str, value: &S) -> Result<()> {
    let payload =
        bincode::serialize(value).map_err(|e| Error::Internal(format!("serialize {name}: {e}")))?;
    let crc = crc32fast::hash(&payload);

    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&payload);
    out.extend_from_slice(ARTIFACT_MAGIC);
    out.extend_from_slice(&crc.to_be_bytes());

    let tmp_path = dir.join(format!("{name}.tmp"));
    let path = dir.join(name);
    std::fs::write(&tmp_path, &out)?;
    std::fs::rename(&tmp_path, &path)?;
    tracing::debug!(
        "wrote artifact {} ({} bytes, CRC32={crc:#010x})",
        path.display(),
        payload.len()
    );
    Ok(())
}

/// Reads one artifact written by [`write_artifact`], verifying the CRC.
pub fn read_artifact<D: DeserializeOwned>(dir: &Path, name: &str) -> Result<D> {
    let path = dir.join(name);
    let raw = std::fs::read(&path)?;
    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != ARTIFACT_MAGIC {
        return Err(Error::Format(format!(
            "artifact {} is missing its integrity footer",
            path.display()
        )));
    }
    let payload = &raw[..raw.len() - 8];
    let stored_crc = u32::from_be_bytes([
        raw[raw.len() - 4],
        raw[raw.len() - 3],
        raw[raw.len() - 2],
        raw[raw.len() - 1],
    ]);
    let computed_crc = crc32fast::hash(payload);
    if stored_crc != computed_crc {
        return Err(Error::Format(format!(
            "artifact {} CRC32 mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}",
            path.display()
        )));
    }
    bincode::deserialize(payload)
        .map_err(|e| Error::Format(format!("artifact {}: {e}", path.display())))
}

/// Reads just the meta artifact of a saved index (used by the façade to
/// pick the element type before loading the rest).
pub fn read_meta(prefix: &Path) -> Result<IndexMeta> {
    let meta: IndexMeta = read_artifact(prefix, META_FILE)?;
    if meta.format_version != config::FORMAT_VERSION {
        return Err(Error::Config(format!(
            "index format version {} unsupported (expected {})",
            meta.format_version,
            config::FORMAT_VERSION
        )));
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> IndexMeta {
        IndexMeta {
            format_version: config::FORMAT_VERSION,
            data_type: DataType::Float32,
            metric: DistanceMetric::L2,
            num_points: 42,
            dim: 8,
            max_degree: 16,
            num_cross_edges: 4,
            build_scenario: BuildScenario::General,
        }
    }

    #[test]
    fn test_artifact_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let meta = sample_meta();
        write_artifact(dir.path(), META_FILE, &meta).unwrap();
        let loaded = read_meta(dir.path()).unwrap();
        assert_eq!(loaded, meta);
        // No temp file left behind.
        assert!(!dir.path().join(format!("{META_FILE}.tmp")).exists());
    }

    #[test]
    fn test_corrupted_artifact_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), META_FILE, &sample_meta()).unwrap();

        let path = dir.path().join(META_FILE);
        let mut raw = std::fs::read(&path).unwrap();
        raw[2] ^= 0xFF;
        std::fs::write(&path, &raw).unwrap();

        let err = read_meta(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_truncated_artifact_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(META_FILE), [1, 2, 3]).unwrap();
        let err = read_meta(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_missing_artifact_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_meta(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_version_mismatch_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let meta = IndexMeta {
            format_version: config::FORMAT_VERSION + 1,
            ..sample_meta()
        };
        write_artifact(dir.path(), META_FILE, &meta).unwrap();
        let err = read_meta(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
