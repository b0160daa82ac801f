//! Database snapshots on disk.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::Database;

/// Errors that can occur while saving or loading a snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Snapshot file does not exist.
    #[error("Snapshot not found: {0}")]
    NotFound(PathBuf),

    /// Snapshot file could not be read or written.
    #[error("Failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Snapshot content is not a valid database.
    #[error("Corrupt database in snapshot {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Database could not be serialized.
    #[error("Failed to serialize database to {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Database {
    /// Save the database as pretty-printed JSON, replacing `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let io_err = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| {
            SnapshotError::Serialize {
                path: path.to_path_buf(),
                source,
            }
        })?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;

        info!(path = %path.display(), records = self.len(), "Saved database snapshot");
        Ok(())
    }

    /// Load a database saved with [`Database::save`].
    ///
    /// # Errors
    /// Returns [`SnapshotError::NotFound`] if the file does not exist and
    /// [`SnapshotError::Corrupt`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SnapshotError::NotFound(path.to_path_buf()),
            _ => SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let database: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                SnapshotError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

        info!(path = %path.display(), records = database.len(), "Loaded database snapshot");
        Ok(database)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::{Gpu, Instance, Latency, Prices, Region};

    fn database() -> Database {
        let region = Region::new("ap-northeast-1", "aws", "ec2.ap-northeast-1.amazonaws.com");
        region
            .set_latency(Latency {
                min: 140,
                avg: 151,
                max: 170,
            })
            .unwrap();
        let region = Arc::new(region);

        let instance = |name: &str, fp32: Option<f64>| {
            Arc::new(Instance {
                name: name.to_string(),
                vendor: "AMD".to_string(),
                arch: "x86_64".to_string(),
                clock_speed: 3.3,
                vcpus: 16,
                memory: 65_536,
                network: 25.0,
                region: Arc::clone(&region),
                gpu: Gpu {
                    vendor: "NVIDIA".to_string(),
                    name: "A10G".to_string(),
                    count: 1,
                    memory: 24_576,
                    fp32,
                },
            })
        };

        Database::new(vec![
            Arc::new(Prices {
                instance: instance("g5.4xlarge", Some(31.52)),
                avg: 0.61,
                min: 0.55,
                max: 0.72,
                availability_zones: 3,
            }),
            Arc::new(Prices {
                instance: instance("g5.8xlarge", None),
                avg: 1.02,
                min: 0.98,
                max: 1.10,
                availability_zones: 2,
            }),
        ])
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        let original = database();

        original.save(&path).unwrap();
        let loaded = Database::load(&path).unwrap();

        assert_eq!(loaded, original);
        assert_eq!(loaded.records()[0].instance.region.latency().avg, 151);
        assert_eq!(loaded.records()[1].instance.gpu.fp32, None);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");

        database().save(&path).unwrap();
        Database::default().save(&path).unwrap();

        assert!(Database::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_is_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        database().save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[\n"));
        assert!(content.contains("\"availability_zones\": 3"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Database::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound(_)));
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        std::fs::write(&path, "{ not a database").unwrap();

        let err = Database::load(&path).unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupt { .. }));
    }
}
