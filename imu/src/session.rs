//! Persisting a session as `<root>/<name>/{data.npz, session.json}`.
//!
//! The target directory is checked before sampling starts and written in one
//! step afterwards: both files go into a hidden temporary sibling that is then
//! renamed into place, so an interrupted write never leaves a partial
//! experiment behind.

use crate::config::AcquisitionConfig;
use crate::error::SessionError;
use crate::record::{RunStats, SessionRecord, Termination};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_npy::{NpzReader, NpzWriter};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

pub const DATA_FILE: &str = "data.npz";
pub const MANIFEST_FILE: &str = "session.json";
pub const TIMESTAMPS_KEY: &str = "timestamps";

const CAPTURE_NOTE: &str = "channels of one sample are read sequentially within one cycle; \
     their skew is bounded by the summed read latency of the sources";

/// `experiment_<local date>_<local time>`, used when no name is given.
pub fn default_experiment_name() -> String {
    chrono::Local::now()
        .format("experiment_%Y-%m-%d_%H-%M-%S")
        .to_string()
}

/// Everything about a run that is not array data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub name: String,
    /// RFC 3339, local time.
    pub created_at: String,
    pub samples: usize,
    pub channels: Vec<String>,
    pub config: AcquisitionConfig,
    pub termination: Termination,
    pub stats: RunStats,
    pub capture_note: String,
}

/// A directory name that was free when the session was set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    name: String,
    path: PathBuf,
}

impl SessionTarget {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct SessionWriter {
    root: PathBuf,
}

impl SessionWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Checks that `<root>/<name>` can be created. Creates nothing, so a run
    /// that fails to start leaves the filesystem as it was.
    pub fn reserve(&self, name: &str) -> Result<SessionTarget, SessionError> {
        validate_name(name)?;
        let path = self.root.join(name);
        if path.exists() {
            return Err(SessionError::AlreadyExists(path));
        }
        Ok(SessionTarget {
            name: name.to_string(),
            path,
        })
    }

    /// Writes the record and its manifest, then moves them into the target
    /// directory in one rename.
    #[instrument(skip_all, fields(name = target.name(), samples = record.len()))]
    pub fn write(
        &self,
        target: &SessionTarget,
        record: &SessionRecord,
        config: &AcquisitionConfig,
    ) -> Result<PathBuf, SessionError> {
        fs::create_dir_all(&self.root).map_err(|e| SessionError::io(&self.root, e))?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-", target.name))
            .tempdir_in(&self.root)
            .map_err(|e| SessionError::io(&self.root, e))?;
        debug!(staging = %staging.path().display(), "Writing session");

        write_arrays(&staging.path().join(DATA_FILE), record)?;

        let manifest = SessionManifest {
            name: target.name.clone(),
            created_at: chrono::Local::now().to_rfc3339(),
            samples: record.len(),
            channels: record.channel_names().into_iter().map(String::from).collect(),
            config: *config,
            termination: record.termination(),
            stats: *record.stats(),
            capture_note: CAPTURE_NOTE.to_string(),
        };
        let manifest_path = staging.path().join(MANIFEST_FILE);
        let file = File::create(&manifest_path).map_err(|e| SessionError::io(&manifest_path, e))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &manifest)?;
        out.flush().map_err(|e| SessionError::io(&manifest_path, e))?;

        // rename(2) would silently replace an empty directory created since reserve().
        if target.path.exists() {
            return Err(SessionError::AlreadyExists(target.path.clone()));
        }
        // From here the staging directory either becomes the target or is
        // removed by hand; the guard must not delete it after the rename.
        let staging = staging.keep();
        if let Err(e) = fs::rename(&staging, &target.path) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(staging = %staging.display(), error = %cleanup, "Failed to remove staging directory");
            }
            return Err(SessionError::io(&target.path, e));
        }

        info!(path = %target.path.display(), "Saved session");
        Ok(target.path.clone())
    }
}

fn validate_name(name: &str) -> Result<(), SessionError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(SessionError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn write_arrays(path: &Path, record: &SessionRecord) -> Result<(), SessionError> {
    let file = File::create(path).map_err(|e| SessionError::io(path, e))?;
    let mut npz = NpzWriter::new(BufWriter::new(file));
    npz.add_array(TIMESTAMPS_KEY, &ArrayView1::<f64>::from(record.timestamps()))?;
    for column in record.channels() {
        let view = ArrayView2::from_shape((column.len(), 3), column.as_flat()).map_err(|_| {
            SessionError::Shape {
                name: column.name().to_string(),
                expected: record.len(),
                found: column.len(),
            }
        })?;
        npz.add_array(column.name(), &view)?;
    }
    let mut writer = npz.finish()?;
    writer.flush().map_err(|e| SessionError::io(path, e))?;
    Ok(())
}

/// A session loaded back from disk.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub path: PathBuf,
    pub record: SessionRecord,
    /// Absent for artifacts produced by tools that only wrote `data.npz`.
    pub manifest: Option<SessionManifest>,
}

/// Loads `data.npz` (and `session.json` when present) from an experiment
/// directory. Channels come back in recording order when the manifest is
/// available, archive order otherwise.
pub fn load_session(dir: &Path) -> Result<StoredSession, SessionError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = if manifest_path.exists() {
        let file = File::open(&manifest_path).map_err(|e| SessionError::io(&manifest_path, e))?;
        Some(serde_json::from_reader::<_, SessionManifest>(BufReader::new(file))?)
    } else {
        None
    };

    let data_path = dir.join(DATA_FILE);
    let file = File::open(&data_path).map_err(|e| SessionError::io(&data_path, e))?;
    let mut npz = NpzReader::new(BufReader::new(file))?;

    let mut timestamps = None;
    let mut channels = Vec::new();
    for entry in npz.names()? {
        let key = entry.strip_suffix(".npy").unwrap_or(&entry).to_string();
        if key == TIMESTAMPS_KEY {
            let array: Array1<f64> = npz.by_name(&entry)?;
            timestamps = Some(array.to_vec());
            continue;
        }
        let array: Array2<f32> = npz.by_name(&entry)?;
        if array.ncols() != 3 {
            return Err(SessionError::Columns {
                name: key,
                columns: array.ncols(),
            });
        }
        channels.push((key, array.iter().copied().collect::<Vec<f32>>()));
    }
    let timestamps = timestamps.ok_or_else(|| SessionError::MissingTimestamps(data_path.clone()))?;

    if let Some(manifest) = &manifest {
        channels.sort_by_key(|(name, _)| {
            manifest
                .channels
                .iter()
                .position(|c| c == name)
                .unwrap_or(usize::MAX)
        });
    }
    let mut record = SessionRecord::from_columns(timestamps, channels)?;
    if let Some(manifest) = &manifest {
        record = record.with_outcome(manifest.termination, manifest.stats);
    }

    Ok(StoredSession {
        path: dir.to_path_buf(),
        record,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record() -> SessionRecord {
        SessionRecord::from_columns(
            vec![0.0, 0.001, 0.002],
            vec![
                ("external_accel".to_string(), vec![0.0, 0.0, 9.8, 0.1, 0.0, 9.8, 0.2, 0.0, 9.8]),
                ("internal_mag".to_string(), vec![30.0, 0.0, -12.0, 30.0, 0.5, -12.0, 30.0, 1.0, -12.0]),
            ],
        )
        .unwrap()
        .with_outcome(Termination::CapacityExhausted, RunStats::default())
    }

    #[test]
    fn names_that_escape_the_root_are_rejected() {
        let dir = tempdir().unwrap();
        let writer = SessionWriter::new(dir.path());
        for name in ["", "..", ".hidden", "a/b", "a\\b"] {
            assert!(matches!(writer.reserve(name), Err(SessionError::InvalidName(_))), "{name:?}");
        }
        assert!(writer.reserve("run_01").is_ok());
    }

    #[test]
    fn reserve_refuses_existing_directory_and_creates_nothing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("experiments");
        let writer = SessionWriter::new(&root);

        let target = writer.reserve("first").unwrap();
        assert!(!root.exists());
        assert_eq!(target.path(), root.join("first"));

        fs::create_dir_all(root.join("taken")).unwrap();
        assert!(matches!(writer.reserve("taken"), Err(SessionError::AlreadyExists(_))));
    }

    #[test]
    fn written_session_reads_back() {
        let dir = tempdir().unwrap();
        let writer = SessionWriter::new(dir.path());
        let target = writer.reserve("bench").unwrap();
        let config = AcquisitionConfig::new(1000.0, 0.003).unwrap();
        let record = sample_record();

        let path = writer.write(&target, &record, &config).unwrap();
        let stored = load_session(&path).unwrap();

        assert_eq!(stored.record.timestamps(), record.timestamps());
        assert_eq!(stored.record.channel_names(), vec!["external_accel", "internal_mag"]);
        assert_eq!(stored.record.channels(), record.channels());
        assert_eq!(stored.record.termination(), Termination::CapacityExhausted);

        let manifest = stored.manifest.unwrap();
        assert_eq!(manifest.samples, 3);
        assert_eq!(manifest.config, config);
    }

    #[test]
    fn successful_write_leaves_only_the_experiment() {
        let dir = tempdir().unwrap();
        let writer = SessionWriter::new(dir.path());
        let target = writer.reserve("clean").unwrap();
        let config = AcquisitionConfig::new(1000.0, 0.003).unwrap();

        let path = writer.write(&target, &sample_record(), &config).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("clean")]);
        let mut files: Vec<_> = fs::read_dir(&path).unwrap().map(|e| e.unwrap().file_name()).collect();
        files.sort();
        assert_eq!(files, vec![std::ffi::OsString::from(DATA_FILE), MANIFEST_FILE.into()]);
    }

    #[test]
    fn late_collision_leaves_no_staging_directory() {
        let dir = tempdir().unwrap();
        let writer = SessionWriter::new(dir.path());
        let target = writer.reserve("race").unwrap();
        fs::create_dir(target.path()).unwrap();

        let config = AcquisitionConfig::new(1000.0, 0.003).unwrap();
        let err = writer.write(&target, &sample_record(), &config).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists(_)));

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("race")]);
        assert_eq!(fs::read_dir(target.path()).unwrap().count(), 0);
    }
}
