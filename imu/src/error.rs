use imu_traits::ImuError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid acquisition parameters or rig configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target rate must be a positive number of Hz, got {0}")]
    InvalidRate(f64),

    #[error("duration must be a positive number of seconds, got {0}")]
    InvalidDuration(f64),

    #[error("safety factor must be at least 1.0, got {0}")]
    InvalidSafetyFactor(f64),

    #[error("sample capacity must be at least 1")]
    ZeroCapacity,

    #[error("sample capacity of {requested} exceeds the limit of {limit} samples")]
    CapacityTooLarge { requested: f64, limit: usize },

    #[error("read timeout must be non-zero")]
    ZeroTimeout,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Failures that prevent a run from starting. Nothing is sampled when one of
/// these is returned.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("no sensor sources configured")]
    NoSources,

    #[error("source '{0}' declares no channels")]
    EmptySource(String),

    #[error("duplicate channel name '{0}'")]
    DuplicateChannel(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("sensor '{name}' failed to initialize: {source}")]
    SensorInit {
        name: String,
        #[source]
        source: ImuError,
    },
}

impl AcquisitionError {
    pub fn sensor_init(name: impl Into<String>, source: ImuError) -> Self {
        Self::SensorInit {
            name: name.into(),
            source,
        }
    }
}

/// Errors creating, writing or loading a persisted session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("experiment directory {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("invalid experiment name '{0}'")]
    InvalidName(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write arrays: {0}")]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),

    #[error("failed to read arrays: {0}")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),

    #[error("session manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("{0} holds no timestamps array")]
    MissingTimestamps(PathBuf),

    #[error("array '{name}' has {columns} columns, expected 3")]
    Columns { name: String, columns: usize },

    #[error("array '{name}' has {found} rows, expected {expected}")]
    Shape {
        name: String,
        expected: usize,
        found: usize,
    },
}

impl SessionError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
