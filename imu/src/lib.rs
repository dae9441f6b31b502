//! Drift-free fixed-rate acquisition from several IMUs into one columnar
//! session.
//!
//! A run samples every [`SensorSource`] once per cycle on an arithmetic
//! schedule, stores the results in a preallocated [`SampleBuffer`] and hands
//! back a [`SessionRecord`] holding only the samples actually collected.
//! [`SessionWriter`] persists that record as `data.npz` plus a JSON manifest.

pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod fusion;
pub mod record;
pub mod scheduler;
pub mod session;
pub mod simulate;

#[cfg(target_os = "linux")]
pub mod rig;

pub use buffer::{CapacityExceeded, ChannelLayout, SampleBuffer};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{AcquisitionConfig, RigConfig};
pub use error::{AcquisitionError, ConfigError, SessionError};
pub use fusion::FusionInput;
pub use record::{ChannelColumn, RunStats, SessionRecord, SkipCounts, Termination};
pub use scheduler::{AcquisitionScheduler, StopSignal};
pub use session::{load_session, SessionManifest, SessionTarget, SessionWriter, StoredSession};
pub use simulate::SimulatedImu;

pub use imu_traits::{
    ChannelKind, ChannelReadings, ImuError, SensorError, SensorErrorKind, SensorSource, Vector3,
};

#[cfg(target_os = "linux")]
pub use rig::Rig;
