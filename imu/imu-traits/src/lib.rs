use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

// --- Basic Types ---
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Vector3 { x, y, z }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f32; 3]> for Vector3 {
    fn from(v: [f32; 3]) -> Self {
        Vector3::new(v[0], v[1], v[2])
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector3(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

/// One vector-valued channel a sensor can report.
///
/// The string form is the suffix used in persisted channel names
/// (`external_accel`, `internal_mag`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Acceleration including gravity (m/s²)
    #[strum(serialize = "accel")]
    Accelerometer,
    /// Angular velocity (deg/s)
    #[strum(serialize = "gyro")]
    Gyroscope,
    /// Magnetic field vector (micro Tesla, µT)
    #[strum(serialize = "mag")]
    Magnetometer,
}

impl ChannelKind {
    /// Full channel name for a source, e.g. `external` + `Gyroscope` -> `external_gyro`.
    pub fn channel_name(&self, source: &str) -> String {
        format!("{}_{}", source, self.as_ref())
    }
}

// --- Readings of one source for one cycle ---
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelReadings {
    pub accelerometer: Option<Vector3>,
    pub gyroscope: Option<Vector3>,
    pub magnetometer: Option<Vector3>,
}

impl ChannelReadings {
    pub fn get(&self, kind: ChannelKind) -> Option<Vector3> {
        match kind {
            ChannelKind::Accelerometer => self.accelerometer,
            ChannelKind::Gyroscope => self.gyroscope,
            ChannelKind::Magnetometer => self.magnetometer,
        }
    }

    pub fn set(&mut self, kind: ChannelKind, value: Vector3) {
        match kind {
            ChannelKind::Accelerometer => self.accelerometer = Some(value),
            ChannelKind::Gyroscope => self.gyroscope = Some(value),
            ChannelKind::Magnetometer => self.magnetometer = Some(value),
        }
    }

    pub fn with(mut self, kind: ChannelKind, value: Vector3) -> Self {
        self.set(kind, value);
        self
    }
}

// --- Per-read errors ---
/// Failure of a single `read()` call.
///
/// Every variant is transient from the acquisition loop's point of view:
/// the cycle is dropped and the next one is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    /// The transport did not answer within its own read timeout
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    /// The link to the device is gone (unplugged port, closed bus)
    #[error("transport disconnected: {0}")]
    TransportDisconnected(String),
    /// Bytes arrived but did not decode into a valid reading
    #[error("malformed reading: {0}")]
    MalformedReading(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorErrorKind {
    Timeout,
    TransportDisconnected,
    MalformedReading,
}

impl SensorError {
    pub fn kind(&self) -> SensorErrorKind {
        match self {
            SensorError::Timeout(_) => SensorErrorKind::Timeout,
            SensorError::TransportDisconnected(_) => SensorErrorKind::TransportDisconnected,
            SensorError::MalformedReading(_) => SensorErrorKind::MalformedReading,
        }
    }
}

// --- Device setup errors ---
#[derive(Debug, Error)]
pub enum ImuError {
    /// Error originating from the underlying device communication (I2C, Serial)
    #[error("Device error: {0}")]
    DeviceError(String),
    /// Error reading data from the device during setup
    #[error("Read error: {0}")]
    ReadError(String),
    /// Error writing commands or configuration to the device
    #[error("Write error: {0}")]
    WriteError(String),
    /// Error during device configuration or setup
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// Functionality not supported by this specific IMU implementation
    #[error("Not supported: {0}")]
    NotSupported(String),
}

/// A sensor that can be sampled synchronously by the acquisition loop.
///
/// Implementations are configured completely before the session starts. After
/// that the only call made on them is [`SensorSource::read`], which must return
/// promptly: a transport that can block has to enforce its own timeout and
/// report [`SensorError::Timeout`].
pub trait SensorSource {
    /// Prefix for this source's channel names (`external`, `internal`).
    fn name(&self) -> &str;

    /// Channels every successful reading is expected to contain.
    fn channels(&self) -> &[ChannelKind];

    /// Reads all channels now.
    fn read(&mut self) -> Result<ChannelReadings, SensorError>;
}

impl<S: SensorSource + ?Sized> SensorSource for &mut S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn channels(&self) -> &[ChannelKind] {
        (**self).channels()
    }

    fn read(&mut self) -> Result<ChannelReadings, SensorError> {
        (**self).read()
    }
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn channels(&self) -> &[ChannelKind] {
        (**self).channels()
    }

    fn read(&mut self) -> Result<ChannelReadings, SensorError> {
        (**self).read()
    }
}
