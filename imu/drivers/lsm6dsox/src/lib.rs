use byteorder::{ByteOrder, LittleEndian};
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use imu_traits::{ChannelKind, ChannelReadings, ImuError, SensorError, SensorSource, Vector3};
use log::{debug, error, trace};
use std::io;
use std::thread;
use std::time::Duration;

mod registers;
pub use registers::{AccelRange, DataRate, GyroRange, MagRange, PerformanceMode};
use registers::{
    Constants, Lis3mdlRegisters, Lis3mdlStatus, Lsm6dsoxRegisters, Lsm6dsoxStatus,
    CTRL3_C_BDU, CTRL3_C_IF_INC, CTRL3_C_SW_RESET, LIS3MDL_AUTO_INCREMENT, LIS3MDL_CONTINUOUS,
    LIS3MDL_FAST_ODR,
};

const EXTERNAL_CHANNELS: [ChannelKind; 3] = [
    ChannelKind::Accelerometer,
    ChannelKind::Gyroscope,
    ChannelKind::Magnetometer,
];

// Errors local to this driver.
#[derive(Debug)]
pub enum Error {
    I2c(LinuxI2CError),
    InvalidChipId { device: &'static str, expected: u8, found: u8 },
    NoData,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "I2C error: {}", e),
            Error::InvalidChipId { device, expected, found } => write!(
                f,
                "{} chip ID mismatch: expected {:#04x}, found {:#04x}",
                device, expected, found
            ),
            Error::NoData => write!(f, "sensor produced no data after configuration"),
        }
    }
}

impl std::error::Error for Error {}

impl From<LinuxI2CError> for Error {
    fn from(err: LinuxI2CError) -> Self {
        Error::I2c(err)
    }
}

// Map local Error to the shared setup error
impl From<Error> for ImuError {
    fn from(err: Error) -> Self {
        match err {
            Error::I2c(e) => ImuError::DeviceError(format!("I2C error: {}", e)),
            e @ Error::InvalidChipId { .. } => ImuError::ConfigurationError(e.to_string()),
            Error::NoData => ImuError::ReadError(Error::NoData.to_string()),
        }
    }
}

// Map local Error to the per-read error the acquisition loop understands
impl From<Error> for SensorError {
    fn from(err: Error) -> Self {
        match err {
            Error::I2c(e) => {
                let e = io::Error::from(e);
                if e.kind() == io::ErrorKind::TimedOut {
                    SensorError::Timeout(Duration::ZERO)
                } else {
                    SensorError::TransportDisconnected(format!("I2C error: {}", e))
                }
            }
            other => SensorError::MalformedReading(other.to_string()),
        }
    }
}

/// Register configuration applied once at startup.
#[derive(Debug, Clone, Copy)]
pub struct ExternalImuSettings {
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    pub data_rate: DataRate,
    pub mag_range: MagRange,
    pub mag_performance: PerformanceMode,
}

impl Default for ExternalImuSettings {
    fn default() -> Self {
        ExternalImuSettings {
            accel_range: AccelRange::G8,
            gyro_range: GyroRange::Dps2000,
            data_rate: DataRate::Hz208,
            mag_range: MagRange::Gauss4,
            mag_performance: PerformanceMode::High,
        }
    }
}

/// Converts six little-endian output registers into a scaled vector.
pub fn decode_vector(buf: &[u8; 6], scale: f32) -> Vector3 {
    Vector3 {
        x: (LittleEndian::read_i16(&buf[0..2]) as f32) * scale,
        y: (LittleEndian::read_i16(&buf[2..4]) as f32) * scale,
        z: (LittleEndian::read_i16(&buf[4..6]) as f32) * scale,
    }
}

/// Low-level LSM6DSOX (accel + gyro) driver.
pub struct Lsm6dsox {
    i2c: LinuxI2CDevice,
    accel_scale: f32,
    gyro_scale: f32,
}

impl Lsm6dsox {
    pub fn new(i2c_bus: &str, settings: &ExternalImuSettings) -> Result<Self, Error> {
        debug!("Initializing LSM6DSOX on {}", i2c_bus);
        let mut i2c = LinuxI2CDevice::new(i2c_bus, Constants::Lsm6dsoxI2cAddr as u16)?;

        let chip_id = i2c.smbus_read_byte_data(Lsm6dsoxRegisters::WhoAmI as u8)?;
        if chip_id != Constants::Lsm6dsoxChipId as u8 {
            error!("Invalid LSM6DSOX chip ID: {:#x}", chip_id);
            return Err(Error::InvalidChipId {
                device: "LSM6DSOX",
                expected: Constants::Lsm6dsoxChipId as u8,
                found: chip_id,
            });
        }

        i2c.smbus_write_byte_data(Lsm6dsoxRegisters::Ctrl3C as u8, CTRL3_C_SW_RESET)?;
        thread::sleep(Duration::from_millis(20));
        // Block data update keeps the LSB/MSB halves of one sample together.
        i2c.smbus_write_byte_data(Lsm6dsoxRegisters::Ctrl3C as u8, CTRL3_C_BDU | CTRL3_C_IF_INC)?;

        let odr = (settings.data_rate as u8) << 4;
        i2c.smbus_write_byte_data(
            Lsm6dsoxRegisters::Ctrl1Xl as u8,
            odr | ((settings.accel_range as u8) << 2),
        )?;
        i2c.smbus_write_byte_data(
            Lsm6dsoxRegisters::Ctrl2G as u8,
            odr | ((settings.gyro_range as u8) << 2),
        )?;

        let mut imu = Lsm6dsox {
            i2c,
            accel_scale: settings.accel_range.scale(),
            gyro_scale: settings.gyro_range.scale(),
        };
        imu.wait_for_data()?;
        Ok(imu)
    }

    fn wait_for_data(&mut self) -> Result<(), Error> {
        for _ in 0..50 {
            let status = self.status()?;
            if status.contains(Lsm6dsoxStatus::ACCEL_READY | Lsm6dsoxStatus::GYRO_READY) {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(2));
        }
        Err(Error::NoData)
    }

    pub fn status(&mut self) -> Result<Lsm6dsoxStatus, Error> {
        let raw = self.i2c.smbus_read_byte_data(Lsm6dsoxRegisters::Status as u8)?;
        Ok(Lsm6dsoxStatus::from_bits_truncate(raw))
    }

    fn read_block(&mut self, register: Lsm6dsoxRegisters) -> Result<[u8; 6], Error> {
        let mut buf = [0u8; 6];
        self.i2c.write(&[register as u8])?;
        self.i2c.read(&mut buf)?;
        Ok(buf)
    }

    /// Acceleration in m/s².
    pub fn read_accelerometer(&mut self) -> Result<Vector3, Error> {
        let buf = self.read_block(Lsm6dsoxRegisters::OutxLA)?;
        Ok(decode_vector(&buf, self.accel_scale))
    }

    /// Angular velocity in deg/s.
    pub fn read_gyroscope(&mut self) -> Result<Vector3, Error> {
        let buf = self.read_block(Lsm6dsoxRegisters::OutxLG)?;
        Ok(decode_vector(&buf, self.gyro_scale))
    }
}

/// Low-level LIS3MDL (magnetometer) driver.
pub struct Lis3mdl {
    i2c: LinuxI2CDevice,
    scale: f32,
}

impl Lis3mdl {
    pub fn new(i2c_bus: &str, settings: &ExternalImuSettings) -> Result<Self, Error> {
        debug!("Initializing LIS3MDL on {}", i2c_bus);
        let mut i2c = LinuxI2CDevice::new(i2c_bus, Constants::Lis3mdlI2cAddr as u16)?;

        let chip_id = i2c.smbus_read_byte_data(Lis3mdlRegisters::WhoAmI as u8)?;
        if chip_id != Constants::Lis3mdlChipId as u8 {
            error!("Invalid LIS3MDL chip ID: {:#x}", chip_id);
            return Err(Error::InvalidChipId {
                device: "LIS3MDL",
                expected: Constants::Lis3mdlChipId as u8,
                found: chip_id,
            });
        }

        let mode = settings.mag_performance as u8;
        // FAST_ODR with the performance mode picks the output rate (300 Hz in high performance).
        i2c.smbus_write_byte_data(Lis3mdlRegisters::CtrlReg1 as u8, (mode << 5) | LIS3MDL_FAST_ODR)?;
        i2c.smbus_write_byte_data(Lis3mdlRegisters::CtrlReg2 as u8, (settings.mag_range as u8) << 5)?;
        i2c.smbus_write_byte_data(Lis3mdlRegisters::CtrlReg4 as u8, mode << 2)?;
        i2c.smbus_write_byte_data(Lis3mdlRegisters::CtrlReg3 as u8, LIS3MDL_CONTINUOUS)?;

        Ok(Lis3mdl {
            i2c,
            scale: settings.mag_range.scale(),
        })
    }

    pub fn status(&mut self) -> Result<Lis3mdlStatus, Error> {
        let raw = self.i2c.smbus_read_byte_data(Lis3mdlRegisters::Status as u8)?;
        Ok(Lis3mdlStatus::from_bits_truncate(raw))
    }

    /// Magnetic field in µT.
    pub fn read_magnetometer(&mut self) -> Result<Vector3, Error> {
        let mut buf = [0u8; 6];
        self.i2c
            .write(&[Lis3mdlRegisters::OutXL as u8 | LIS3MDL_AUTO_INCREMENT])?;
        self.i2c.read(&mut buf)?;
        Ok(decode_vector(&buf, self.scale))
    }
}

/// The external IMU board: LSM6DSOX accel/gyro plus LIS3MDL magnetometer on one bus.
pub struct ExternalImu {
    name: String,
    accel_gyro: Lsm6dsox,
    mag: Lis3mdl,
}

impl ExternalImu {
    pub fn new(i2c_bus: &str) -> Result<Self, ImuError> {
        Self::with_settings(i2c_bus, ExternalImuSettings::default())
    }

    pub fn with_settings(i2c_bus: &str, settings: ExternalImuSettings) -> Result<Self, ImuError> {
        let accel_gyro = Lsm6dsox::new(i2c_bus, &settings)?;
        let mag = Lis3mdl::new(i2c_bus, &settings)?;
        debug!("External IMU ready on {}: {:?}", i2c_bus, settings);
        Ok(ExternalImu {
            name: "external".to_string(),
            accel_gyro,
            mag,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn read_all(&mut self) -> Result<ChannelReadings, Error> {
        let accelerometer = self.accel_gyro.read_accelerometer()?;
        let gyroscope = self.accel_gyro.read_gyroscope()?;
        let status = self.mag.status()?;
        if status.contains(Lis3mdlStatus::XYZ_OVERRUN) {
            trace!("LIS3MDL overrun, sampling faster than the magnetometer ODR");
        }
        let magnetometer = self.mag.read_magnetometer()?;
        Ok(ChannelReadings {
            accelerometer: Some(accelerometer),
            gyroscope: Some(gyroscope),
            magnetometer: Some(magnetometer),
        })
    }
}

impl SensorSource for ExternalImu {
    fn name(&self) -> &str {
        &self.name
    }

    fn channels(&self) -> &[ChannelKind] {
        &EXTERNAL_CHANNELS
    }

    fn read(&mut self) -> Result<ChannelReadings, SensorError> {
        self.read_all().map_err(SensorError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_counts() {
        // x = 1, y = -1, z = 0x0100
        let buf = [0x01, 0x00, 0xFF, 0xFF, 0x00, 0x01];
        let v = decode_vector(&buf, 1.0);
        assert_eq!(v, Vector3::new(1.0, -1.0, 256.0));
    }

    #[test]
    fn accel_scale_matches_datasheet_sensitivity() {
        // 1 g at +-8 g full scale is ~4098 counts.
        let counts = (1000.0 / 0.244) as i16;
        let bytes = counts.to_le_bytes();
        let buf = [bytes[0], bytes[1], 0, 0, 0, 0];
        let v = decode_vector(&buf, AccelRange::G8.scale());
        assert!((v.x - registers::GRAVITY).abs() < 0.01);
    }

    #[test]
    fn gyro_and_mag_scales() {
        assert!((GyroRange::Dps2000.scale() * 32767.0 - 2293.69).abs() < 0.1);
        // Full-scale +-4 gauss is 400 µT.
        assert!((MagRange::Gauss4.scale() * 27368.0 - 400.0).abs() < 0.1);
    }

    #[test]
    fn chip_id_error_maps_to_configuration_error() {
        let err: ImuError = Error::InvalidChipId {
            device: "LSM6DSOX",
            expected: 0x6C,
            found: 0x00,
        }
        .into();
        assert!(matches!(err, ImuError::ConfigurationError(_)));
    }

    #[test]
    fn no_data_is_a_malformed_reading() {
        let err: SensorError = Error::NoData.into();
        assert!(matches!(err, SensorError::MalformedReading(_)));
    }
}
