//! The physical bench: the external I2C IMU plus the controller's onboard IMU.

use crate::config::RigConfig;
use crate::error::AcquisitionError;
use imu_traits::SensorSource;
use linux_lsm6dsox::ExternalImu;
use plink::RemoteImu;
use tracing::info;

pub struct Rig {
    external: ExternalImu,
    remote: RemoteImu,
    power_channel: u8,
}

impl Rig {
    /// Opens and configures both sensors. Nothing is sampled here; a failure
    /// names the sensor that could not be brought up.
    pub fn open(config: &RigConfig) -> Result<Self, AcquisitionError> {
        let external = ExternalImu::new(&config.external.i2c_bus)
            .map_err(|e| AcquisitionError::sensor_init("external", e))?;
        info!(bus = %config.external.i2c_bus, "External IMU ready");

        let remote = RemoteImu::connect(
            &config.remote.port,
            config.remote.baud_rate,
            config.remote.read_timeout(),
        )
        .map_err(|e| AcquisitionError::sensor_init("internal", e))?;
        info!(port = %config.remote.port, "Controller IMU ready");

        Ok(Self {
            external,
            remote,
            power_channel: config.remote.power_channel,
        })
    }

    /// External first, then internal; this fixes the channel order on disk.
    pub fn sources(&mut self) -> [&mut dyn SensorSource; 2] {
        [&mut self.external, &mut self.remote]
    }

    pub fn set_motor_power(&mut self, level: f32) -> Result<(), AcquisitionError> {
        self.remote
            .set_channel_power(self.power_channel, level)
            .map_err(|e| AcquisitionError::sensor_init("internal", e))?;
        info!(channel = self.power_channel, level, "Motor power set");
        Ok(())
    }
}
