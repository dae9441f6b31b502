//! Synthetic sensors for dry runs and deterministic tests.

use crate::clock::{Clock, ManualClock};
use imu_traits::{ChannelKind, ChannelReadings, SensorError, SensorSource, Vector3};
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::time::Duration;

const GRAVITY: f32 = 9.80665;

/// A sensor producing a slow rocking motion, charging its read latency to a
/// shared [`ManualClock`].
///
/// Scripted failures are keyed by attempt number, counting from 1.
pub struct SimulatedImu {
    name: String,
    channels: Vec<ChannelKind>,
    clock: ManualClock,
    latency: Duration,
    failures: HashMap<u64, SensorError>,
    attempts: u64,
}

impl SimulatedImu {
    pub fn new(name: impl Into<String>, channels: &[ChannelKind], clock: ManualClock) -> Self {
        Self {
            name: name.into(),
            channels: channels.to_vec(),
            clock,
            latency: Duration::ZERO,
            failures: HashMap::new(),
            attempts: 0,
        }
    }

    /// Accelerometer, gyroscope and magnetometer.
    pub fn full(name: impl Into<String>, clock: ManualClock) -> Self {
        Self::new(
            name,
            &[
                ChannelKind::Accelerometer,
                ChannelKind::Gyroscope,
                ChannelKind::Magnetometer,
            ],
            clock,
        )
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_on(mut self, attempt: u64, error: SensorError) -> Self {
        self.failures.insert(attempt, error);
        self
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    fn sample(&self, kind: ChannelKind, t: f32) -> Vector3 {
        let phase = TAU * 0.5 * t;
        match kind {
            ChannelKind::Accelerometer => Vector3::new(0.2 * phase.sin(), 0.0, GRAVITY),
            ChannelKind::Gyroscope => Vector3::new(10.0 * phase.cos(), 0.0, 0.0),
            ChannelKind::Magnetometer => Vector3::new(30.0, 0.0, -12.0),
        }
    }
}

impl SensorSource for SimulatedImu {
    fn name(&self) -> &str {
        &self.name
    }

    fn channels(&self) -> &[ChannelKind] {
        &self.channels
    }

    fn read(&mut self) -> Result<ChannelReadings, SensorError> {
        self.attempts += 1;
        self.clock.advance(self.latency);
        if let Some(err) = self.failures.get(&self.attempts) {
            return Err(err.clone());
        }
        let t = self.clock.now().as_secs_f32();
        let mut readings = ChannelReadings::default();
        for &kind in &self.channels {
            readings.set(kind, self.sample(kind, t));
        }
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_charge_latency_to_the_clock() {
        let clock = ManualClock::new();
        let mut imu = SimulatedImu::full("internal", clock.clone()).with_latency(Duration::from_micros(300));
        let readings = imu.read().unwrap();
        assert_eq!(clock.now(), Duration::from_micros(300));
        assert_eq!(readings.magnetometer, Some(Vector3::new(30.0, 0.0, -12.0)));
        assert!((readings.accelerometer.unwrap().z - GRAVITY).abs() < 1e-6);
    }

    #[test]
    fn scripted_failures_hit_their_attempt_only() {
        let mut imu = SimulatedImu::new("external", &[ChannelKind::Gyroscope], ManualClock::new())
            .fail_on(2, SensorError::Timeout(Duration::from_millis(5)));
        assert!(imu.read().is_ok());
        assert_eq!(imu.read(), Err(SensorError::Timeout(Duration::from_millis(5))));
        let third = imu.read().unwrap();
        assert!(third.gyroscope.is_some() && third.accelerometer.is_none());
        assert_eq!(imu.attempts(), 3);
    }
}
