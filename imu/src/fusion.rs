//! Feeding a recorded session into an AHRS filter.
//!
//! The record is laid out per channel; orientation filters want one call per
//! sample with gyroscope, accelerometer and magnetometer side by side plus the
//! time step. Units are passed through untouched (deg/s, m/s², µT).

use crate::record::{ChannelColumn, SessionRecord};
use imu_traits::{ChannelKind, Vector3};
use nalgebra::Vector3 as NVector3;

/// Arguments of one filter update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionInput {
    pub gyroscope: NVector3<f32>,
    pub accelerometer: NVector3<f32>,
    pub magnetometer: NVector3<f32>,
    /// Seconds since the previous sample.
    pub delta_time: f32,
}

fn to_nalgebra(v: Vector3) -> NVector3<f32> {
    NVector3::new(v.x, v.y, v.z)
}

/// Iterator over the samples of one source, see [`SessionRecord::fusion_inputs`].
pub struct FusionInputs<'a> {
    timestamps: &'a [f64],
    gyroscope: &'a ChannelColumn,
    accelerometer: &'a ChannelColumn,
    magnetometer: &'a ChannelColumn,
    nominal_period: f32,
    index: usize,
}

impl Iterator for FusionInputs<'_> {
    type Item = FusionInput;

    fn next(&mut self) -> Option<FusionInput> {
        let i = self.index;
        if i >= self.timestamps.len() {
            return None;
        }
        self.index += 1;
        let delta_time = if i == 0 {
            self.nominal_period
        } else {
            (self.timestamps[i] - self.timestamps[i - 1]) as f32
        };
        Some(FusionInput {
            gyroscope: to_nalgebra(self.gyroscope.row(i)),
            accelerometer: to_nalgebra(self.accelerometer.row(i)),
            magnetometer: to_nalgebra(self.magnetometer.row(i)),
            delta_time,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.timestamps.len() - self.index;
        (left, Some(left))
    }
}

impl ExactSizeIterator for FusionInputs<'_> {}

impl SessionRecord {
    /// Filter inputs for `source`, one per sample. `delta_time` comes from the
    /// real timestamps, so skipped cycles show up as longer steps; the first
    /// sample uses `nominal_period`.
    ///
    /// `None` if the source did not record all three channels.
    pub fn fusion_inputs(&self, source: &str, nominal_period: f32) -> Option<FusionInputs<'_>> {
        Some(FusionInputs {
            timestamps: self.timestamps(),
            gyroscope: self.channel(&ChannelKind::Gyroscope.channel_name(source))?,
            accelerometer: self.channel(&ChannelKind::Accelerometer.channel_name(source))?,
            magnetometer: self.channel(&ChannelKind::Magnetometer.channel_name(source))?,
            nominal_period,
            index: 0,
        })
    }
}
