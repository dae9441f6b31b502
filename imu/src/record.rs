//! The trimmed result of one acquisition run.

use crate::error::SessionError;
use imu_traits::{SensorErrorKind, Vector3};
use serde::{Deserialize, Serialize};

/// Why the acquisition loop ended. None of these discard collected data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The requested duration elapsed.
    #[default]
    NormalCompletion,
    /// The buffer filled up before the duration elapsed.
    CapacityExhausted,
    /// A stop was requested between cycles.
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub timeout: u64,
    pub transport_disconnected: u64,
    pub malformed_reading: u64,
}

impl SkipCounts {
    pub fn record(&mut self, kind: SensorErrorKind) {
        match kind {
            SensorErrorKind::Timeout => self.timeout += 1,
            SensorErrorKind::TransportDisconnected => self.transport_disconnected += 1,
            SensorErrorKind::MalformedReading => self.malformed_reading += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.timeout + self.transport_disconnected + self.malformed_reading
    }
}

/// Advisory counters gathered while the loop ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Cycles that got as far as reading the sources.
    pub attempted_cycles: u64,
    pub recorded_samples: u64,
    pub skipped_cycles: u64,
    pub skips: SkipCounts,
    /// Cycles that started more than one period after their scheduled instant.
    pub late_cycles: u64,
    pub max_lateness_secs: f64,
    pub elapsed_secs: f64,
}

/// One channel's `(len × 3)` values, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelColumn {
    name: String,
    values: Vec<f32>,
}

impl ChannelColumn {
    pub(crate) fn new(name: String, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len() % 3, 0);
        Self { name, values }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn row(&self, index: usize) -> Vector3 {
        let v = &self.values[index * 3..index * 3 + 3];
        Vector3::new(v[0], v[1], v[2])
    }

    pub fn rows(&self) -> impl Iterator<Item = Vector3> + '_ {
        self.values
            .chunks_exact(3)
            .map(|v| Vector3::new(v[0], v[1], v[2]))
    }

    /// Row-major backing slice, `len() * 3` long.
    pub fn as_flat(&self) -> &[f32] {
        &self.values
    }

    pub fn mean(&self) -> Option<Vector3> {
        if self.is_empty() {
            return None;
        }
        let n = self.len() as f64;
        let mut sum = [0.0f64; 3];
        for v in self.rows() {
            sum[0] += v.x as f64;
            sum[1] += v.y as f64;
            sum[2] += v.z as f64;
        }
        Some(Vector3::new(
            (sum[0] / n) as f32,
            (sum[1] / n) as f32,
            (sum[2] / n) as f32,
        ))
    }
}

/// Timestamps plus every channel, each exactly `len()` samples long.
///
/// Created once, when the acquisition buffer is trimmed, or when a persisted
/// session is loaded back. Not mutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    timestamps: Vec<f64>,
    channels: Vec<ChannelColumn>,
    termination: Termination,
    stats: RunStats,
}

impl SessionRecord {
    pub(crate) fn new(timestamps: Vec<f64>, channels: Vec<ChannelColumn>) -> Self {
        Self {
            timestamps,
            channels,
            termination: Termination::default(),
            stats: RunStats::default(),
        }
    }

    /// Assembles a record from loaded columns, checking every channel has
    /// one row per timestamp.
    pub fn from_columns(
        timestamps: Vec<f64>,
        channels: Vec<(String, Vec<f32>)>,
    ) -> Result<Self, SessionError> {
        let expected = timestamps.len();
        let mut columns = Vec::with_capacity(channels.len());
        for (name, values) in channels {
            if values.len() != expected * 3 {
                return Err(SessionError::Shape {
                    name,
                    expected,
                    found: values.len() / 3,
                });
            }
            columns.push(ChannelColumn::new(name, values));
        }
        Ok(Self::new(timestamps, columns))
    }

    pub fn with_outcome(mut self, termination: Termination, stats: RunStats) -> Self {
        self.termination = termination;
        self.stats = stats;
        self
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Seconds since session start, one per sample.
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn channels(&self) -> &[ChannelColumn] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelColumn> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// True when a stop request ended the run before anything was recorded.
    /// Such a run is not an experiment and should not be saved as one.
    pub fn stopped_before_first_sample(&self) -> bool {
        self.termination == Termination::Stopped && self.is_empty()
    }

    /// Samples per second over the span actually covered.
    pub fn effective_rate(&self) -> Option<f64> {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) if last > first => {
                Some((self.len() - 1) as f64 / (last - first))
            }
            _ => None,
        }
    }

    /// Number of consecutive-sample intervals longer than 1.5 × `period_secs`.
    pub fn gap_count(&self, period_secs: f64) -> usize {
        self.timestamps
            .windows(2)
            .filter(|w| w[1] - w[0] > period_secs * 1.5)
            .count()
    }

    pub fn max_interval(&self) -> Option<f64> {
        self.timestamps
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(None, |acc, d| Some(acc.map_or(d, |a: f64| a.max(d))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord::from_columns(
            vec![0.0, 0.01, 0.02, 0.05],
            vec![(
                "external_accel".to_string(),
                vec![0.0, 0.0, 9.0, 0.0, 0.0, 10.0, 1.0, 0.0, 9.0, -1.0, 0.0, 10.0],
            )],
        )
        .unwrap()
    }

    #[test]
    fn columns_must_match_timestamp_count() {
        let err = SessionRecord::from_columns(
            vec![0.0, 0.01],
            vec![("internal_gyro".to_string(), vec![0.0; 9])],
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Shape { expected: 2, found: 3, .. }));
    }

    #[test]
    fn channel_rows_and_mean() {
        let record = record();
        let accel = record.channel("external_accel").unwrap();
        assert_eq!(accel.len(), 4);
        assert_eq!(accel.row(2), Vector3::new(1.0, 0.0, 9.0));
        assert_eq!(accel.mean(), Some(Vector3::new(0.0, 0.0, 9.5)));
        assert!(record.channel("external_mag").is_none());
    }

    #[test]
    fn timing_summaries() {
        let record = record();
        assert_eq!(record.gap_count(0.01), 1);
        assert!((record.max_interval().unwrap() - 0.03).abs() < 1e-12);
        assert!((record.effective_rate().unwrap() - 60.0).abs() < 1e-9);
        assert_eq!(record.termination(), Termination::NormalCompletion);
    }

    #[test]
    fn only_an_empty_stopped_run_counts_as_aborted() {
        let empty = SessionRecord::from_columns(Vec::new(), vec![("external_accel".to_string(), Vec::new())])
            .unwrap();
        assert!(!empty.stopped_before_first_sample());

        let stopped = empty.with_outcome(Termination::Stopped, RunStats::default());
        assert!(stopped.stopped_before_first_sample());

        let partial = record().with_outcome(Termination::Stopped, RunStats::default());
        assert!(!partial.stopped_before_first_sample());
    }

    #[test]
    fn skip_total_sums_every_kind() {
        let mut skips = SkipCounts::default();
        skips.record(SensorErrorKind::Timeout);
        skips.record(SensorErrorKind::Timeout);
        skips.record(SensorErrorKind::MalformedReading);
        assert_eq!(skips.total(), 3);
        assert_eq!(skips.transport_disconnected, 0);
    }
}
