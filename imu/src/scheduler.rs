//! Fixed-rate acquisition loop.
//!
//! The schedule is the arithmetic sequence `start, start + period, start +
//! 2·period, ...` and only advances when a sample is recorded. Per-cycle
//! overruns therefore delay one sample without shifting the ones after it.
//! The k-th instant is derived from `start` directly, never by summing
//! periods, so a period that is not a whole number of nanoseconds does not
//! accumulate rounding error. Under a sustained overrun (read latency above
//! the period) the loop falls behind and runs back to back, never sleeping
//! negative time.
//!
//! Sources are read one after another, so the vectors of one sample are
//! captured within one cycle's span, not at one instant. The skew between the
//! first and last channel of a sample is bounded by the sum of the sources'
//! read latencies.

use crate::buffer::{ChannelLayout, SampleBuffer};
use crate::clock::{Clock, MonotonicClock};
use crate::config::AcquisitionConfig;
use crate::error::AcquisitionError;
use crate::record::{RunStats, SessionRecord, Termination};
use imu_traits::{ChannelKind, ChannelReadings, SensorError, SensorSource, Vector3};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Cooperative stop request, observed by the loop between cycles.
///
/// Cheap to clone; safe to trigger from a signal handler thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Which source and channel feeds each column of the buffer row.
struct CapturePlan {
    columns: Vec<(usize, ChannelKind)>,
}

impl CapturePlan {
    fn new<S: SensorSource>(sources: &[S]) -> Self {
        let columns = sources
            .iter()
            .enumerate()
            .flat_map(|(i, s)| s.channels().iter().map(move |&k| (i, k)))
            .collect();
        Self { columns }
    }

    /// Reads every source in order and fills `row`. Any failure, including a
    /// reading that lacks a declared channel, voids the whole cycle.
    fn capture<S: SensorSource>(
        &self,
        sources: &mut [S],
        readings: &mut [ChannelReadings],
        row: &mut [Vector3],
    ) -> Result<(), (usize, SensorError)> {
        for (i, source) in sources.iter_mut().enumerate() {
            readings[i] = source.read().map_err(|e| (i, e))?;
        }
        for (slot, &(i, kind)) in row.iter_mut().zip(&self.columns) {
            let value = readings[i].get(kind).ok_or_else(|| {
                (i, SensorError::MalformedReading(format!("missing {} channel", kind)))
            })?;
            if !value.is_finite() {
                return Err((i, SensorError::MalformedReading(format!("non-finite {} value", kind))));
            }
            *slot = value;
        }
        Ok(())
    }
}

pub struct AcquisitionScheduler<C: Clock = MonotonicClock> {
    config: AcquisitionConfig,
    clock: C,
    stop: StopSignal,
}

impl AcquisitionScheduler<MonotonicClock> {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C: Clock> AcquisitionScheduler<C> {
    pub fn with_clock(config: AcquisitionConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            stop: StopSignal::new(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Samples every source at the configured rate until the duration
    /// elapses, the buffer fills or a stop is requested.
    ///
    /// Fails only before the first cycle (no sources, clashing channel names,
    /// a capacity too large to allocate).
    /// Sensor errors during the run skip the affected cycle.
    #[instrument(
        name = "acquisition",
        skip_all,
        fields(rate_hz = self.config.target_rate(), duration_s = self.config.duration_secs())
    )]
    pub fn run<S: SensorSource>(&self, sources: &mut [S]) -> Result<SessionRecord, AcquisitionError> {
        let layout = ChannelLayout::from_sources(sources)?;
        let plan = CapturePlan::new(sources);
        let mut buffer = SampleBuffer::new(self.config.max_samples(), layout)?;
        let mut readings = vec![ChannelReadings::default(); sources.len()];
        let mut row = vec![Vector3::default(); plan.columns.len()];

        let period = self.config.sample_period();
        let progress_every = (self.config.target_rate().round() as usize).max(1);
        let mut stats = RunStats::default();

        info!(
            channels = ?buffer.layout().names(),
            capacity = buffer.capacity(),
            "Starting acquisition"
        );

        let start = self.clock.now();
        let end = start + self.config.duration();
        let mut next_sample_time = start;

        let termination = loop {
            let now = self.clock.now();
            if now >= end {
                break Termination::NormalCompletion;
            }
            let now = if now < next_sample_time {
                self.clock.sleep(next_sample_time - now);
                let woke = self.clock.now();
                // A wake-up at or past the end would stamp a sample outside the session.
                if woke >= end {
                    break Termination::NormalCompletion;
                }
                woke
            } else {
                now
            };
            if self.stop.is_requested() {
                break Termination::Stopped;
            }

            let lateness = now.saturating_sub(next_sample_time);
            if lateness > period {
                stats.late_cycles += 1;
            }
            stats.max_lateness_secs = stats.max_lateness_secs.max(lateness.as_secs_f64());

            let timestamp = (now - start).as_secs_f64();
            stats.attempted_cycles += 1;

            if let Err((i, err)) = plan.capture(sources, &mut readings, &mut row) {
                stats.skipped_cycles += 1;
                stats.skips.record(err.kind());
                if stats.skipped_cycles == 1 || stats.skipped_cycles % 100 == 0 {
                    warn!(
                        source = sources[i].name(),
                        error = %err,
                        skipped = stats.skipped_cycles,
                        "Sensor read failed, skipping cycle"
                    );
                } else {
                    debug!(source = sources[i].name(), error = %err, "Skipping cycle");
                }
                continue;
            }

            if buffer.append(timestamp, &row).is_err() {
                break Termination::CapacityExhausted;
            }
            next_sample_time = start + self.config.scheduled_offset(buffer.len());

            if buffer.len() % progress_every == 0 {
                info!(samples = buffer.len(), t = timestamp, "Acquiring");
            }
        };

        debug_assert_eq!(stats.skips.total(), stats.skipped_cycles);
        stats.recorded_samples = buffer.len() as u64;
        stats.elapsed_secs = (self.clock.now() - start).as_secs_f64();

        match termination {
            Termination::NormalCompletion => info!(samples = buffer.len(), "Acquisition complete"),
            Termination::CapacityExhausted => warn!(
                samples = buffer.len(),
                "Maximum sample capacity reached, ending acquisition early"
            ),
            Termination::Stopped => info!(samples = buffer.len(), "Acquisition stopped on request"),
        }
        if stats.skipped_cycles > 0 {
            warn!(
                skipped = stats.skipped_cycles,
                timeouts = stats.skips.timeout,
                disconnects = stats.skips.transport_disconnected,
                malformed = stats.skips.malformed_reading,
                "Some cycles were skipped"
            );
        }
        if stats.late_cycles > 0 {
            debug!(
                late = stats.late_cycles,
                max_lateness = ?Duration::from_secs_f64(stats.max_lateness_secs),
                "Loop fell behind schedule"
            );
        }

        Ok(buffer.trim().with_outcome(termination, stats))
    }
}
