use imu_acquire::{
    load_session, AcquisitionConfig, AcquisitionScheduler, ChannelKind, ChannelReadings,
    ManualClock, SensorError, SensorSource, SessionError, SessionWriter, SimulatedImu, StopSignal,
    Termination,
};
use ndarray::{Array1, Array2};
use ndarray_npy::NpzReader;
use std::fs::{self, File};
use std::time::Duration;
use tempfile::tempdir;

fn scheduler(config: AcquisitionConfig, clock: &ManualClock) -> AcquisitionScheduler<ManualClock> {
    AcquisitionScheduler::with_clock(config, clock.clone())
}

fn assert_on_schedule(timestamps: &[f64], rate: f64) {
    for (k, t) in timestamps.iter().enumerate() {
        let ideal = k as f64 / rate;
        assert!((t - ideal).abs() < 1e-9, "sample {k} at {t}, expected {ideal}");
    }
}

#[test]
fn zero_latency_run_has_no_drift() {
    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(250.0, 2.0).unwrap();
    let mut sources = vec![SimulatedImu::full("external", clock.clone())];

    let record = scheduler(config, &clock).run(&mut sources).unwrap();

    assert_eq!(record.len(), 500);
    assert_on_schedule(record.timestamps(), 250.0);
    assert_eq!(record.stats().late_cycles, 0);
}

#[test]
fn non_nanosecond_period_does_not_drift() {
    // 1/3000 s is 333333.33 ns; adding the rounded period 180000 times would
    // leave the last sample 60 µs early.
    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(3000.0, 60.0).unwrap();
    let mut sources = vec![SimulatedImu::full("external", clock.clone())];

    let record = scheduler(config, &clock).run(&mut sources).unwrap();

    assert_eq!(record.len(), 180_000);
    assert_eq!(record.termination(), Termination::NormalCompletion);
    for (k, t) in record.timestamps().iter().enumerate() {
        let ideal = k as f64 / 3000.0;
        assert!((t - ideal).abs() < 2e-9, "sample {k} at {t}, expected {ideal}");
    }
}

#[test]
fn read_latency_below_period_does_not_accumulate() {
    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(1000.0, 1.0).unwrap();
    let mut sources = vec![
        SimulatedImu::full("external", clock.clone()).with_latency(Duration::from_micros(300)),
        SimulatedImu::full("internal", clock.clone()).with_latency(Duration::from_micros(450)),
    ];

    let record = scheduler(config, &clock).run(&mut sources).unwrap();

    assert_eq!(record.len(), 1000);
    assert_on_schedule(record.timestamps(), 1000.0);
    assert_eq!(record.channels().len(), 6);
}

#[test]
fn sustained_overrun_runs_back_to_back() {
    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(1000.0, 0.1).unwrap();
    let mut sources =
        vec![SimulatedImu::full("internal", clock.clone()).with_latency(Duration::from_micros(1500))];

    let record = scheduler(config, &clock).run(&mut sources).unwrap();

    // One sample every 1.5 ms until the 100 ms window closes.
    assert_eq!(record.len(), 67);
    for pair in record.timestamps().windows(2) {
        assert!((pair[1] - pair[0] - 0.0015).abs() < 1e-9);
    }
    assert_eq!(record.termination(), Termination::NormalCompletion);
    assert!(record.stats().late_cycles > 0);
}

#[test]
fn failed_reads_are_skipped_not_recorded() {
    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(100.0, 0.2).unwrap();
    let mut sources = vec![SimulatedImu::full("internal", clock.clone())
        .with_latency(Duration::from_millis(1))
        .fail_on(3, SensorError::Timeout(Duration::from_millis(20)))
        .fail_on(7, SensorError::TransportDisconnected("port closed".into()))];

    let record = scheduler(config, &clock).run(&mut sources).unwrap();
    let stats = record.stats();

    assert_eq!(stats.attempted_cycles, sources[0].attempts());
    assert_eq!(record.len() as u64, stats.attempted_cycles - 2);
    assert_eq!(stats.skipped_cycles, 2);
    assert_eq!(stats.skips.timeout, 1);
    assert_eq!(stats.skips.transport_disconnected, 1);
    assert_eq!(stats.skips.total(), stats.skipped_cycles);
    assert!(record.timestamps().windows(2).all(|w| w[1] > w[0]));
    // Skips do not cost samples when the retry fits inside the window.
    assert_eq!(record.len(), 20);
}

#[test]
fn one_second_at_100hz_yields_exactly_100_samples() {
    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(100.0, 1.0).unwrap();
    let mut sources = vec![SimulatedImu::full("external", clock.clone())];

    let record = scheduler(config, &clock).run(&mut sources).unwrap();

    assert_eq!(record.len(), 100);
    assert_eq!(record.timestamps()[0], 0.0);
    assert!((record.timestamps()[99] - 0.99).abs() < 1e-9);
    assert_eq!(record.termination(), Termination::NormalCompletion);
}

#[test]
fn full_buffer_ends_the_run_early() {
    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(100.0, 1.0)
        .unwrap()
        .with_max_samples(50)
        .unwrap();
    let mut sources = vec![SimulatedImu::full("external", clock.clone())];

    let record = scheduler(config, &clock).run(&mut sources).unwrap();

    assert_eq!(record.len(), 50);
    assert_eq!(record.termination(), Termination::CapacityExhausted);
    for column in record.channels() {
        assert_eq!(column.len(), 50);
    }
}

/// Requests a stop from inside its `after`-th read, like a Ctrl+C landing mid-cycle.
struct StopAfter {
    inner: SimulatedImu,
    stop: StopSignal,
    after: u64,
}

impl SensorSource for StopAfter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn channels(&self) -> &[ChannelKind] {
        self.inner.channels()
    }

    fn read(&mut self) -> Result<ChannelReadings, SensorError> {
        let readings = self.inner.read();
        if self.inner.attempts() == self.after {
            self.stop.request_stop();
        }
        readings
    }
}

#[test]
fn stop_request_keeps_completed_samples() {
    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(100.0, 1.0).unwrap();
    let stop = StopSignal::new();
    let mut sources = vec![StopAfter {
        inner: SimulatedImu::full("external", clock.clone()),
        stop: stop.clone(),
        after: 20,
    }];

    let record = scheduler(config, &clock)
        .with_stop_signal(stop)
        .run(&mut sources)
        .unwrap();

    assert_eq!(record.termination(), Termination::Stopped);
    assert_eq!(record.len(), 20);
    assert_eq!(sources[0].inner.attempts(), 20);
    assert_on_schedule(record.timestamps(), 100.0);
}

#[test]
fn session_round_trips_through_npz() {
    let dir = tempdir().unwrap();
    let writer = SessionWriter::new(dir.path().join("experiments"));
    let target = writer.reserve("bench_run").unwrap();

    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(200.0, 0.5).unwrap();
    let mut sources = vec![
        SimulatedImu::full("external", clock.clone()),
        SimulatedImu::new(
            "internal",
            &[ChannelKind::Accelerometer, ChannelKind::Gyroscope],
            clock.clone(),
        ),
    ];
    let record = scheduler(config, &clock).run(&mut sources).unwrap();
    let path = writer.write(&target, &record, &config).unwrap();

    let mut npz = NpzReader::new(File::open(path.join("data.npz")).unwrap()).unwrap();
    let mut keys = Vec::new();
    for entry in npz.names().unwrap() {
        let key = entry.trim_end_matches(".npy").to_string();
        if key == "timestamps" {
            let timestamps: Array1<f64> = npz.by_name(&entry).unwrap();
            assert_eq!(timestamps.len(), 100);
        } else {
            let values: Array2<f32> = npz.by_name(&entry).unwrap();
            assert_eq!(values.shape(), &[100, 3]);
        }
        keys.push(key);
    }
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "external_accel",
            "external_gyro",
            "external_mag",
            "internal_accel",
            "internal_gyro",
            "timestamps",
        ]
    );

    let stored = load_session(&path).unwrap();
    assert_eq!(stored.record.timestamps(), record.timestamps());
    assert_eq!(stored.record.channels(), record.channels());
    let manifest = stored.manifest.unwrap();
    assert_eq!(manifest.name, "bench_run");
    assert_eq!(manifest.channels.len(), 5);
}

#[test]
fn existing_experiment_is_refused_before_sampling() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("experiments");
    fs::create_dir_all(root.join("taken")).unwrap();
    fs::write(root.join("taken").join("notes.txt"), "keep me").unwrap();
    let writer = SessionWriter::new(&root);

    let err = writer.reserve("taken").unwrap_err();
    assert!(matches!(err, SessionError::AlreadyExists(_)));

    let entries: Vec<_> = fs::read_dir(&root).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(fs::read_to_string(root.join("taken").join("notes.txt")).unwrap(), "keep me");
}

#[test]
fn fusion_inputs_follow_recorded_timing() {
    let clock = ManualClock::new();
    let config = AcquisitionConfig::new(100.0, 0.1).unwrap();
    let mut sources = vec![SimulatedImu::full("internal", clock.clone())
        .fail_on(4, SensorError::MalformedReading("bad checksum".into()))
        .with_latency(Duration::from_millis(2))];

    let record = scheduler(config, &clock).run(&mut sources).unwrap();
    let period = config.sample_period().as_secs_f32();
    let inputs: Vec<_> = record.fusion_inputs("internal", period).unwrap().collect();

    assert_eq!(inputs.len(), record.len());
    assert_eq!(inputs[0].delta_time, period);
    // Attempt 4 failed at 30 ms; the retry landed 2 ms later.
    assert!((inputs[3].delta_time - 0.012).abs() < 1e-5);
    assert!((inputs[4].delta_time - 0.008).abs() < 1e-5);
}
