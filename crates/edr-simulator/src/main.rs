//! Desktop simulator for the edr-rs respiration pipeline.
//!
//! Streams a synthetic ECG (60 bpm pulse train on a breathing baseline) into
//! an [`EdrCore`] in small batches, the way a device gateway would, while the
//! hop worker and staleness monitor run on their own threads. Processing
//! events are logged from the main thread.
//!
//! # Environment
//!
//! | Variable                | Meaning                                        |
//! |-------------------------|------------------------------------------------|
//! | `EDR_RUN_SECS`          | Total run time (default 150)                   |
//! | `EDR_RESP_BPM`          | Simulated respiration rate (default 15)        |
//! | `EDR_DROPOUT_AFTER_SECS`| Stop feeding samples after this many seconds   |
//! | `EDR_STALE_SECS`        | Override the staleness timeout                 |
//! | `EDR_CONFIG_FILE`       | postcard-encoded `ProcessorConfig` to load     |
//! | `EDR_HISTORY_FILE`      | Append closed minutes as COBS frames           |
//!
//! Use `RUST_LOG=debug` to see every hop.

use std::f64::consts::PI;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use embassy_futures::block_on;
use embassy_time::Instant;
use log::{error, info, warn};
use static_cell::StaticCell;

use edr_core::storage::encode_record;
use edr_core::{
    EdrCore, EdrEvent, HopOutcome, HopWorker, ProcessorConfig, StalenessMonitor, StopSignal,
    ZeroCrossingDecomposer,
};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Samples per transport batch.
const BATCH_SAMPLES: usize = 25;

/// Every n-th sample is replaced by the device's "no reading" sentinel.
const SENTINEL_EVERY: usize = 997;

/// Granularity of the worker threads' sleeps, bounds shutdown latency.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Main thread event polling interval.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

static CORE: StaticCell<EdrCore> = StaticCell::new();
/// Shared by every simulator thread; never reset once signalled.
static STOP: StopSignal = StopSignal::new();

// ---------------------------------------------------------------------------
// Mock data generation
// ---------------------------------------------------------------------------

/// Generates a synthetic single-lead ECG trace.
struct MockEcgGenerator {
    sample_rate_hz: f64,
    resp_bpm: f64,
    index: usize,
}

impl MockEcgGenerator {
    fn new(sample_rate_hz: f64, resp_bpm: f64) -> Self {
        Self {
            sample_rate_hz,
            resp_bpm,
            index: 0,
        }
    }

    /// Next raw ADC-like sample.
    fn next_sample(&mut self) -> f64 {
        let i = self.index;
        self.index += 1;
        if i % SENTINEL_EVERY == SENTINEL_EVERY - 1 {
            return -1.0;
        }

        let t = i as f64 / self.sample_rate_hz;
        let phase = t.fract();

        // QRS-like spike once per second
        let qrs = 150.0 * (-((phase - 0.5) * (phase - 0.5)) / 0.002).exp();
        // Respiration modulates the baseline
        let breathing = 40.0 * (2.0 * PI * self.resp_bpm / 60.0 * t).sin();
        // Deterministic low-level noise
        let noise = 2.0 * (t * 37.0).sin() * (t * 11.0).cos();

        500.0 + breathing + qrs + noise
    }

    fn next_batch(&mut self, count: usize) -> Vec<f64> {
        (0..count).map(|_| self.next_sample()).collect()
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn load_config() -> ProcessorConfig {
    let mut config = match std::env::var("EDR_CONFIG_FILE") {
        Ok(path) => match std::fs::read(&path) {
            Ok(bytes) => ProcessorConfig::from_bytes(&bytes).unwrap_or_else(|e| {
                error!("Invalid config in {}: {}", path, e);
                ProcessorConfig::default()
            }),
            Err(e) => {
                error!("Failed to read {}: {}", path, e);
                ProcessorConfig::default()
            }
        },
        Err(_) => ProcessorConfig::default(),
    };

    if let Ok(raw) = std::env::var("EDR_STALE_SECS") {
        match raw.parse::<u32>() {
            Ok(secs) if secs > 0 => {
                config.stale_timeout_secs = secs;
                config.stale_check_secs = config.stale_check_secs.min(secs);
            }
            _ => warn!("Ignoring invalid EDR_STALE_SECS={:?}", raw),
        }
    }

    config
}

// ---------------------------------------------------------------------------
// Worker threads
// ---------------------------------------------------------------------------

/// Sleep until `deadline`, waking early if a stop was requested.
fn sleep_until(deadline: std::time::Instant) -> bool {
    loop {
        if STOP.signaled() {
            return false;
        }
        let now = std::time::Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(POLL_INTERVAL));
    }
}

fn feeder(core: &'static EdrCore, resp_bpm: f64, dropout_after: Option<Duration>) {
    let sample_rate = core.config().sample_rate_hz as f64;
    let period = Duration::from_secs_f64(BATCH_SAMPLES as f64 / sample_rate);
    let mut generator = MockEcgGenerator::new(sample_rate, resp_bpm);

    let started = std::time::Instant::now();
    let mut next = started;
    loop {
        next += period;
        if !sleep_until(next) {
            break;
        }
        if dropout_after.is_some_and(|d| started.elapsed() >= d) {
            info!("Simulating device dropout, feeder going silent");
            break;
        }
        core.ingest(&generator.next_batch(BATCH_SAMPLES));
    }
}

fn hop_worker(core: &'static EdrCore) {
    let interval = Duration::from_secs(core.config().hop_secs as u64);
    let mut worker = HopWorker::new(core, ZeroCrossingDecomposer::default());

    let mut next = std::time::Instant::now();
    loop {
        next += interval;
        if !sleep_until(next) {
            break;
        }
        block_on(worker.tick(Instant::now()));
    }
    info!("Hop worker stopped");
}

fn staleness_monitor(core: &'static EdrCore) {
    let interval = Duration::from_secs(core.config().stale_check_secs as u64);
    let monitor = StalenessMonitor::new(core);

    let mut next = std::time::Instant::now();
    loop {
        next += interval;
        if !sleep_until(next) {
            break;
        }
        monitor.check(Instant::now());
    }
    info!("Staleness monitor stopped");
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

fn append_history(path: &str, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)
}

fn report(event: EdrEvent, history_file: Option<&str>) {
    match event {
        EdrEvent::HopCompleted { at_secs, outcome } => match outcome {
            HopOutcome::WarmingUp {
                available,
                required,
            } => info!("[{at_secs:>5}s] warming up ({available}/{required} samples)"),
            HopOutcome::Flat => info!("[{at_secs:>5}s] flat window"),
            HopOutcome::Failed => info!("[{at_secs:>5}s] decomposition failed"),
            HopOutcome::Estimated(estimate) => {
                info!("[{at_secs:>5}s] hop estimate {:?}", estimate)
            }
        },
        EdrEvent::MinuteRollup(record) => {
            info!(
                "Minute at {}s: {:.2} bpm ({} hops)",
                record.started_at_secs, record.mean_bpm, record.hop_count
            );
            if let Some(path) = history_file {
                let written = encode_record(&record)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| append_history(path, &bytes).map_err(|e| e.to_string()));
                if let Err(e) = written {
                    error!("Failed to persist minute record: {}", e);
                }
            }
        }
        EdrEvent::StaleCleared { silent_secs } => {
            warn!("Ingestion silent for {silent_secs}s, session cleared")
        }
        EdrEvent::Cleared => info!("All state cleared"),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting edr-rs simulator");

    let config = load_config();
    let run_for = Duration::from_secs(env_or("EDR_RUN_SECS", 150u64));
    let resp_bpm = env_or("EDR_RESP_BPM", 15.0f64);
    let dropout_after = std::env::var("EDR_DROPOUT_AFTER_SECS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .map(Duration::from_secs);
    let history_file = std::env::var("EDR_HISTORY_FILE").ok();

    let core: &'static EdrCore = match EdrCore::new(config) {
        Ok(core) => CORE.init(core),
        Err(e) => {
            error!("Invalid processor configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "{} Hz, {}s window every {}s, simulated respiration {:.1} bpm",
        config.sample_rate_hz, config.window_secs, config.hop_secs, resp_bpm
    );

    let mut events = match core.subscribe() {
        Ok(subscriber) => subscriber,
        Err(e) => {
            error!("Failed to subscribe to events: {:?}", e);
            std::process::exit(1);
        }
    };

    let handles = [
        thread::spawn(move || feeder(core, resp_bpm, dropout_after)),
        thread::spawn(move || hop_worker(core)),
        thread::spawn(move || staleness_monitor(core)),
    ];

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    let started = std::time::Instant::now();
    while started.elapsed() < run_for {
        while let Some(event) = events.try_next_message_pure() {
            report(event, history_file.as_deref());
        }
        thread::sleep(EVENT_POLL_INTERVAL);
    }

    STOP.signal(());
    for handle in handles {
        if handle.join().is_err() {
            error!("Worker thread panicked");
        }
    }
    while let Some(event) = events.try_next_message_pure() {
        report(event, history_file.as_deref());
    }

    let history = core.rate_history();
    info!(
        "Latest rate: {:?}, {} minute(s) of history: {:?}",
        core.latest_rate(),
        history.len(),
        history
    );
    info!(
        "Buffered {} samples, last window {} samples, last 5 raw: {:?}",
        core.buffer_len(),
        core.latest_window().len(),
        core.recent_samples(5)
    );
    info!("{} events retained in the recent feed", core.recent_events().len());
    info!("Simulator exiting");
}
