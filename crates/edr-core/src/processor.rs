//! Shared core state and the hop worker
//!
//! [`EdrCore`] is constructed once at startup and handed by reference to the
//! transport layer (ingestion and reads), the [`HopWorker`], and the
//! [`StalenessMonitor`](crate::StalenessMonitor). All mutable state sits
//! behind critical-section mutexes; readers only ever receive copies.
//!
//! Lock order is always buffer, then published state.

extern crate alloc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Ticker, TimeoutError, with_timeout};
use heapless::HistoryBuf;
use log::{debug, info, warn};

use crate::aggregator::{MinuteAggregator, MinuteRecord};
use crate::buffer::SampleBuffer;
use crate::config::ProcessorConfig;
use crate::decomposer::SignalDecomposer;
use crate::error::{DecomposeError, Error};
use crate::events::{EdrEvent, EventChannel, EventSubscriber, RECENT_EVENTS_CAPACITY};
use crate::gate::{self, GatedEstimate};
use crate::state::PublishedState;
use crate::window::{self, CleanWindow};

/// Stop signal shared with a periodic task's owner.
pub type StopSignal = Signal<CriticalSectionRawMutex, ()>;

/// Process-wide EDR state.
pub struct EdrCore {
    config: ProcessorConfig,
    buffer: Mutex<CriticalSectionRawMutex, RefCell<SampleBuffer>>,
    published: Mutex<CriticalSectionRawMutex, RefCell<PublishedState>>,
    events: EventChannel,
    /// Last events published, kept for readers that poll
    recent_events:
        Mutex<CriticalSectionRawMutex, RefCell<HistoryBuf<EdrEvent, RECENT_EVENTS_CAPACITY>>>,
}

impl EdrCore {
    /// Validate `config` and build empty state.
    pub fn new(config: ProcessorConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            buffer: Mutex::new(RefCell::new(SampleBuffer::new(
                config.buffer_capacity,
                config.eviction_batch,
            ))),
            published: Mutex::new(RefCell::new(PublishedState::new(config.history_capacity))),
            events: EventChannel::new(),
            recent_events: Mutex::new(RefCell::new(HistoryBuf::new())),
            config,
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Transport-facing operations
    // -----------------------------------------------------------------------

    /// Append a batch of raw samples.
    ///
    /// Values are never rejected; negative sentinels are handled when a window
    /// is cleaned. An empty batch still counts as a sign of life.
    pub fn ingest(&self, samples: &[f64]) {
        self.ingest_at(samples, Instant::now());
    }

    pub fn ingest_one(&self, sample: f64) {
        self.ingest(&[sample]);
    }

    pub fn ingest_at(&self, samples: &[f64], now: Instant) {
        let len = self.buffer.lock(|buffer| {
            let mut buffer = buffer.borrow_mut();
            buffer.append(samples, now);
            buffer.len()
        });
        debug!("Ingested {} samples, buffer holds {}", samples.len(), len);
    }

    /// Most recent one-minute average, `None` until one is available.
    pub fn latest_rate(&self) -> Option<f64> {
        self.published.lock(|p| p.borrow().latest_rate())
    }

    /// One-minute averages, oldest first.
    pub fn rate_history(&self) -> Vec<f64> {
        self.published.lock(|p| p.borrow().rate_history())
    }

    pub fn minute_records(&self) -> Vec<MinuteRecord> {
        self.published.lock(|p| p.borrow().records())
    }

    /// Last `n` raw samples as received, oldest first.
    pub fn recent_samples(&self, n: usize) -> Vec<f64> {
        self.buffer.lock(|b| b.borrow().snapshot(n))
    }

    /// Raw window processed by the most recent hop.
    pub fn latest_window(&self) -> Vec<f64> {
        self.published.lock(|p| p.borrow().latest_window())
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock(|b| b.borrow().len())
    }

    pub fn last_ingest(&self) -> Option<Instant> {
        self.buffer.lock(|b| b.borrow().last_ingest())
    }

    /// Administrative reset: buffer, published window, history and latest rate.
    pub fn clear_all(&self) {
        self.buffer.lock(|b| {
            b.borrow_mut().clear();
            self.published.lock(|p| p.borrow_mut().clear_all());
        });
        info!("All EDR state cleared");
        self.publish(EdrEvent::Cleared);
    }

    /// Subscribe to processing events.
    pub fn subscribe(&self) -> Result<EventSubscriber<'_>, pubsub::Error> {
        self.events.subscriber()
    }

    /// Most recent events, oldest first. Survives `clear_all`.
    pub fn recent_events(&self) -> Vec<EdrEvent> {
        self.recent_events.lock(|h| h.borrow().oldest_ordered().copied().collect())
    }

    // -----------------------------------------------------------------------
    // Worker-facing operations
    // -----------------------------------------------------------------------

    pub(crate) fn publish(&self, event: EdrEvent) {
        self.recent_events.lock(|h| h.borrow_mut().write(event));
        self.events.immediate_publisher().publish_immediate(event);
    }

    /// Copy of the trailing `n` samples together with the buffer epoch.
    pub(crate) fn window_snapshot(&self, n: usize) -> (Vec<f64>, u32) {
        self.buffer.lock(|b| {
            let b = b.borrow();
            (b.snapshot(n), b.epoch())
        })
    }

    /// Publish a hop's results unless the buffer was cleared since `epoch`.
    ///
    /// Returns `false` if the results were discarded.
    pub(crate) fn publish_hop(
        &self,
        epoch: u32,
        window: Option<Vec<f64>>,
        minute: Option<MinuteRecord>,
    ) -> bool {
        self.buffer.lock(|b| {
            if b.borrow().epoch() != epoch {
                return false;
            }
            self.published.lock(|p| {
                let mut p = p.borrow_mut();
                if let Some(window) = window {
                    p.set_latest_window(window);
                }
                if let Some(record) = minute {
                    p.record_minute(record);
                }
            });
            true
        })
    }

    /// Discard session state if ingestion has been silent past the timeout.
    pub(crate) fn expire_if_stale(&self, now: Instant) -> bool {
        let timeout = self.config.stale_timeout();
        let silent = self.buffer.lock(|b| {
            let mut b = b.borrow_mut();
            let silent = b
                .last_ingest()
                .map(|last| now.saturating_duration_since(last));
            if !b.clear_if_stale(now, timeout) {
                return None;
            }
            self.published.lock(|p| p.borrow_mut().clear_session());
            silent
        });

        match silent {
            Some(silent) => {
                info!(
                    "No samples for {}s, cleared buffer and latest rate",
                    silent.as_secs()
                );
                self.publish(EdrEvent::StaleCleared {
                    silent_secs: silent.as_secs(),
                });
                true
            }
            None => false,
        }
    }
}

/// What a single hop tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HopOutcome {
    /// Fewer than one window of samples buffered
    WarmingUp { available: usize, required: usize },
    /// Window had no valid samples or no variation
    Flat,
    /// Decomposer errored, timed out or returned a malformed series
    Failed,
    /// Gated estimate for this hop
    Estimated(GatedEstimate),
}

impl HopOutcome {
    /// Value fed to the minute aggregator; warm-up ticks contribute nothing.
    pub fn contribution(self) -> Option<f64> {
        match self {
            Self::WarmingUp { .. } => None,
            Self::Flat | Self::Failed => Some(0.0),
            Self::Estimated(estimate) => Some(estimate.contribution()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HopReport {
    pub outcome: HopOutcome,
    /// Minute closed on this tick, if any
    pub minute: Option<MinuteRecord>,
}

/// Periodic window → decompose → gate → aggregate loop.
pub struct HopWorker<'a, D> {
    core: &'a EdrCore,
    decomposer: D,
    aggregator: MinuteAggregator,
    epoch: Option<u32>,
}

impl<'a, D: SignalDecomposer> HopWorker<'a, D> {
    pub fn new(core: &'a EdrCore, decomposer: D) -> Self {
        Self::new_at(core, decomposer, Instant::now())
    }

    /// Create a worker whose first minute opens at `started_at`.
    pub fn new_at(core: &'a EdrCore, decomposer: D, started_at: Instant) -> Self {
        let config = core.config();
        Self {
            core,
            decomposer,
            aggregator: MinuteAggregator::new(
                started_at,
                config.minute_length(),
                config.clamp_floor_bpm,
            ),
            epoch: None,
        }
    }

    pub fn aggregator(&self) -> &MinuteAggregator {
        &self.aggregator
    }

    /// Run one hop at `now`.
    pub async fn tick(&mut self, now: Instant) -> HopReport {
        let required = self.core.config().window_samples();
        let (raw, epoch) = self.core.window_snapshot(required);

        if self.epoch.is_some_and(|seen| seen != epoch) {
            debug!("Buffer was cleared, dropping pending minute contributions");
            self.aggregator.reset(now);
        }
        self.epoch = Some(epoch);

        let outcome = if raw.len() < required {
            HopOutcome::WarmingUp {
                available: raw.len(),
                required,
            }
        } else {
            self.process(&raw).await
        };

        if let Some(contribution) = outcome.contribution() {
            self.aggregator.push(contribution);
        }
        let minute = self.aggregator.poll(now);

        let window = match outcome {
            HopOutcome::WarmingUp { .. } => None,
            _ => Some(raw),
        };
        let published = self.core.publish_hop(epoch, window, minute);
        if !published {
            debug!("Buffer cleared during hop, results discarded");
        }

        self.core.publish(EdrEvent::HopCompleted {
            at_secs: now.as_secs(),
            outcome,
        });
        if let (true, Some(record)) = (published, minute) {
            self.core.publish(EdrEvent::MinuteRollup(record));
        }

        HopReport {
            outcome,
            minute: if published { minute } else { None },
        }
    }

    async fn process(&mut self, raw: &[f64]) -> HopOutcome {
        let config = *self.core.config();

        let signal = match window::clean(raw, config.flat_epsilon) {
            CleanWindow::Signal(signal) => signal,
            CleanWindow::Flat => {
                info!("Window too flat, counting hop as 0 bpm");
                return HopOutcome::Flat;
            }
        };

        let (derived, rates) = match self.decompose(&signal).await {
            Ok(series) => series,
            Err(e) => {
                warn!("Decomposition failed, counting hop as 0 bpm: {}", e);
                return HopOutcome::Failed;
            }
        };

        let estimate = gate::gate(
            &derived,
            &rates,
            config.intensity_samples(),
            config.intensity_threshold,
        );
        match estimate {
            GatedEstimate::Gated(bpm) => debug!("Hop estimate: {:.2} bpm", bpm),
            GatedEstimate::Fallback(bpm) => {
                debug!("No rate passed the intensity gate, fallback {:.2} bpm", bpm)
            }
            GatedEstimate::NoEstimate => debug!("No rate estimate this hop, counted as 0"),
        }
        HopOutcome::Estimated(estimate)
    }

    /// Call both decomposer stages, each bounded by the configured timeout.
    async fn decompose(&mut self, signal: &[f64]) -> Result<(Vec<f64>, Vec<f64>), DecomposeError> {
        let config = *self.core.config();
        let fs = config.sample_rate_hz as f64;
        let timeout = config.decompose_timeout();
        let timed_out = |_: TimeoutError| DecomposeError::Timeout {
            timeout_ms: config.decompose_timeout_ms,
        };

        let derived = with_timeout(timeout, self.decomposer.decompose(signal, fs))
            .await
            .map_err(timed_out)??;
        if derived.len() != signal.len() {
            return Err(DecomposeError::LengthMismatch {
                stage: "decompose",
                expected: signal.len(),
                actual: derived.len(),
            });
        }

        let rates = with_timeout(timeout, self.decomposer.estimate_rate(&derived, fs))
            .await
            .map_err(timed_out)??;

        Ok((derived, rates))
    }

    /// Tick every hop interval until `stop` is signalled.
    ///
    /// A tick in progress always completes; no new tick starts after the stop.
    pub async fn run(&mut self, stop: &StopSignal) {
        let mut ticker = Ticker::every(self.core.config().hop_interval());
        info!(
            "Hop worker started ({}s hop, {}-sample window)",
            self.core.config().hop_secs,
            self.core.config().window_samples()
        );

        loop {
            match select(stop.wait(), ticker.next()).await {
                Either::First(()) => break,
                Either::Second(()) => {
                    self.tick(Instant::now()).await;
                }
            }
        }

        info!("Hop worker stopped");
    }
}
