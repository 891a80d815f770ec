//! Hardware-independent core library for edr-rs
//!
//! This crate contains the streaming half of the ECG-derived respiration (EDR)
//! service: the bounded sample buffer fed by the transport layer, the hop
//! worker that windows, decomposes and gates the signal, the one-minute
//! aggregator, the staleness monitor, and the published read-only state.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on embedded
//! gateways as well as desktop hosts (for the simulator and tests).
//!
//! # Wiring
//!
//! ```rust,ignore
//! static CORE: StaticCell<EdrCore> = StaticCell::new();
//! let core: &'static EdrCore = CORE.init(EdrCore::new(ProcessorConfig::default())?);
//!
//! // Transport layer
//! core.ingest(&[512.0, 518.0, -1.0, 530.0]);
//!
//! // Periodic tasks, each on its own execution context
//! let mut worker = HopWorker::new(core, ZeroCrossingDecomposer::default());
//! worker.run(&HOP_STOP).await;
//! StalenessMonitor::new(core).run(&MONITOR_STOP).await;
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod aggregator;
pub mod buffer;
pub mod config;
pub mod decomposer;
pub mod error;
pub mod events;
pub mod gate;
pub mod monitor;
pub mod processor;
pub mod state;
pub mod storage;
pub mod window;

pub use aggregator::{MinuteAggregator, MinuteRecord};
pub use config::ProcessorConfig;
pub use decomposer::{SignalDecomposer, ZeroCrossingDecomposer};
pub use error::{ConfigError, DecomposeError, Error, StorageError};
pub use events::EdrEvent;
pub use gate::GatedEstimate;
pub use monitor::StalenessMonitor;
pub use processor::{EdrCore, HopOutcome, HopReport, HopWorker, StopSignal};
