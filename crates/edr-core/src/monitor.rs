//! Ingestion staleness monitor

use embassy_futures::select::{Either, select};
use embassy_time::{Instant, Ticker};
use log::info;

use crate::processor::{EdrCore, StopSignal};

/// Periodically discards session state once ingestion has gone silent.
///
/// History survives a stale clear; only [`EdrCore::clear_all`] removes it.
pub struct StalenessMonitor<'a> {
    core: &'a EdrCore,
}

impl<'a> StalenessMonitor<'a> {
    pub fn new(core: &'a EdrCore) -> Self {
        Self { core }
    }

    /// Run a single check at `now`. Returns `true` if state was cleared.
    pub fn check(&self, now: Instant) -> bool {
        self.core.expire_if_stale(now)
    }

    pub async fn run(&self, stop: &StopSignal) {
        let config = self.core.config();
        let mut ticker = Ticker::every(config.stale_check_interval());
        info!(
            "Staleness monitor started (timeout {}s, checked every {}s)",
            config.stale_timeout_secs, config.stale_check_secs
        );

        loop {
            match select(stop.wait(), ticker.next()).await {
                Either::First(()) => break,
                Either::Second(()) => {
                    self.check(Instant::now());
                }
            }
        }

        info!("Staleness monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::MinuteRecord;
    use crate::config::ProcessorConfig;
    use crate::events::EdrEvent;

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    #[test]
    fn idle_core_is_never_stale() {
        let core = EdrCore::new(ProcessorConfig::default()).unwrap();
        let monitor = StalenessMonitor::new(&core);
        assert!(!monitor.check(at(10_000)));
    }

    #[test]
    fn silence_clears_session_but_keeps_history() {
        let core = EdrCore::new(ProcessorConfig::default()).unwrap();
        let mut events = core.subscribe().unwrap();
        let record = MinuteRecord {
            started_at_secs: 0,
            mean_bpm: 14.0,
            hop_count: 6,
            clamped: false,
        };

        core.ingest_at(&[500.0; 1600], at(0));
        let (window, epoch) = core.window_snapshot(1500);
        assert!(core.publish_hop(epoch, Some(window), Some(record)));
        assert_eq!(core.latest_rate(), Some(14.0));

        let monitor = StalenessMonitor::new(&core);
        assert!(!monitor.check(at(120)));
        assert!(!monitor.check(at(300)));
        assert!(monitor.check(at(330)));

        assert_eq!(core.latest_rate(), None);
        assert!(core.recent_samples(50).is_empty());
        assert!(core.latest_window().is_empty());
        assert_eq!(core.rate_history(), vec![14.0]);
        assert_eq!(
            events.try_next_message_pure(),
            Some(EdrEvent::StaleCleared { silent_secs: 330 })
        );

        // Same dropout: nothing more to clear
        assert!(!monitor.check(at(360)));
        assert_eq!(events.try_next_message_pure(), None);
    }

    #[test]
    fn run_returns_once_stopped() {
        let core = EdrCore::new(ProcessorConfig::default()).unwrap();
        let stop = StopSignal::new();
        stop.signal(());
        embassy_futures::block_on(StalenessMonitor::new(&core).run(&stop));
    }

    #[test]
    fn run_checks_periodically_until_stopped() {
        let config = ProcessorConfig {
            stale_timeout_secs: 1,
            stale_check_secs: 1,
            ..ProcessorConfig::default()
        };
        let core = EdrCore::new(config).unwrap();
        let stop = StopSignal::new();
        core.ingest(&[1.0, 2.0, 3.0]);

        std::thread::scope(|s| {
            let monitor = s.spawn(|| {
                embassy_futures::block_on(StalenessMonitor::new(&core).run(&stop));
            });
            std::thread::sleep(std::time::Duration::from_millis(2500));
            stop.signal(());
            assert!(monitor.join().is_ok(), "monitor thread panicked");
        });

        assert!(core.recent_samples(10).is_empty());
        let clears = core
            .recent_events()
            .iter()
            .filter(|e| matches!(e, EdrEvent::StaleCleared { .. }))
            .count();
        assert_eq!(clears, 1, "one clear per dropout");
    }

    #[test]
    fn ingest_rearms_the_monitor() {
        let core = EdrCore::new(ProcessorConfig::default()).unwrap();
        let monitor = StalenessMonitor::new(&core);

        core.ingest_at(&[1.0, 2.0], at(0));
        assert!(monitor.check(at(301)));

        core.ingest_at(&[3.0], at(400));
        assert!(!monitor.check(at(600)));
        assert_eq!(core.recent_samples(10), vec![3.0]);
        assert!(monitor.check(at(701)));
    }
}
