//! Processing events fanned out to reporting sinks
//!
//! The hop worker and staleness monitor publish on the core's channel with
//! immediate publishing, so a slow subscriber loses its oldest message
//! instead of stalling the workers. The core also keeps the last
//! [`RECENT_EVENTS_CAPACITY`] events for readers that poll instead of
//! subscribing.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Subscriber};

use crate::aggregator::MinuteRecord;
use crate::processor::HopOutcome;

/// Channel capacity for processing events
/// Sized for a few minutes of hops at the default 10s interval
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Number of subscribers that can listen to processing events
/// - Subscriber 0: reporting / plot sink
/// - Subscriber 1: history persistence
pub const EVENT_SUBSCRIBERS: usize = 2;

/// Regular (awaiting) publishers. Workers only use immediate publishing.
pub const EVENT_PUBLISHERS: usize = 1;

/// Events retained for late readers, oldest dropped first
pub const RECENT_EVENTS_CAPACITY: usize = 500;

pub type EventChannel = PubSubChannel<
    CriticalSectionRawMutex,
    EdrEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type EventSubscriber<'a> = Subscriber<
    'a,
    CriticalSectionRawMutex,
    EdrEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdrEvent {
    /// A hop tick finished
    HopCompleted { at_secs: u64, outcome: HopOutcome },
    /// A minute closed and was appended to the history
    MinuteRollup(MinuteRecord),
    /// Ingestion went silent and session state was discarded
    StaleCleared { silent_secs: u64 },
    /// Administrative reset of all state
    Cleared,
}
