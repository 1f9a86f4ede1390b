//! Threshold-crossing event delivery.
//!
//! The sensor raises a falling-edge, one-shot interrupt when the clear
//! channel crosses the armed threshold. The interrupt context must stay
//! short and must not contend for the device lock, so delivery is split in
//! two: the driver records the armed value ahead of time, and the interrupt
//! handler only snapshots that tag, stamps it and pushes it into a bounded
//! queue. Events fired while nobody is subscribed are dropped.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver};
use portable_atomic::{AtomicBool, AtomicU16, Ordering};

/// Capacity of the event queue; one-shot interrupt discipline keeps the
/// backlog short, further events are dropped while the queue is full.
const QUEUE_DEPTH: usize = 4;

/// One clear-channel threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ThresholdEvent {
    /// Armed threshold value captured when the event configuration was last
    /// read or written.
    pub threshold: u16,
    /// Monotonic timestamp of the interrupt edge, in microseconds.
    pub timestamp_us: u64,
}

/// Fire-and-forget notification channel between the interrupt context and a
/// consumer.
///
/// An `EventChannel` is shared by reference: the driver refreshes the armed
/// tag under its own lock, while [`handle_interrupt`](Self::handle_interrupt)
/// is safe to call from an interrupt handler at any time.
pub struct EventChannel {
    queue: Channel<CriticalSectionRawMutex, ThresholdEvent, QUEUE_DEPTH>,
    subscribed: AtomicBool,
    threshold: AtomicU16,
}

impl EventChannel {
    /// Create an empty, unsubscribed channel.
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            subscribed: AtomicBool::new(false),
            threshold: AtomicU16::new(0),
        }
    }

    /// Start consuming events.
    ///
    /// Stale events queued before this call are discarded, matching the
    /// edge-triggered discipline: a crossing notifies whoever is listening
    /// at that instant, nothing is replayed across subscription changes.
    pub fn subscribe(&self) -> EventSubscription<'_> {
        while self.queue.try_receive().is_ok() {}
        self.subscribed.store(true, Ordering::Release);
        EventSubscription {
            channel: self,
            receiver: self.queue.receiver(),
        }
    }

    /// Record a threshold-crossing edge.
    ///
    /// Called from the interrupt context with a monotonic timestamp. Emits
    /// exactly one event tagged with the pre-read threshold value, or
    /// nothing when no subscriber is active or the queue is full.
    pub fn handle_interrupt(&self, timestamp_us: u64) {
        if !self.subscribed.load(Ordering::Acquire) {
            return;
        }
        let event = ThresholdEvent {
            threshold: self.threshold.load(Ordering::Relaxed),
            timestamp_us,
        };
        let _ = self.queue.try_send(event);
    }

    /// Refresh the tag the interrupt handler attaches to events. Called by
    /// the driver whenever the threshold register pair is read or written.
    pub(crate) fn record_threshold(&self, value: u16) {
        self.threshold.store(value, Ordering::Relaxed);
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Live subscription handle; dropping it stops event delivery.
pub struct EventSubscription<'a> {
    channel: &'a EventChannel,
    receiver: Receiver<'a, CriticalSectionRawMutex, ThresholdEvent, QUEUE_DEPTH>,
}

impl EventSubscription<'_> {
    /// Take the next pending event, if any.
    pub fn try_next(&self) -> Option<ThresholdEvent> {
        self.receiver.try_receive().ok()
    }

    /// Wait for the next event.
    pub async fn next(&self) -> ThresholdEvent {
        self.receiver.receive().await
    }
}

impl Drop for EventSubscription<'_> {
    fn drop(&mut self) {
        self.channel.subscribed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_with_subscriber_emits_single_event() {
        let channel = EventChannel::new();
        channel.record_threshold(0x0123);
        let sub = channel.subscribe();

        channel.handle_interrupt(100);

        assert_eq!(
            sub.try_next(),
            Some(ThresholdEvent {
                threshold: 0x0123,
                timestamp_us: 100,
            })
        );
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn timestamps_preserve_interrupt_order() {
        let channel = EventChannel::new();
        let sub = channel.subscribe();

        channel.handle_interrupt(100);
        channel.handle_interrupt(250);

        let first = sub.try_next().unwrap();
        let second = sub.try_next().unwrap();
        assert!(second.timestamp_us > first.timestamp_us);
    }

    #[test]
    fn interrupt_without_subscriber_is_dropped() {
        let channel = EventChannel::new();

        channel.handle_interrupt(100);

        let sub = channel.subscribe();
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn dropping_subscription_stops_delivery() {
        let channel = EventChannel::new();
        let sub = channel.subscribe();
        drop(sub);

        channel.handle_interrupt(100);

        let sub = channel.subscribe();
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn full_queue_drops_further_events() {
        let channel = EventChannel::new();
        let sub = channel.subscribe();

        for ts in 0..(QUEUE_DEPTH as u64 + 2) {
            channel.handle_interrupt(ts);
        }

        for ts in 0..QUEUE_DEPTH as u64 {
            assert_eq!(sub.try_next().map(|e| e.timestamp_us), Some(ts));
        }
        assert_eq!(sub.try_next(), None);
    }
}
