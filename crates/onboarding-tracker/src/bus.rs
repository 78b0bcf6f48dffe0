use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::OnboardingEvent;

/// A bounded channel-based onboarding event bus
///
/// Uses `try_send` for non-blocking emission. If the channel is full or the
/// receiver is gone, events are dropped and counted in the `dropped` counter.
pub struct EventBus {
    tx: mpsc::Sender<OnboardingEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    /// Returns the bus (for emitting events) and the receiver (for consuming events)
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OnboardingEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// A bus whose receiver is already gone. Every emit is counted as dropped.
    pub fn detached() -> Self {
        let (bus, _rx) = Self::new(1);
        bus
    }

    pub fn emit(&self, event: OnboardingEvent) {
        if self.tx.try_send(event).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!("onboarding event dropped ({} total)", dropped);
        }
    }

    /// Tell the consumer how many events it missed. Failures are not counted.
    pub fn emit_dropped_notification(&self) {
        let count = self.dropped_count();
        if count > 0 {
            let _ = self.tx.try_send(OnboardingEvent::EventsDropped { count });
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}
