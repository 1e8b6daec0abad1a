/// Bounded, non-blocking delivery of monitor messages to the consumer.
///
/// The worker must never stall on a slow consumer, so sends are `try_send`
/// and a full channel is resolved by the configured [`OverflowPolicy`]. The
/// publisher holds a clone of the receiving end so that it can evict the
/// oldest message itself.
use crate::config::OverflowPolicy;
use crate::model::MonitorMessage;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use tracing::warn;

/// Wake-up callback invoked after each published message.
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

/// Eviction attempts before giving up on one message. Only reachable while
/// another producer keeps refilling the channel.
const MAX_EVICTIONS: usize = 4;

pub(crate) struct Publisher {
    tx: Sender<MonitorMessage>,
    evict: Receiver<MonitorMessage>,
    policy: OverflowPolicy,
    notifier: Option<Notifier>,
    dropped: u64,
}

impl Publisher {
    pub(crate) fn new(
        tx: Sender<MonitorMessage>,
        evict: Receiver<MonitorMessage>,
        policy: OverflowPolicy,
        notifier: Option<Notifier>,
    ) -> Self {
        Self {
            tx,
            evict,
            policy,
            notifier,
            dropped: 0,
        }
    }

    /// Enqueue `msg` according to the overflow policy.
    pub(crate) fn publish(&mut self, msg: MonitorMessage) {
        let delivered = match self.policy {
            OverflowPolicy::DropOldest => self.send_evicting(msg),
            OverflowPolicy::DropNewest => match self.tx.try_send(msg) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    warn!(
                        "Monitor: consumer channel full, dropped newest message ({} total)",
                        self.dropped
                    );
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        };

        if delivered {
            self.notify();
        }
    }

    /// Enqueue the terminal marker. It is never the message that gets dropped.
    pub(crate) fn publish_closed(&mut self, reason: String) {
        if self.send_evicting(MonitorMessage::Closed { reason }) {
            self.notify();
        }
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }

    fn send_evicting(&mut self, mut msg: MonitorMessage) -> bool {
        for _ in 0..MAX_EVICTIONS {
            match self.tx.try_send(msg) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    msg = back;
                    // The consumer may have drained in between; then there is
                    // nothing to evict and the retry simply succeeds.
                    if self.evict.try_recv().is_ok() {
                        self.dropped += 1;
                        warn!(
                            "Monitor: consumer channel full, dropped oldest message ({} total)",
                            self.dropped
                        );
                    }
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
        self.dropped += 1;
        false
    }

    fn notify(&self) {
        if let Some(notifier) = &self.notifier {
            notifier();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DriveEvent, EventKind};
    use crossbeam_channel::bounded;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(mount: &str) -> MonitorMessage {
        MonitorMessage::Drive(DriveEvent::new(EventKind::Connected, mount))
    }

    fn mounts(rx: &Receiver<MonitorMessage>) -> Vec<String> {
        rx.try_iter()
            .filter_map(MonitorMessage::into_event)
            .map(|e| e.mount_point)
            .collect()
    }

    #[test]
    fn test_drop_oldest_keeps_latest() {
        let (tx, rx) = bounded(2);
        let mut publisher = Publisher::new(tx, rx.clone(), OverflowPolicy::DropOldest, None);
        for mount in ["D:", "E:", "F:"] {
            publisher.publish(event(mount));
        }
        assert_eq!(publisher.dropped(), 1);
        assert_eq!(mounts(&rx), vec!["E:", "F:"]);
    }

    #[test]
    fn test_drop_newest_keeps_earliest() {
        let (tx, rx) = bounded(2);
        let mut publisher = Publisher::new(tx, rx.clone(), OverflowPolicy::DropNewest, None);
        for mount in ["D:", "E:", "F:"] {
            publisher.publish(event(mount));
        }
        assert_eq!(publisher.dropped(), 1);
        assert_eq!(mounts(&rx), vec!["D:", "E:"]);
    }

    #[test]
    fn test_closed_marker_is_always_enqueued() {
        let (tx, rx) = bounded(1);
        let mut publisher = Publisher::new(tx, rx.clone(), OverflowPolicy::DropNewest, None);
        publisher.publish(event("D:"));
        publisher.publish_closed("gone".into());
        let last: Vec<MonitorMessage> = rx.try_iter().collect();
        assert_eq!(
            last,
            vec![MonitorMessage::Closed {
                reason: "gone".into()
            }]
        );
    }

    #[test]
    fn test_notifier_called_per_delivery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let notifier: Notifier = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (tx, rx) = bounded(1);
        let mut publisher = Publisher::new(tx, rx, OverflowPolicy::DropNewest, Some(notifier));
        publisher.publish(event("D:"));
        publisher.publish(event("E:")); // dropped, no wake-up
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
