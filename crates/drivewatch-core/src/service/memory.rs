/// A scripted, in-memory device service.
///
/// Tables are plain rows keyed by `(namespace, provider)`; queries filter by
/// equality on the text value and project the requested fields. Events are
/// fed through an unbounded channel shared by all subscriptions, so a test
/// can push events before or after `start`.
///
/// Event classes use the udev vocabulary: `add` connects, `remove`
/// disconnects, anything else is unknown.
use crate::error::{DriveError, Result};
use crate::model::EventKind;
use crate::service::{DeviceService, EventSource, Query, RawEvent, Row};
use crate::unique_id::ProviderChain;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Logical-disk provider name of the in-memory service.
pub const LOGICAL_DISK: &str = "LogicalDisk";

enum Feed {
    Event(RawEvent),
    Lost(String),
}

type TableKey = (Option<String>, String);

pub struct MemoryService {
    tables: Mutex<HashMap<TableKey, Vec<Row>>>,
    chains: Mutex<Vec<ProviderChain>>,
    subscribe_error: Mutex<Option<String>>,
    feed_tx: Sender<Feed>,
    feed_rx: Receiver<Feed>,
    active: Arc<AtomicUsize>,
    subscriptions: AtomicUsize,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    pub fn new() -> Self {
        let (feed_tx, feed_rx) = unbounded();
        Self {
            tables: Mutex::new(HashMap::new()),
            chains: Mutex::new(Vec::new()),
            subscribe_error: Mutex::new(None),
            feed_tx,
            feed_rx,
            active: Arc::new(AtomicUsize::new(0)),
            subscriptions: AtomicUsize::new(0),
        }
    }

    /// Add a row to `provider` in the default namespace.
    pub fn insert(&self, provider: &str, row: Row) {
        self.insert_in(None, provider, row);
    }

    pub fn insert_in(&self, namespace: Option<&str>, provider: &str, row: Row) {
        self.tables
            .lock()
            .entry((namespace.map(str::to_owned), provider.to_owned()))
            .or_default()
            .push(row);
    }

    /// Remove every row of every provider.
    pub fn clear(&self) {
        self.tables.lock().clear();
    }

    pub fn set_chains(&self, chains: Vec<ProviderChain>) {
        *self.chains.lock() = chains;
    }

    /// Make the next subscriptions fail with `reason` (`None` to recover).
    pub fn fail_subscriptions(&self, reason: Option<&str>) {
        *self.subscribe_error.lock() = reason.map(str::to_owned);
    }

    /// Deliver `event` to the current (or next) subscription.
    pub fn push_event(&self, event: RawEvent) {
        let _ = self.feed_tx.send(Feed::Event(event));
    }

    /// Make the subscription fail permanently on its next wait.
    pub fn sever(&self, reason: &str) {
        let _ = self.feed_tx.send(Feed::Lost(reason.to_owned()));
    }

    /// Subscriptions currently alive (created and not yet dropped).
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Successful `subscribe` calls so far.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

pub struct MemoryEvents {
    feed: Receiver<Feed>,
    active: Arc<AtomicUsize>,
}

impl EventSource for MemoryEvents {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<RawEvent>> {
        match self.feed.recv_timeout(timeout) {
            Ok(Feed::Event(event)) => Ok(Some(event)),
            Ok(Feed::Lost(reason)) => Err(DriveError::SubscriptionLost(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(DriveError::SubscriptionLost("event feed closed".into()))
            }
        }
    }
}

impl Drop for MemoryEvents {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DeviceService for MemoryService {
    type Events = MemoryEvents;

    const LOGICAL_DISKS: &'static str = LOGICAL_DISK;

    fn subscribe(&self) -> Result<MemoryEvents> {
        if let Some(reason) = self.subscribe_error.lock().clone() {
            return Err(DriveError::Subscription(reason));
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryEvents {
            feed: self.feed_rx.clone(),
            active: Arc::clone(&self.active),
        })
    }

    fn query(&self, query: &Query) -> Result<Vec<Row>> {
        let tables = self.tables.lock();
        let Some(rows) = tables.get(&(query.namespace.clone(), query.provider.clone())) else {
            return Ok(Vec::new());
        };

        Ok(query.select(rows))
    }

    fn event_kind(&self, class: &str) -> EventKind {
        match class {
            "add" => EventKind::Connected,
            "remove" => EventKind::Disconnected,
            _ => EventKind::Unknown,
        }
    }

    fn provider_chains(&self) -> Vec<ProviderChain> {
        self.chains.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::RawValue;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), RawValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_query_filters_and_projects() {
        let service = MemoryService::new();
        service.insert("Disk", row(&[("id", "1"), ("serial", "AAA"), ("extra", "x")]));
        service.insert("Disk", row(&[("id", "2"), ("serial", "BBB")]));

        let rows = service
            .query(&Query::new("Disk", ["serial"]).filter("id", "2"))
            .unwrap();
        assert_eq!(rows, vec![row(&[("serial", "BBB")])]);
    }

    #[test]
    fn test_query_unknown_provider_is_empty() {
        let service = MemoryService::new();
        assert!(service.query(&Query::new("Nope", ["a"])).unwrap().is_empty());
    }

    #[test]
    fn test_namespaces_are_separate() {
        let service = MemoryService::new();
        service.insert_in(Some("storage"), "Disk", row(&[("id", "1")]));
        assert!(service.query(&Query::new("Disk", ["id"])).unwrap().is_empty());
        assert_eq!(
            service
                .query(&Query::new("Disk", ["id"]).in_namespace("storage"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_subscription_tracking() {
        let service = MemoryService::new();
        let mut events = service.subscribe().unwrap();
        assert_eq!(service.active_subscriptions(), 1);

        service.push_event(RawEvent::default());
        assert_eq!(
            events.next_event(Duration::from_millis(100)).unwrap(),
            Some(RawEvent::default())
        );
        assert_eq!(events.next_event(Duration::from_millis(10)).unwrap(), None);

        service.sever("unplugged");
        assert!(events.next_event(Duration::from_millis(100)).is_err());

        drop(events);
        assert_eq!(service.active_subscriptions(), 0);
        assert_eq!(service.subscription_count(), 1);
    }

    #[test]
    fn test_failing_subscription() {
        let service = MemoryService::new();
        service.fail_subscriptions(Some("service down"));
        assert!(matches!(
            service.subscribe(),
            Err(DriveError::Subscription(_))
        ));
        service.fail_subscriptions(None);
        assert!(service.subscribe().is_ok());
    }
}
