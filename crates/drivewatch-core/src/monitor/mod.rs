/// Drive attach/detach monitor.
///
/// [`DriveNotify`] owns one background thread while running. The thread
/// creates the OS subscription itself, waits for events with a bounded
/// timeout, decodes each raw notification into a [`DriveEvent`] and publishes
/// it on a bounded `crossbeam-channel`.
///
/// # Usage
///
/// ```ignore
/// let mut notify = DriveNotify::new(service);
/// notify.start()?;
/// for msg in notify.receiver().iter() { /* ... */ }
/// notify.stop();
/// ```
///
/// # Lifecycle
///
/// `Idle --start--> Running --stop--> Stopping --join--> Stopped`
///
/// `start` while running is rejected; `stop` while idle or stopped does
/// nothing. A stopped monitor can be started again. `stop` joins the worker,
/// so nothing is published after it returns and the subscription has been
/// released on the worker thread.
///
/// Every run ends with exactly one [`MonitorMessage::Closed`]: the error
/// text after a subscription loss, or [`STOPPED_REASON`] after `stop`. The
/// channel itself stays open for the next `start`, so consumers iterating
/// [`DriveNotify::receiver`] should break on `Closed`.
///
/// # Cancellation
///
/// `stop` sets a shared `AtomicBool`. The worker checks it between waits,
/// each wait being at most [`MonitorConfig::poll_interval`] long.
mod publisher;

pub use publisher::Notifier;

use crate::config::MonitorConfig;
use crate::error::{DriveError, Result};
use crate::model::{DriveEvent, DriveInfo, EventKind, MonitorMessage};
use crate::service::{DeviceService, EventSource, RawEvent};
use crossbeam_channel::{bounded, Receiver, Sender};
use publisher::Publisher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

pub struct DriveNotify<S: DeviceService> {
    service: Arc<S>,
    config: MonitorConfig,
    state: MonitorState,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    sender: Sender<MonitorMessage>,
    receiver: Receiver<MonitorMessage>,
    notifier: Option<Notifier>,
}

impl<S: DeviceService> DriveNotify<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self::with_config(service, MonitorConfig::default())
    }

    pub fn with_config(service: Arc<S>, config: MonitorConfig) -> Self {
        let (sender, receiver) = bounded(config.capacity());
        Self {
            service,
            config,
            state: MonitorState::Idle,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            sender,
            receiver,
            notifier: None,
        }
    }

    /// Call `notifier` on the worker thread after every published message.
    ///
    /// Takes effect on the next `start`.
    pub fn with_notifier(mut self, notifier: impl Fn() + Send + Sync + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Current lifecycle state.
    ///
    /// A worker that exited on its own after losing its subscription is
    /// reported as `Stopped`; call [`stop`](Self::stop) to reap it.
    pub fn state(&self) -> MonitorState {
        match (&self.worker, self.state) {
            (Some(worker), MonitorState::Running) if worker.is_finished() => MonitorState::Stopped,
            (_, state) => state,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// Spawn the worker and establish the OS subscription.
    ///
    /// Returns once the worker reports whether subscribing succeeded, so a
    /// subscription failure is seen here rather than on the channel.
    pub fn start(&mut self) -> Result<()> {
        if self.state() == MonitorState::Running {
            return Err(DriveError::AlreadyRunning);
        }
        // Reap a worker that ended after a subscription loss.
        self.stop();

        self.stop_flag.store(false, Ordering::Release);

        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let service = Arc::clone(&self.service);
        let stop_flag = Arc::clone(&self.stop_flag);
        let poll_interval = self.config.poll_interval();
        let publisher = Publisher::new(
            self.sender.clone(),
            self.receiver.clone(),
            self.config.overflow,
            self.notifier.clone(),
        );

        let handle = thread::Builder::new()
            .name("drivewatch-notify".to_owned())
            .spawn(move || {
                let source = match service.subscribe() {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_worker(&*service, source, &stop_flag, poll_interval, publisher);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(handle);
                self.state = MonitorState::Running;
                info!("Drive monitor started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                warn!("Drive monitor failed to start: {}", e);
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(DriveError::Subscription(
                    "monitor thread exited before subscribing".into(),
                ))
            }
        }
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };

        self.state = MonitorState::Stopping;
        self.stop_flag.store(true, Ordering::Release);
        if handle.join().is_err() {
            warn!("Drive monitor thread panicked");
        }
        self.state = MonitorState::Stopped;
        info!("Drive monitor stopped");
    }

    /// A receiver for the monitor's messages. Messages are delivered once,
    /// to whichever receiver clone takes them first.
    pub fn receiver(&self) -> Receiver<MonitorMessage> {
        self.receiver.clone()
    }

    /// Take the oldest queued message, if any.
    pub fn try_next(&self) -> Option<MonitorMessage> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message.
    pub fn next_timeout(&self, timeout: Duration) -> Option<MonitorMessage> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

impl<S: DeviceService> Drop for DriveNotify<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Background thread ──────────────────────────────────────────────────────

/// `Closed` reason published when the worker ends because of `stop`.
pub const STOPPED_REASON: &str = "stopped";

fn run_worker<S: DeviceService>(
    service: &S,
    mut source: S::Events,
    stop_flag: &AtomicBool,
    poll_interval: Duration,
    mut publisher: Publisher,
) {
    debug!("Monitor: worker running");

    let reason = loop {
        if stop_flag.load(Ordering::Acquire) {
            break STOPPED_REASON.to_owned();
        }
        match source.next_event(poll_interval) {
            Ok(None) => continue,
            Ok(Some(raw)) => {
                let event = decode(service, raw);
                debug!("Monitor: {:?} {}", event.kind, event.mount_point);
                publisher.publish(MonitorMessage::Drive(event));
            }
            Err(e) => {
                warn!("Monitor: {}", e);
                break e.to_string();
            }
        }
    };

    // The subscription is released here, on the thread that created it.
    drop(source);
    publisher.publish_closed(reason);
    debug!("Monitor: worker exited, {} messages dropped", publisher.dropped());
}

/// Classify a raw notification.
///
/// An unrecognized class, a missing target or a target without a mount
/// identifier all yield an `Unknown` event carrying whatever mount
/// identifier could be read.
pub fn decode<S: DeviceService>(service: &S, raw: RawEvent) -> DriveEvent {
    let kind = raw
        .class
        .as_deref()
        .map_or(EventKind::Unknown, |class| service.event_kind(class));

    let Some(target) = raw.target else {
        return DriveEvent::new(EventKind::Unknown, "");
    };

    let drive = DriveInfo::from_row(&target);
    let kind = if drive.mount_point.is_empty() {
        EventKind::Unknown
    } else {
        kind
    };
    DriveEvent::new(kind, drive.mount_point.clone()).with_drive(drive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::memory::MemoryService;
    use crate::service::{RawValue, Row};

    fn target(mount: &str) -> Option<Row> {
        let mut row = Row::new();
        row.insert("DeviceID".into(), RawValue::from(mount));
        row.insert("DriveType".into(), RawValue::U32(2));
        Some(row)
    }

    #[test]
    fn test_decode_connect_and_disconnect() {
        let service = MemoryService::new();
        let added = decode(
            &service,
            RawEvent {
                class: Some("add".into()),
                target: target("E:"),
            },
        );
        assert_eq!(added.kind, EventKind::Connected);
        assert_eq!(added.mount_point, "E:");
        assert!(added.drive.as_ref().is_some_and(DriveInfo::is_removable));

        let removed = decode(
            &service,
            RawEvent {
                class: Some("remove".into()),
                target: target("E:"),
            },
        );
        assert_eq!(removed.kind, EventKind::Disconnected);
    }

    #[test]
    fn test_decode_unknown_class_keeps_mount() {
        let service = MemoryService::new();
        let event = decode(
            &service,
            RawEvent {
                class: Some("__InstanceModificationEvent".into()),
                target: target("F:"),
            },
        );
        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.mount_point, "F:");
    }

    #[test]
    fn test_decode_malformed() {
        let service = MemoryService::new();

        let no_target = decode(
            &service,
            RawEvent {
                class: Some("add".into()),
                target: None,
            },
        );
        assert_eq!(no_target.kind, EventKind::Unknown);
        assert_eq!(no_target.mount_point, "");
        assert!(no_target.drive.is_none());

        let no_mount = decode(
            &service,
            RawEvent {
                class: Some("add".into()),
                target: Some(Row::new()),
            },
        );
        assert_eq!(no_mount.kind, EventKind::Unknown);

        let nothing = decode(&service, RawEvent::default());
        assert_eq!(nothing.kind, EventKind::Unknown);
    }

    #[test]
    fn test_new_monitor_is_idle() {
        let notify = DriveNotify::new(Arc::new(MemoryService::new()));
        assert_eq!(notify.state(), MonitorState::Idle);
        assert!(notify.try_next().is_none());
    }
}
