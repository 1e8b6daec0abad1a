/// Typed drive events and the messages carried by the monitor channel.
use crate::model::DriveInfo;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Connected,
    Disconnected,
    /// The notification could not be classified. Published anyway so the
    /// consumer decides whether to ignore it.
    Unknown,
}

/// One classified attach/detach occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveEvent {
    pub kind: EventKind,
    /// Mount identifier of the affected drive; empty when the notification
    /// did not carry one.
    pub mount_point: String,
    /// Volume properties delivered with the notification, if any.
    pub drive: Option<DriveInfo>,
    /// When the worker decoded the notification.
    pub observed_at: chrono::DateTime<chrono::Local>,
}

impl DriveEvent {
    pub fn new(kind: EventKind, mount_point: impl Into<String>) -> Self {
        Self {
            kind,
            mount_point: mount_point.into(),
            drive: None,
            observed_at: chrono::Local::now(),
        }
    }

    pub fn with_drive(mut self, drive: DriveInfo) -> Self {
        self.drive = Some(drive);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.kind == EventKind::Connected
    }
}

/// Message sent from the monitor worker to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorMessage {
    /// A drive was attached or detached (or something unclassifiable happened).
    Drive(DriveEvent),
    /// The worker has exited, either after `stop` or because the subscription
    /// was lost. Nothing follows until the monitor is started again.
    Closed { reason: String },
}

impl MonitorMessage {
    pub fn event(&self) -> Option<&DriveEvent> {
        match self {
            Self::Drive(event) => Some(event),
            Self::Closed { .. } => None,
        }
    }

    pub fn into_event(self) -> Option<DriveEvent> {
        match self {
            Self::Drive(event) => Some(event),
            Self::Closed { .. } => None,
        }
    }
}
