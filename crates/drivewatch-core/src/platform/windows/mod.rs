/// WMI device service.
///
/// Queries are WQL against `ROOT\CIMV2` (or the namespace a query names).
/// Drive notifications come from a semisynchronous
/// `__InstanceOperationEvent` query, which WMI evaluates by polling
/// `Win32_LogicalDisk` every few seconds.
mod com;

pub use com::CIMV2_NAMESPACE;

use crate::error::{DriveError, Result};
use crate::model::drive::VOLUME_FIELDS;
use crate::model::EventKind;
use crate::platform::{chains, wql};
use crate::service::{DeviceService, EventSource, Query, RawEvent, Row};
use crate::unique_id::ProviderChain;
use ::windows::Win32::System::Wmi::IEnumWbemClassObject;
use com::Session;
use std::time::Duration;
use tracing::{debug, warn};

pub const LOGICAL_DISK: &str = "Win32_LogicalDisk";

const CREATION_EVENT: &str = "__InstanceCreationEvent";
const DELETION_EVENT: &str = "__InstanceDeletionEvent";

#[derive(Debug, Default)]
pub struct WmiService;

impl WmiService {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceService for WmiService {
    type Events = WmiEvents;

    const LOGICAL_DISKS: &'static str = LOGICAL_DISK;

    fn subscribe(&self) -> Result<WmiEvents> {
        let session = Session::connect(CIMV2_NAMESPACE)
            .map_err(|e| DriveError::Subscription(e.to_string()))?;
        let enumerator = session
            .notifications(wql::DRIVE_NOTIFICATION_QUERY)
            .map_err(|e| DriveError::Subscription(e.to_string()))?;

        debug!("WMI: drive notification query registered");
        Ok(WmiEvents {
            enumerator,
            _session: session,
        })
    }

    fn query(&self, query: &Query) -> Result<Vec<Row>> {
        let namespace = query.namespace.as_deref().unwrap_or(CIMV2_NAMESPACE);
        let wql = wql::render(query);

        let rows = Session::connect(namespace)
            .and_then(|session| session.query(&wql, &query.fields))
            .map_err(|e| {
                warn!("WMI: '{}' failed: {}", wql, e);
                DriveError::query(query.provider.clone(), e)
            })?;

        debug!("WMI: '{}' returned {} rows", wql, rows.len());
        Ok(rows)
    }

    fn event_kind(&self, class: &str) -> EventKind {
        match class {
            CREATION_EVENT => EventKind::Connected,
            DELETION_EVENT => EventKind::Disconnected,
            _ => EventKind::Unknown,
        }
    }

    fn provider_chains(&self) -> Vec<ProviderChain> {
        chains::wmi::chains()
    }
}

/// A live notification query. Created and dropped on the monitor thread.
pub struct WmiEvents {
    // Released before the session that owns the apartment.
    enumerator: IEnumWbemClassObject,
    _session: Session,
}

impl EventSource for WmiEvents {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<RawEvent>> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let fetched = com::next_object(&self.enumerator, timeout_ms)
            .map_err(|e| DriveError::SubscriptionLost(e.to_string()))?;

        let Some(event) = fetched.object else {
            if fetched.timed_out {
                return Ok(None);
            }
            return Err(DriveError::SubscriptionLost(
                "notification query ended".into(),
            ));
        };

        let class = com::get(&event, "__CLASS").and_then(|v| v.as_text());
        let fields: Vec<String> = VOLUME_FIELDS.iter().map(|f| f.to_string()).collect();
        let target = com::get_object(&event, "TargetInstance")
            .map(|instance| com::read_row(&instance, &fields));

        Ok(Some(RawEvent { class, target }))
    }
}
