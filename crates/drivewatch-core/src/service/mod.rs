/// The boundary to the OS device service.
///
/// The core needs exactly two things from the operating system:
///
/// - a notification subscription that yields raw attach/detach events with a
///   bounded wait ([`DeviceService::subscribe`] / [`EventSource::next_event`]);
/// - a synchronous field query that takes a provider (class) name, a list of
///   field names and an optional equality filter, and returns zero or more
///   rows of raw values ([`DeviceService::query`]).
///
/// Platform services live in [`crate::platform`]; [`memory::MemoryService`]
/// is a scripted stand-in for tests and host-side integration tests.
pub mod memory;

use crate::error::Result;
use crate::model::EventKind;
use crate::unique_id::ProviderChain;
use std::collections::BTreeMap;
use std::time::Duration;

/// A single raw property value as reported by the device service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Null,
    Text(String),
    U32(u32),
    U64(u64),
    Bool(bool),
}

impl RawValue {
    /// Render the value as text. `Null` yields `None`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            Self::U32(v) => Some(v.to_string()),
            Self::U64(v) => Some(v.to_string()),
            Self::Bool(v) => Some(v.to_string()),
        }
    }

    /// Numeric view; text is parsed when it holds a plain integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null | Self::Bool(_) => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u32> for RawValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<u64> for RawValue {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

/// One result row: field name to raw value.
pub type Row = BTreeMap<String, RawValue>;

/// Text of `field` in `row`, or an empty string when missing or null.
pub fn text_field(row: &Row, field: &str) -> String {
    row.get(field).and_then(RawValue::as_text).unwrap_or_default()
}

/// `field = value` restriction on a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

/// A field query against one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Provider namespace; `None` selects the service's default namespace.
    pub namespace: Option<String>,
    pub provider: String,
    pub fields: Vec<String>,
    pub filter: Option<Filter>,
}

impl Query {
    pub fn new<I, F>(provider: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            namespace: None,
            provider: provider.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            filter: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Whether `row` passes the filter, comparing text renderings.
    pub fn matches(&self, row: &Row) -> bool {
        match &self.filter {
            Some(filter) => row
                .get(&filter.field)
                .and_then(RawValue::as_text)
                .is_some_and(|v| v == filter.value),
            None => true,
        }
    }

    /// The requested fields of `row`. Fields the row lacks are left out.
    pub fn project(&self, row: &Row) -> Row {
        self.fields
            .iter()
            .filter_map(|field| row.get(field).map(|v| (field.clone(), v.clone())))
            .collect()
    }

    /// Filter and project an in-memory table.
    pub fn select<'a>(&self, rows: impl IntoIterator<Item = &'a Row>) -> Vec<Row> {
        rows.into_iter()
            .filter(|row| self.matches(row))
            .map(|row| self.project(row))
            .collect()
    }
}

/// A notification exactly as the service delivered it.
///
/// `class` names the kind of occurrence in the service's own vocabulary
/// (e.g. `__InstanceCreationEvent`, `add`); `target` holds the properties of
/// the affected volume. Either may be missing on a malformed delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    pub class: Option<String>,
    pub target: Option<Row>,
}

/// Field holding the mount identifier in volume rows and event targets.
pub const MOUNT_FIELD: &str = "DeviceID";

/// An established notification subscription.
///
/// Owned by the thread that created it and released when dropped.
pub trait EventSource {
    /// Wait at most `timeout` for the next event.
    ///
    /// `Ok(None)` means the wait timed out. `Err` means the subscription is
    /// gone for good; the caller will not call `next_event` again.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<RawEvent>>;
}

/// The OS device/volume management service.
pub trait DeviceService: Send + Sync + 'static {
    type Events: EventSource;

    /// Provider that lists logical disks (mounted volumes).
    const LOGICAL_DISKS: &'static str;

    /// Establish a notification subscription on the calling thread.
    fn subscribe(&self) -> Result<Self::Events>;

    /// Run a field query. No matching rows is `Ok(vec![])`, not an error.
    fn query(&self, query: &Query) -> Result<Vec<Row>>;

    /// Map a raw event class onto the typed event kind.
    fn event_kind(&self, class: &str) -> EventKind;

    /// Identifier provider chains, highest priority first.
    fn provider_chains(&self) -> Vec<ProviderChain>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value_text() {
        assert_eq!(RawValue::Null.as_text(), None);
        assert_eq!(RawValue::from("E:").as_text().as_deref(), Some("E:"));
        assert_eq!(RawValue::U32(2).as_text().as_deref(), Some("2"));
    }

    #[test]
    fn test_raw_value_numbers() {
        assert_eq!(RawValue::from("31020957696").as_u64(), Some(31_020_957_696));
        assert_eq!(RawValue::from("31020957696").as_u32(), None);
        assert_eq!(RawValue::from("not a number").as_u64(), None);
        assert_eq!(RawValue::U32(7).as_u32(), Some(7));
    }

    #[test]
    fn test_query_builder() {
        let q = Query::new("Win32_DiskDrive", ["Signature", "PNPDeviceID"])
            .in_namespace("ROOT\\CIMV2")
            .filter("__PATH", "x");
        assert_eq!(q.fields, vec!["Signature", "PNPDeviceID"]);
        assert_eq!(q.namespace.as_deref(), Some("ROOT\\CIMV2"));
        assert_eq!(q.filter.unwrap().value, "x");
    }

    #[test]
    fn test_select() {
        let row = |id: &str, serial: &str| -> Row {
            [("id", id), ("serial", serial), ("extra", "x")]
                .into_iter()
                .map(|(k, v)| (k.to_owned(), RawValue::from(v)))
                .collect()
        };
        let table = vec![row("1", "AAA"), row("2", "BBB")];

        let q = Query::new("Disk", ["serial", "missing"]).filter("id", "2");
        let rows = q.select(&table);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
        assert_eq!(text_field(&rows[0], "serial"), "BBB");

        assert_eq!(Query::new("Disk", ["id"]).select(&table).len(), 2);
    }

    #[test]
    fn test_text_field_missing_is_empty() {
        let mut row = Row::new();
        row.insert("A".into(), RawValue::Null);
        assert_eq!(text_field(&row, "A"), "");
        assert_eq!(text_field(&row, "B"), "");
    }
}
