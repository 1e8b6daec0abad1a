/// Unique drive identifier resolution.
///
/// A drive's identity is assembled from several device-service providers.
/// Each [`ProviderChain`] walks from the mount point down to lower-level
/// objects (logical disk → partition → physical disk, or volume → storage
/// disk), one [`Link`] per query. Every link selects a few fields, optionally
/// reformats them with a [`Converter`], and stores them in identity slots; one
/// designated field (`carry`) becomes the lookup key of the next link.
///
/// # Fallback policy
///
/// - A link with no rows, an empty carry value or a failed query ends its
///   chain. Slots already filled by that chain are kept.
/// - Chains run in priority order and a slot is only ever filled once, so the
///   value from the higher-priority chain wins.
/// - An identity with no slots at all is the "unknown" answer, not an error.
use crate::model::{IdSlot, UniqueDriveIdentity};
use crate::service::{DeviceService, Query, RawValue, Row};
use std::sync::Arc;
use tracing::debug;

pub use crate::model::identity::DEFAULT_SEPARATOR;

/// Turns a raw field value into its identity string.
pub type Converter = fn(&RawValue) -> String;

/// Reshapes a lookup key before it is used in a link's filter.
pub type KeyTransform = fn(&str) -> String;

/// A field selected by a link.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub slot: IdSlot,
    /// Applied to the raw value; plain text rendering when `None`.
    pub convert: Option<Converter>,
}

impl FieldSpec {
    pub fn text(name: &'static str, slot: IdSlot) -> Self {
        Self {
            name,
            slot,
            convert: None,
        }
    }

    pub fn converted(name: &'static str, slot: IdSlot, convert: Converter) -> Self {
        Self {
            name,
            slot,
            convert: Some(convert),
        }
    }

    fn extract(&self, row: &Row) -> String {
        let Some(raw) = row.get(self.name) else {
            return String::new();
        };
        match self.convert {
            Some(convert) => convert(raw),
            None => raw.as_text().unwrap_or_default(),
        }
    }
}

/// One query step of a chain.
#[derive(Debug, Clone)]
pub struct Link {
    pub namespace: Option<&'static str>,
    pub provider: &'static str,
    /// Field compared against the incoming key.
    pub key_field: &'static str,
    pub key_transform: Option<KeyTransform>,
    /// Field whose value keys the next link.
    pub carry: Option<&'static str>,
    pub fields: Vec<FieldSpec>,
}

impl Link {
    pub fn new(provider: &'static str, key_field: &'static str) -> Self {
        Self {
            namespace: None,
            provider,
            key_field,
            key_transform: None,
            carry: None,
            fields: Vec::new(),
        }
    }

    pub fn namespace(mut self, namespace: &'static str) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn key_transform(mut self, transform: KeyTransform) -> Self {
        self.key_transform = Some(transform);
        self
    }

    pub fn carry(mut self, field: &'static str) -> Self {
        self.carry = Some(field);
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    fn query(&self, key: &str) -> Query {
        let mut names: Vec<&str> = Vec::with_capacity(self.fields.len() + 1);
        if let Some(carry) = self.carry {
            names.push(carry);
        }
        for spec in &self.fields {
            if !names.contains(&spec.name) {
                names.push(spec.name);
            }
        }

        let query = Query::new(self.provider, names).filter(self.key_field, key);
        match self.namespace {
            Some(ns) => query.in_namespace(ns),
            None => query,
        }
    }
}

/// An ordered sequence of links from a mount point down to device properties.
#[derive(Debug, Clone)]
pub struct ProviderChain {
    pub name: &'static str,
    pub links: Vec<Link>,
}

impl ProviderChain {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            links: Vec::new(),
        }
    }

    pub fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }
}

/// Resolves mount points to [`UniqueDriveIdentity`] values.
pub struct UniqueDriveId<S: DeviceService> {
    service: Arc<S>,
    chains: Vec<ProviderChain>,
}

impl<S: DeviceService> UniqueDriveId<S> {
    /// Use the service's own provider chains.
    pub fn new(service: Arc<S>) -> Self {
        let chains = service.provider_chains();
        Self { service, chains }
    }

    /// Use explicit chains, highest priority first.
    pub fn with_chains(service: Arc<S>, chains: Vec<ProviderChain>) -> Self {
        Self { service, chains }
    }

    /// Resolve the identity of the drive mounted at `mount_point`.
    ///
    /// `mount_point` has no trailing separator: `"E:"`, `"/media/usb"`.
    pub fn resolve(&self, mount_point: &str) -> UniqueDriveIdentity {
        let mut identity = UniqueDriveIdentity::new();
        if mount_point.is_empty() {
            return identity;
        }

        for chain in &self.chains {
            self.walk(chain, mount_point, &mut identity);
            if identity.is_complete() {
                break;
            }
        }

        debug!(
            "Resolved {} of {} id slots for {}",
            identity.len(),
            IdSlot::ALL.len(),
            mount_point
        );
        identity
    }

    /// Concatenated, upper-cased unique id of the drive at `mount_point`,
    /// parts joined by `separator` (`None` selects [`DEFAULT_SEPARATOR`]).
    ///
    /// `None` unless every identity slot could be resolved.
    pub fn unique_id(&self, mount_point: &str, separator: Option<char>) -> Option<String> {
        self.resolve(mount_point).to_unique_string(separator)
    }

    fn walk(&self, chain: &ProviderChain, mount_point: &str, identity: &mut UniqueDriveIdentity) {
        let mut key = mount_point.to_owned();

        for (step, link) in chain.links.iter().enumerate() {
            let key_value = match link.key_transform {
                Some(transform) => transform(&key),
                None => key.clone(),
            };
            if key_value.is_empty() {
                debug!("Chain {}: empty key at step {}", chain.name, step);
                return;
            }

            let rows = match self.service.query(&link.query(&key_value)) {
                Ok(rows) => rows,
                Err(e) => {
                    debug!("Chain {}: {} failed: {}", chain.name, link.provider, e);
                    return;
                }
            };

            // Links are one-to-one; a second row would be ambiguous anyway.
            let Some(row) = rows.first() else {
                debug!("Chain {}: no {} rows", chain.name, link.provider);
                return;
            };

            for spec in &link.fields {
                identity.fill(spec.slot, spec.extract(row));
            }

            match link.carry {
                Some(carry) => {
                    key = row.get(carry).and_then(RawValue::as_text).unwrap_or_default();
                }
                None => return,
            }
        }
    }
}

// ── Converters ─────────────────────────────────────────────────────────────

/// Text rendering of the raw value.
pub fn text(raw: &RawValue) -> String {
    raw.as_text().unwrap_or_default()
}

/// 32-bit integer as 8 zero-padded lowercase hex digits. Zero (or a missing
/// value) means "not set" and yields an empty string.
pub fn u32_to_hex8(raw: &RawValue) -> String {
    match raw.as_u32() {
        Some(v) if v != 0 => format!("{v:08x}"),
        _ => String::new(),
    }
}

/// Stable instance fragment of a PNP device id.
///
/// `USBSTOR\DISK&VEN_ADATA&PROD_USB_FLASH_DRIVE&REV_1100\27C1609381310127&0`
/// yields `27C1609381310127`: the text after the last `\`, before its only `&`.
/// When the device reported no serial, Windows synthesizes that segment from
/// several values (`5&3995B453&0&000000`); such ids are not stable and, like
/// any malformed input, yield an empty string.
pub fn device_instance_id(raw: &RawValue) -> String {
    let Some(pnp) = raw.as_text() else {
        return String::new();
    };

    let Some(pos) = pnp.rfind('\\') else {
        return String::new();
    };
    let tail = &pnp[pos + 1..];
    if tail.len() < 2 {
        return String::new();
    }

    match tail.split_once('&') {
        Some((id, rest)) if !id.is_empty() && !rest.contains('&') => id.to_owned(),
        _ => String::new(),
    }
}

/// Normalize a filesystem UUID to the 8-digit volume serial form.
///
/// FAT: `0EEE-1DE2` → `0EEE1DE2`. NTFS: `62A4D4C2A4D49931` → `A4D49931`
/// (the low 32 bits).
pub fn normalize_volume_serial(raw: &RawValue) -> String {
    let Some(mut serial) = raw.as_text() else {
        return String::new();
    };

    if let Some(pos) = serial.find('-') {
        serial.remove(pos);
    }
    let count = serial.chars().count();
    if count > 8 {
        serial = serial.chars().skip(count - 8).collect();
    }
    serial
}

/// `{8A6C3B3E-...}` → `8A6C3B3E-...`.
pub fn strip_braces(raw: &RawValue) -> String {
    let value = raw.as_text().unwrap_or_default();
    match value.strip_prefix('{').and_then(|v| v.strip_suffix('}')) {
        Some(inner) => inner.to_owned(),
        None => value,
    }
}
