/// Best-effort stable identity of a drive.
///
/// An identity is a small ordered map from [`IdSlot`] to a string. It is
/// built slot by slot while provider chains are walked; a partially filled
/// (or empty) identity is a normal outcome for devices where some chain does
/// not apply, e.g. network or virtual drives without a physical disk.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity fields, in concatenation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSlot {
    /// Serial of the physical disk, e.g. `27C1609381310127`.
    DiskId = 0,
    /// MBR disk signature (`A00A72BA`) or the GPT disk GUID.
    DiskSignature = 1,
    /// Filesystem volume serial, e.g. `0EEE1DE2`.
    VolumeSerial = 2,
}

impl IdSlot {
    pub const ALL: [IdSlot; 3] = [Self::DiskId, Self::DiskSignature, Self::VolumeSerial];
}

/// Separator used when the caller does not pick one.
pub const DEFAULT_SEPARATOR: char = '+';

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueDriveIdentity {
    slots: BTreeMap<IdSlot, String>,
}

impl UniqueDriveIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` in `slot` unless the slot is already taken or the value
    /// is empty. Returns whether the value was stored.
    pub fn fill(&mut self, slot: IdSlot, value: impl Into<String>) -> bool {
        let value = value.into();
        if value.is_empty() || self.slots.contains_key(&slot) {
            return false;
        }
        self.slots.insert(slot, value);
        true
    }

    pub fn get(&self, slot: IdSlot) -> Option<&str> {
        self.slots.get(&slot).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every slot is populated.
    pub fn is_complete(&self) -> bool {
        self.slots.len() == IdSlot::ALL.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdSlot, &str)> {
        self.slots.iter().map(|(slot, value)| (*slot, value.as_str()))
    }

    /// Concatenate all slots, upper-cased, in slot order, joined by
    /// `separator` (`None` selects [`DEFAULT_SEPARATOR`]).
    ///
    /// Returns `None` for an incomplete identity: a key missing one of its
    /// parts would not match the same drive once that part becomes readable.
    pub fn to_unique_string(&self, separator: Option<char>) -> Option<String> {
        if !self.is_complete() {
            return None;
        }

        let separator = separator.unwrap_or(DEFAULT_SEPARATOR);
        let mut out = String::new();
        for (i, (_, value)) in self.iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            out.push_str(&value.to_uppercase());
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_keeps_first_value() {
        let mut id = UniqueDriveIdentity::new();
        assert!(id.fill(IdSlot::DiskId, "first"));
        assert!(!id.fill(IdSlot::DiskId, "second"));
        assert_eq!(id.get(IdSlot::DiskId), Some("first"));
    }

    #[test]
    fn test_fill_ignores_empty() {
        let mut id = UniqueDriveIdentity::new();
        assert!(!id.fill(IdSlot::VolumeSerial, ""));
        assert!(id.is_empty());
        // An empty value must not block a later chain.
        assert!(id.fill(IdSlot::VolumeSerial, "0eee1de2"));
    }

    #[test]
    fn test_unique_string_order_and_case() {
        let mut id = UniqueDriveIdentity::new();
        id.fill(IdSlot::VolumeSerial, "0eee1de2");
        id.fill(IdSlot::DiskId, "27c1609381310127");
        id.fill(IdSlot::DiskSignature, "a00a72ba");
        assert_eq!(
            id.to_unique_string(Some('+')).as_deref(),
            Some("27C1609381310127+A00A72BA+0EEE1DE2")
        );
        assert_eq!(
            id.to_unique_string(None).as_deref(),
            Some("27C1609381310127+A00A72BA+0EEE1DE2")
        );
        assert_eq!(
            id.to_unique_string(Some('_')).as_deref(),
            Some("27C1609381310127_A00A72BA_0EEE1DE2")
        );
    }

    #[test]
    fn test_unique_string_requires_all_slots() {
        let mut id = UniqueDriveIdentity::new();
        id.fill(IdSlot::DiskId, "27C1609381310127");
        id.fill(IdSlot::VolumeSerial, "0EEE1DE2");
        assert_eq!(id.len(), 2);
        assert!(!id.is_complete());
        assert_eq!(id.to_unique_string(Some('+')), None);
    }
}
