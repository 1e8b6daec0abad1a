/// Metadata for one mounted drive.
///
/// Built from a logical-disk row of the device service. The column names are
/// the WMI `Win32_LogicalDisk` ones; other platform services emit rows under
/// the same names.
use crate::model::size;
use crate::service::{text_field, RawValue, Row, MOUNT_FIELD};
use serde::{Deserialize, Serialize};

/// Columns requested for every logical disk.
pub const VOLUME_FIELDS: [&str; 7] = [
    MOUNT_FIELD,
    "ProviderName",
    "VolumeSerialNumber",
    "Size",
    "Description",
    "DriveType",
    "MediaType",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveInfo {
    /// Mount identifier: `C:` / `E:` on Windows, the mount directory on Linux.
    pub mount_point: String,
    /// Network provider path for mapped drives, empty for local ones.
    pub location: String,
    pub volume_serial_number: String,
    /// Capacity in bytes, when reported.
    pub size: Option<u64>,
    /// e.g. "Removable Disk", "Network Connection".
    pub description: String,
    pub drive_type: DriveType,
    /// Raw media type code (12 = fixed hard disk, 0 = unknown).
    pub media_type: u32,
}

/// Drive type classification, decoded from the Win32 `DriveType` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriveType {
    #[default]
    Unknown,
    NoRootDirectory,
    Removable,
    Fixed,
    Network,
    CdRom,
    RamDisk,
}

impl DriveType {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::NoRootDirectory,
            2 => Self::Removable,
            3 => Self::Fixed,
            4 => Self::Network,
            5 => Self::CdRom,
            6 => Self::RamDisk,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::NoRootDirectory => 1,
            Self::Removable => 2,
            Self::Fixed => 3,
            Self::Network => 4,
            Self::CdRom => 5,
            Self::RamDisk => 6,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::NoRootDirectory => "No Root Directory",
            Self::Removable => "Removable",
            Self::Fixed => "Fixed",
            Self::Network => "Network",
            Self::CdRom => "CD-ROM",
            Self::RamDisk => "RAM Disk",
        }
    }
}

impl DriveInfo {
    /// Decode a logical-disk row. Missing columns become empty/zero values.
    pub fn from_row(row: &Row) -> Self {
        let code = |field: &str| row.get(field).and_then(RawValue::as_u32).unwrap_or(0);

        Self {
            mount_point: text_field(row, MOUNT_FIELD),
            location: text_field(row, "ProviderName"),
            volume_serial_number: text_field(row, "VolumeSerialNumber"),
            // WMI reports Size as the decimal string of a uint64.
            size: row.get("Size").and_then(RawValue::as_u64),
            description: text_field(row, "Description"),
            drive_type: DriveType::from_code(code("DriveType")),
            media_type: code("MediaType"),
        }
    }

    pub fn is_removable(&self) -> bool {
        self.drive_type == DriveType::Removable
    }

    /// Formatted capacity, or an empty string when unknown.
    pub fn size_display(&self) -> String {
        self.size.map(size::format_size).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb_row() -> Row {
        let mut row = Row::new();
        row.insert("DeviceID".into(), "E:".into());
        row.insert("VolumeSerialNumber".into(), "0EEE1DE2".into());
        row.insert("Size".into(), "31020957696".into());
        row.insert("Description".into(), "Removable Disk".into());
        row.insert("DriveType".into(), RawValue::U32(2));
        row.insert("MediaType".into(), RawValue::Null);
        row
    }

    #[test]
    fn test_from_row() {
        let info = DriveInfo::from_row(&usb_row());
        assert_eq!(info.mount_point, "E:");
        assert_eq!(info.location, "");
        assert_eq!(info.volume_serial_number, "0EEE1DE2");
        assert_eq!(info.size, Some(31_020_957_696));
        assert_eq!(info.drive_type, DriveType::Removable);
        assert_eq!(info.media_type, 0);
        assert!(info.is_removable());
        assert_eq!(info.size_display(), "28.89 GB");
    }

    #[test]
    fn test_from_empty_row() {
        let info = DriveInfo::from_row(&Row::new());
        assert_eq!(info.mount_point, "");
        assert_eq!(info.size, None);
        assert_eq!(info.size_display(), "");
        assert_eq!(info.drive_type, DriveType::Unknown);
    }

    #[test]
    fn test_drive_type_codes_round_trip() {
        for code in 0..=6 {
            assert_eq!(DriveType::from_code(code).code(), code);
        }
        assert_eq!(DriveType::from_code(42), DriveType::Unknown);
        assert_eq!(DriveType::CdRom.label(), "CD-ROM");
    }
}
