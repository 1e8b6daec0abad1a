/// Kernel mount table (`/proc/self/mounts` format) reader.
///
/// Each line is `device mount_dir fs_type options dump pass`, with spaces,
/// tabs and backslashes in paths escaped as 3-digit octal (`\040`).
use crate::service::{RawValue, Row};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Columns of a mount table row.
pub const DEVICE_FIELD: &str = "device";
pub const MOUNT_POINT_FIELD: &str = "mount_point";
pub const FS_TYPE_FIELD: &str = "fs_type";

/// Tables tried in order; `/etc/mtab` only matters on very old systems.
pub const MOUNT_TABLES: [&str; 3] = ["/proc/self/mounts", "/proc/mounts", "/etc/mtab"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// `/dev/sdb1`, or a pseudo source such as `proc`.
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
}

impl MountEntry {
    /// Backed by a device node rather than a pseudo or network filesystem.
    pub fn is_block_device(&self) -> bool {
        self.device.starts_with("/dev/")
    }
}

/// Parse mount table text. Lines with fewer than three fields are skipped.
pub fn parse_mount_table(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                device: unescape(device),
                mount_point: unescape(mount_point),
                fs_type: fs_type.to_owned(),
            })
        })
        .collect()
}

pub fn read_mount_table_from(path: &Path) -> io::Result<Vec<MountEntry>> {
    Ok(parse_mount_table(&fs::read_to_string(path)?))
}

/// Read the first mount table that can be opened.
pub fn read_mount_table() -> io::Result<Vec<MountEntry>> {
    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no mount table");
    for table in MOUNT_TABLES {
        match read_mount_table_from(Path::new(table)) {
            Ok(entries) => return Ok(entries),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Mount point of `device` (`/dev/sdb1` -> `/media/usb`), if mounted.
pub fn mount_point_of(entries: &[MountEntry], device: &str) -> Option<String> {
    entries
        .iter()
        .find(|e| e.device == device)
        .map(|e| e.mount_point.clone())
}

/// The entries still reachable by path: one per mount point, the last one
/// listed, since a later mount on the same directory hides the earlier one.
/// Table order is kept otherwise.
pub fn visible(entries: &[MountEntry]) -> Vec<MountEntry> {
    let last: HashMap<&str, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.mount_point.as_str(), i))
        .collect();

    entries
        .iter()
        .enumerate()
        .filter(|(i, e)| last.get(e.mount_point.as_str()) == Some(i))
        .map(|(_, e)| e.clone())
        .collect()
}

/// Visible entries as `device` / `mount_point` / `fs_type` rows.
pub fn mount_rows(entries: &[MountEntry]) -> Vec<Row> {
    visible(entries)
        .into_iter()
        .map(|entry| {
            Row::from([
                (DEVICE_FIELD.to_owned(), RawValue::Text(entry.device)),
                (MOUNT_POINT_FIELD.to_owned(), RawValue::Text(entry.mount_point)),
                (FS_TYPE_FIELD.to_owned(), RawValue::Text(entry.fs_type)),
            ])
        })
        .collect()
}

fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_triplet(&bytes[i + 1..i + 4]) {
            let code = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(code);
            i += 4;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_triplet(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
/dev/sdb1 /media/alice/USB\\040STICK vfat rw,nosuid,nodev 0 0
server:/export /mnt/nfs nfs4 rw 0 0
broken-line
";

    #[test]
    fn test_parse_mount_table() {
        let entries = parse_mount_table(SAMPLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[2].device, "/dev/sdb1");
        assert_eq!(entries[2].mount_point, "/media/alice/USB STICK");
        assert_eq!(entries[2].fs_type, "vfat");
        assert!(entries[1].is_block_device());
        assert!(!entries[0].is_block_device());
        assert!(!entries[3].is_block_device());
    }

    #[test]
    fn test_lookups() {
        let entries = parse_mount_table(SAMPLE);
        assert_eq!(
            mount_point_of(&entries, "/dev/sdb1").as_deref(),
            Some("/media/alice/USB STICK")
        );
        assert_eq!(mount_point_of(&entries, "/dev/sdc1"), None);
    }

    #[test]
    fn test_shadowed_mount_point() {
        let entries = parse_mount_table(
            "/dev/sdb1 /mnt vfat rw 0 0\n/dev/sda2 /home ext4 rw 0 0\n/dev/sdc1 /mnt ext4 rw 0 0\n",
        );
        let visible = visible(&entries);
        let devices: Vec<&str> = visible.iter().map(|e| e.device.as_str()).collect();
        assert_eq!(devices, vec!["/dev/sda2", "/dev/sdc1"]);

        let rows = mount_rows(&entries);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1].get(DEVICE_FIELD),
            Some(&RawValue::from("/dev/sdc1"))
        );
        assert_eq!(rows[1].get(MOUNT_POINT_FIELD), Some(&RawValue::from("/mnt")));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\040b\\011c\\134d"), "a b\tc\\d");
        assert_eq!(unescape("trailing\\04"), "trailing\\04");
        assert_eq!(unescape("not\\999octal"), "not\\999octal");
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let entries = read_mount_table_from(file.path()).unwrap();
        assert_eq!(entries.len(), 4);
    }
}
