/// udev device service.
///
/// Three providers are served:
///
/// - [`chains::udev::MOUNTS`]: the kernel mount table, one row per mount
///   point that is not shadowed by a later mount (`device`, `mount_point`,
///   `fs_type`).
/// - [`chains::udev::PARTITION`]: udev properties of block partitions
///   (`DEVNAME`, `ID_SERIAL_SHORT`, `ID_FS_UUID`, ...).
/// - [`LOGICAL_DISK`]: mounted block devices in logical-disk shape, keyed
///   by mount directory.
///
/// Notifications come from a udev netlink monitor filtered to
/// `block`/`partition`. A removed partition has already left the mount
/// table when its event arrives, so mount points seen on `add` (and at
/// subscription time) are cached per device node.
use crate::error::{DriveError, Result};
use crate::model::{DriveType, EventKind};
use crate::platform::{chains, mounts};
use crate::service::{DeviceService, EventSource, Query, RawEvent, RawValue, Row, MOUNT_FIELD};
use crate::unique_id::{normalize_volume_serial, ProviderChain};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use std::collections::HashMap;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub const LOGICAL_DISK: &str = "logical_disk";

const ADD: &str = "add";
const REMOVE: &str = "remove";

/// Mount table lookups after an `add` event: the automounter usually
/// lags the kernel event by a few hundred milliseconds.
const MOUNT_RETRIES: u32 = 5;
const MOUNT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bytes per sector of the sysfs `size` attribute.
const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Default)]
pub struct UdevService;

impl UdevService {
    pub fn new() -> Self {
        Self
    }

    fn mount_rows(&self) -> Result<Vec<Row>> {
        let entries = mounts::read_mount_table()
            .map_err(|e| DriveError::query(chains::udev::MOUNTS, e))?;
        Ok(mounts::mount_rows(&entries))
    }

    fn partition_rows(&self, query: &Query) -> Result<Vec<Row>> {
        let err = |e: std::io::Error| DriveError::query(chains::udev::PARTITION, e);

        let mut enumerator = udev::Enumerator::new().map_err(err)?;
        enumerator.match_subsystem("block").map_err(err)?;
        enumerator.match_property("DEVTYPE", "partition").map_err(err)?;
        if let Some(filter) = &query.filter {
            enumerator
                .match_property(&filter.field, &filter.value)
                .map_err(err)?;
        }

        let rows: Vec<Row> = enumerator
            .scan_devices()
            .map_err(err)?
            .map(|device| property_row(&device))
            .collect();
        Ok(query.select(&rows))
    }

    fn logical_disk_rows(&self) -> Result<Vec<Row>> {
        let entries =
            mounts::read_mount_table().map_err(|e| DriveError::query(LOGICAL_DISK, e))?;
        Ok(mounts::visible(&entries)
            .iter()
            .filter(|entry| entry.is_block_device())
            .map(|entry| {
                let device = partition_device(&entry.device);
                volume_row(&entry.mount_point, device.as_ref(), &entry.fs_type)
            })
            .collect())
    }
}

impl DeviceService for UdevService {
    type Events = UdevEvents;

    const LOGICAL_DISKS: &'static str = LOGICAL_DISK;

    fn subscribe(&self) -> Result<UdevEvents> {
        let socket = udev::MonitorBuilder::new()
            .and_then(|builder| builder.match_subsystem_devtype("block", "partition"))
            .and_then(|builder| builder.listen())
            .map_err(|e| DriveError::Subscription(format!("udev monitor: {e}")))?;

        let mounted = cache_mounted_partitions();
        debug!(
            "udev: monitor listening, {} removable partitions mounted",
            mounted.len()
        );
        Ok(UdevEvents { socket, mounted })
    }

    fn query(&self, query: &Query) -> Result<Vec<Row>> {
        let rows = match query.provider.as_str() {
            chains::udev::MOUNTS => query.select(&self.mount_rows()?),
            chains::udev::PARTITION => self.partition_rows(query)?,
            LOGICAL_DISK => query.select(&self.logical_disk_rows()?),
            other => return Err(DriveError::query(other, "unknown provider")),
        };
        debug!("udev: {} returned {} rows", query.provider, rows.len());
        Ok(rows)
    }

    fn event_kind(&self, class: &str) -> EventKind {
        match class {
            ADD => EventKind::Connected,
            REMOVE => EventKind::Disconnected,
            _ => EventKind::Unknown,
        }
    }

    fn provider_chains(&self) -> Vec<ProviderChain> {
        chains::udev::chains()
    }
}

// ─── Event source ───────────────────────────────────────────────────────────

pub struct UdevEvents {
    socket: udev::MonitorSocket,
    /// Device node -> mount directory, for partitions seen mounted.
    mounted: HashMap<String, String>,
}

impl EventSource for UdevEvents {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<RawEvent>> {
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

        // SAFETY: the socket outlives this borrow.
        let fd = unsafe { BorrowedFd::borrow_raw(self.socket.as_raw_fd()) };
        let mut fds = [PollFd::new(&fd, PollFlags::POLLIN)];
        match poll(&mut fds, timeout_ms) {
            Ok(0) | Err(Errno::EINTR) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(DriveError::SubscriptionLost(format!("udev poll: {e}"))),
        }

        let Some(event) = self.socket.iter().next() else {
            return Ok(None);
        };
        Ok(self.evaluate(&event))
    }
}

impl UdevEvents {
    /// Turn a partition `add`/`remove` into a raw event. Other actions, and
    /// partitions whose mount point cannot be determined, are skipped.
    fn evaluate(&mut self, device: &udev::Device) -> Option<RawEvent> {
        if device.devtype().and_then(|t| t.to_str()) != Some("partition") {
            return None;
        }
        let action = device.action().and_then(|a| a.to_str())?;
        if action != ADD && action != REMOVE {
            return None;
        }
        let node = device.devnode()?.to_string_lossy().into_owned();

        let (mount_point, fs_type) = if action == REMOVE {
            (self.mounted.remove(&node)?, String::new())
        } else {
            let entry = wait_for_mount(&node)?;
            self.mounted.insert(node.clone(), entry.mount_point.clone());
            (entry.mount_point, entry.fs_type)
        };

        debug!("udev: {} {} at {}", action, node, mount_point);
        Some(RawEvent {
            class: Some(action.to_owned()),
            target: Some(volume_row(&mount_point, Some(device), &fs_type)),
        })
    }
}

fn wait_for_mount(node: &str) -> Option<mounts::MountEntry> {
    for attempt in 0..MOUNT_RETRIES {
        match mounts::read_mount_table() {
            Ok(entries) => {
                if let Some(entry) = entries.into_iter().find(|e| e.device == node) {
                    return Some(entry);
                }
            }
            Err(e) => warn!("udev: cannot read mount table: {}", e),
        }
        if attempt + 1 < MOUNT_RETRIES {
            thread::sleep(MOUNT_RETRY_DELAY);
        }
    }
    debug!("udev: {} added but not mounted", node);
    None
}

/// Mount points of every mounted removable partition, by device node.
fn cache_mounted_partitions() -> HashMap<String, String> {
    let entries = match mounts::read_mount_table() {
        Ok(entries) => entries,
        Err(e) => {
            warn!("udev: cannot read mount table: {}", e);
            return HashMap::new();
        }
    };

    let devices = udev::Enumerator::new().and_then(|mut enumerator| {
        enumerator.match_subsystem("block")?;
        enumerator.match_property("DEVTYPE", "partition")?;
        Ok(enumerator.scan_devices()?.collect::<Vec<_>>())
    });
    let devices = match devices {
        Ok(devices) => devices,
        Err(e) => {
            warn!("udev: partition enumeration failed: {}", e);
            return HashMap::new();
        }
    };

    devices
        .iter()
        .filter(|device| is_removable(device))
        .filter_map(|device| {
            let node = device.devnode()?.to_string_lossy().into_owned();
            let mount_point = mounts::mount_point_of(&entries, &node)?;
            Some((node, mount_point))
        })
        .collect()
}

/// udev device of a partition node such as `/dev/sdb1`.
fn partition_device(node: &str) -> Option<udev::Device> {
    let name = Path::new(node).file_name()?;
    udev::Device::from_syspath(&Path::new("/sys/class/block").join(name)).ok()
}

/// The parent disk reports `removable` = 1.
fn is_removable(partition: &udev::Device) -> bool {
    partition
        .parent()
        .and_then(|disk| {
            disk.attribute_value("removable")
                .map(|v| v.to_string_lossy() == "1")
        })
        .unwrap_or(false)
}

fn property(device: &udev::Device, name: &str) -> Option<String> {
    device
        .property_value(name)
        .map(|v| v.to_string_lossy().into_owned())
}

fn property_row(device: &udev::Device) -> Row {
    device
        .properties()
        .map(|entry| {
            (
                entry.name().to_string_lossy().into_owned(),
                RawValue::Text(entry.value().to_string_lossy().into_owned()),
            )
        })
        .collect()
}

/// Logical-disk row for a mounted partition.
fn volume_row(mount_point: &str, device: Option<&udev::Device>, fs_type: &str) -> Row {
    let mut row = Row::new();
    row.insert(MOUNT_FIELD.to_owned(), RawValue::from(mount_point));

    let Some(device) = device else {
        row.insert("Description".to_owned(), RawValue::from(fs_type));
        row.insert("DriveType".to_owned(), RawValue::U32(DriveType::Unknown.code()));
        return row;
    };

    if let Some(uuid) = property(device, "ID_FS_UUID") {
        let serial = normalize_volume_serial(&RawValue::Text(uuid));
        row.insert("VolumeSerialNumber".to_owned(), RawValue::Text(serial));
    }

    let sectors = device
        .attribute_value("size")
        .and_then(|v| v.to_str())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if let Some(sectors) = sectors {
        row.insert("Size".to_owned(), RawValue::U64(sectors * SECTOR_SIZE));
    }

    let description = property(device, "ID_FS_LABEL")
        .or_else(|| property(device, "ID_MODEL"))
        .unwrap_or_else(|| fs_type.to_owned());
    row.insert("Description".to_owned(), RawValue::Text(description));

    let drive_type = if property(device, "ID_CDROM").as_deref() == Some("1") {
        DriveType::CdRom
    } else if is_removable(device) {
        DriveType::Removable
    } else {
        DriveType::Fixed
    };
    row.insert("DriveType".to_owned(), RawValue::U32(drive_type.code()));
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        let service = UdevService::new();
        assert_eq!(service.event_kind("add"), EventKind::Connected);
        assert_eq!(service.event_kind("remove"), EventKind::Disconnected);
        assert_eq!(service.event_kind("change"), EventKind::Unknown);
    }

    #[test]
    fn test_unknown_provider_is_an_error() {
        let service = UdevService::new();
        assert!(service.query(&Query::new("Win32_DiskDrive", ["x"])).is_err());
    }

    #[test]
    fn test_volume_row_without_device() {
        let row = volume_row("/media/usb", None, "vfat");
        assert_eq!(row.get(MOUNT_FIELD), Some(&RawValue::from("/media/usb")));
        assert_eq!(row.get("Description"), Some(&RawValue::from("vfat")));
    }
}
