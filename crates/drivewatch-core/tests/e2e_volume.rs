/// End-to-end snapshot queries against the scripted service.
use drivewatch_core::model::DriveType;
use drivewatch_core::service::memory::{MemoryService, LOGICAL_DISK};
use drivewatch_core::service::{RawValue, Row};
use drivewatch_core::VolumeQuery;
use std::sync::Arc;

fn disk(mount: &str, drive_type: u32, size: &str) -> Row {
    [
        ("DeviceID", RawValue::from(mount)),
        ("ProviderName", RawValue::Null),
        ("VolumeSerialNumber", RawValue::from("0EEE1DE2")),
        ("Size", RawValue::from(size)),
        ("Description", RawValue::from("Local Fixed Disk")),
        ("DriveType", RawValue::U32(drive_type)),
        ("MediaType", RawValue::U32(12)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect()
}

#[test]
fn e2e_no_drives() {
    let query = VolumeQuery::new(Arc::new(MemoryService::new()));
    assert!(query.query().is_empty());
    assert!(query.try_query().unwrap().is_empty());
}

#[test]
fn e2e_exactly_the_mounted_drives() {
    let service = Arc::new(MemoryService::new());
    service.insert(LOGICAL_DISK, disk("C:", 3, "511101108224"));
    service.insert(LOGICAL_DISK, disk("D:", 2, "31020957696"));

    let drives = VolumeQuery::new(service).query();
    assert_eq!(drives.keys().collect::<Vec<_>>(), vec!["C:", "D:"]);

    let d = &drives["D:"];
    assert_eq!(d.drive_type, DriveType::Removable);
    assert_eq!(d.size, Some(31_020_957_696));
    assert_eq!(d.size_display(), "28.89 GB");
    assert_eq!(d.location, "");
    assert_eq!(d.media_type, 12);
}

#[test]
fn e2e_unassigned_volumes_are_skipped() {
    let service = Arc::new(MemoryService::new());
    service.insert(LOGICAL_DISK, disk("C:", 3, "1"));
    service.insert(LOGICAL_DISK, disk("", 2, "1"));

    let drives = VolumeQuery::new(service).query();
    assert_eq!(drives.len(), 1);
    assert!(drives.contains_key("C:"));
}

#[test]
fn e2e_each_query_is_fresh() {
    let service = Arc::new(MemoryService::new());
    let query = VolumeQuery::new(service.clone());

    service.insert(LOGICAL_DISK, disk("E:", 2, "1024"));
    assert_eq!(query.query().len(), 1);

    service.clear();
    assert!(query.query().is_empty());
}
