/// Provider chains of the platform services.
///
/// Kept free of OS bindings so the chain shapes can be exercised against
/// [`MemoryService`](crate::service::memory::MemoryService) on any host.

/// WMI chains, for `Win32_*` providers in `ROOT\CIMV2` and the storage
/// management providers. Use `wbemtest` to try the same WQL by hand.
pub mod wmi {
    use crate::model::IdSlot;
    use crate::unique_id::{
        device_instance_id, strip_braces, u32_to_hex8, FieldSpec, Link, ProviderChain,
    };

    pub const STORAGE_NAMESPACE: &str = "ROOT\\Microsoft\\Windows\\Storage";

    /// Prefix of absolute object paths in the storage namespace.
    pub const STORAGE_PATH_PREFIX: &str = "\\\\.\\ROOT\\Microsoft\\Windows\\Storage:";

    /// `"e:"` -> `"E"`.
    pub fn drive_letter(mount_point: &str) -> String {
        mount_point
            .chars()
            .next()
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_uppercase().to_string())
            .unwrap_or_default()
    }

    /// Relative storage path -> absolute path.
    pub fn storage_object_path(relpath: &str) -> String {
        format!("{STORAGE_PATH_PREFIX}{relpath}")
    }

    /// Absolute storage path -> relative path.
    pub fn storage_relative_path(path: &str) -> String {
        path.strip_prefix(STORAGE_PATH_PREFIX).unwrap_or(path).to_owned()
    }

    pub fn chains() -> Vec<ProviderChain> {
        vec![physical_disk(), storage_disk()]
    }

    /// Logical disk -> partition -> physical disk.
    pub fn physical_disk() -> ProviderChain {
        ProviderChain::new("physical-disk")
            .link(
                Link::new("Win32_LogicalDisk", "DeviceID")
                    .carry("__PATH")
                    .field(FieldSpec::text("VolumeSerialNumber", IdSlot::VolumeSerial)),
            )
            .link(Link::new("Win32_LogicalDiskToPartition", "Dependent").carry("Antecedent"))
            .link(Link::new("Win32_DiskDriveToDiskPartition", "Dependent").carry("Antecedent"))
            .link(
                Link::new("Win32_DiskDrive", "__PATH")
                    .field(FieldSpec::converted("Signature", IdSlot::DiskSignature, u32_to_hex8))
                    .field(FieldSpec::converted(
                        "PNPDeviceID",
                        IdSlot::DiskId,
                        device_instance_id,
                    )),
            )
    }

    /// Volume -> partition -> disk GUID. Only GPT disks have a GUID; it
    /// stands in for the MBR signature those disks lack.
    pub fn storage_disk() -> ProviderChain {
        ProviderChain::new("storage-disk")
            .link(
                Link::new("MSFT_Volume", "DriveLetter")
                    .namespace(STORAGE_NAMESPACE)
                    .key_transform(drive_letter)
                    .carry("__RELPATH"),
            )
            .link(
                Link::new("MSFT_PartitionToVolume", "Volume")
                    .namespace(STORAGE_NAMESPACE)
                    .key_transform(storage_object_path)
                    .carry("Partition"),
            )
            .link(
                Link::new("MSFT_DiskToPartition", "Partition")
                    .namespace(STORAGE_NAMESPACE)
                    .carry("Disk"),
            )
            .link(
                Link::new("MSFT_Disk", "__RELPATH")
                    .namespace(STORAGE_NAMESPACE)
                    .key_transform(storage_relative_path)
                    .field(FieldSpec::converted("Guid", IdSlot::DiskSignature, strip_braces)),
            )
    }
}

/// udev chains. The `mounts` provider maps mount directories to device
/// nodes; `partition` exposes the udev properties of block partitions.
pub mod udev {
    use crate::model::IdSlot;
    use crate::platform::mounts::{DEVICE_FIELD, MOUNT_POINT_FIELD};
    use crate::unique_id::{normalize_volume_serial, FieldSpec, Link, ProviderChain};

    pub const MOUNTS: &str = "mounts";
    pub const PARTITION: &str = "partition";

    pub fn chains() -> Vec<ProviderChain> {
        vec![partition(), disk_serial()]
    }

    fn mount_link() -> Link {
        Link::new(MOUNTS, MOUNT_POINT_FIELD).carry(DEVICE_FIELD)
    }

    pub fn partition() -> ProviderChain {
        ProviderChain::new("partition").link(mount_link()).link(
            Link::new(PARTITION, "DEVNAME")
                .field(FieldSpec::text("ID_SERIAL_SHORT", IdSlot::DiskId))
                .field(FieldSpec::text("ID_PART_TABLE_UUID", IdSlot::DiskSignature))
                .field(FieldSpec::converted(
                    "ID_FS_UUID",
                    IdSlot::VolumeSerial,
                    normalize_volume_serial,
                )),
        )
    }

    /// Some bridges only report the long vendor/model/serial string.
    pub fn disk_serial() -> ProviderChain {
        ProviderChain::new("disk-serial")
            .link(mount_link())
            .link(Link::new(PARTITION, "DEVNAME").field(FieldSpec::text("ID_SERIAL", IdSlot::DiskId)))
    }
}

#[cfg(test)]
mod tests {
    use super::wmi::*;

    #[test]
    fn test_drive_letter() {
        assert_eq!(drive_letter("e:"), "E");
        assert_eq!(drive_letter("D:"), "D");
        assert_eq!(drive_letter(""), "");
        assert_eq!(drive_letter("\\\\host\\share"), "");
    }

    #[test]
    fn test_storage_paths() {
        let rel = "MSFT_Disk.ObjectId=\"{1}\\\\HOST\\Disk{abc}\"";
        let abs = storage_object_path(rel);
        assert!(abs.starts_with("\\\\.\\ROOT\\Microsoft\\Windows\\Storage:"));
        assert_eq!(storage_relative_path(&abs), rel);
        assert_eq!(storage_relative_path(rel), rel);
    }

    #[test]
    fn test_chain_shapes() {
        let chains = chains();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].links.len(), 4);
        assert!(chains[1]
            .links
            .iter()
            .all(|l| l.namespace == Some(STORAGE_NAMESPACE)));
        assert_eq!(super::udev::chains()[0].links[0].provider, super::udev::MOUNTS);
    }
}
