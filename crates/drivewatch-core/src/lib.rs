/// drivewatch core: removable drive monitoring, identification and
/// volume snapshots.
///
/// This crate contains all of the logic with no host or UI dependencies.
/// Every component talks to the operating system through the
/// [`service::DeviceService`] boundary, so the same code runs against WMI,
/// udev or the scripted [`service::memory::MemoryService`].
///
/// # Modules
///
/// - [`monitor`]: background attach/detach monitor ([`DriveNotify`]).
/// - [`unique_id`]: stable drive identifiers from provider chains.
/// - [`volume`]: point-in-time snapshot of mounted drives.
/// - [`model`]: drive metadata, events and identities.
/// - [`service`]: the device service boundary and its in-memory stand-in.
/// - [`platform`]: WMI and udev services, chains, WQL and mount table helpers.
/// - [`config`]: monitor tuning.
/// - [`error`]: the crate error type.
pub mod config;
pub mod error;
pub mod model;
pub mod monitor;
pub mod platform;
pub mod service;
pub mod unique_id;
pub mod volume;

pub use config::{MonitorConfig, OverflowPolicy};
pub use error::{DriveError, Result};
pub use model::{DriveEvent, DriveInfo, EventKind, MonitorMessage, UniqueDriveIdentity};
pub use monitor::{DriveNotify, MonitorState};
pub use unique_id::UniqueDriveId;
pub use volume::VolumeQuery;
