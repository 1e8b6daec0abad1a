/// Data model shared by the monitor, the resolver and the snapshot query.
pub mod drive;
pub mod event;
pub mod identity;
pub mod size;

pub use drive::{DriveInfo, DriveType};
pub use event::{DriveEvent, EventKind, MonitorMessage};
pub use identity::{IdSlot, UniqueDriveIdentity};
