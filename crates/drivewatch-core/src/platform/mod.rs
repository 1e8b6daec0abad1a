/// Platform device services.
///
/// - Windows: WMI over COM ([`windows::WmiService`]).
/// - Linux: udev plus the kernel mount table ([`linux::UdevService`]),
///   behind the `udev` feature since it links against libudev.
///
/// The provider chains, the WQL renderer and the mount table parser carry
/// no OS bindings and build everywhere.
pub mod chains;
pub mod mounts;
pub mod wql;

#[cfg(windows)]
pub mod windows;

#[cfg(all(target_os = "linux", feature = "udev"))]
pub mod linux;

/// The device service for the build target.
#[cfg(windows)]
pub type PlatformService = windows::WmiService;

#[cfg(all(target_os = "linux", feature = "udev"))]
pub type PlatformService = linux::UdevService;

/// A shared handle to the build target's device service.
#[cfg(any(windows, all(target_os = "linux", feature = "udev")))]
pub fn default_service() -> std::sync::Arc<PlatformService> {
    std::sync::Arc::new(PlatformService::default())
}
