//! drivewatch: removable drive monitor.
//!
//! Thin binary entry point. All logic lives in the `drivewatch-core` crate.
//! Prints the current drives with their unique identifiers as JSON lines,
//! then one JSON line per attach/detach event until the subscription ends
//! or the process is interrupted.

#[cfg(any(windows, all(target_os = "linux", feature = "udev")))]
fn main() -> anyhow::Result<()> {
    use drivewatch_core::model::MonitorMessage;
    use drivewatch_core::platform::default_service;
    use drivewatch_core::unique_id::DEFAULT_SEPARATOR;
    use drivewatch_core::{DriveNotify, UniqueDriveId, VolumeQuery};
    use serde_json::json;

    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("drivewatch starting");

    let service = default_service();
    let resolver = UniqueDriveId::new(service.clone());

    let drives = VolumeQuery::new(service.clone()).try_query()?;
    for (mount_point, drive) in &drives {
        let identity = resolver.resolve(mount_point);
        let line = json!({
            "snapshot": drive,
            "identity": identity,
            "unique_id": identity.to_unique_string(Some(DEFAULT_SEPARATOR)),
        });
        println!("{line}");
    }

    let mut notify = DriveNotify::new(service);
    notify.start()?;

    for msg in notify.receiver().iter() {
        match msg {
            MonitorMessage::Drive(event) => {
                let identity = event
                    .is_connected()
                    .then(|| resolver.resolve(&event.mount_point));
                println!("{}", json!({ "event": event, "identity": identity }));
            }
            MonitorMessage::Closed { reason } => {
                println!("{}", json!({ "closed": reason }));
                break;
            }
        }
    }

    notify.stop();
    Ok(())
}

#[cfg(not(any(windows, all(target_os = "linux", feature = "udev"))))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!(
        "no device service for this platform; on Linux rebuild with `--features udev`"
    )
}
