/// Point-in-time snapshot of mounted drives.
///
/// Every call runs one fresh query against the service's logical-disk
/// provider. Nothing is cached and nothing is diffed; the event monitor is
/// the component that tracks changes over time.
use crate::error::Result;
use crate::model::drive::VOLUME_FIELDS;
use crate::model::DriveInfo;
use crate::service::{DeviceService, Query};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct VolumeQuery<S: DeviceService> {
    service: Arc<S>,
}

impl<S: DeviceService> VolumeQuery<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// All drives with an assigned mount identifier, keyed by it.
    ///
    /// An unreachable service is logged and reported as "no drives".
    pub fn query(&self) -> BTreeMap<String, DriveInfo> {
        match self.try_query() {
            Ok(drives) => drives,
            Err(e) => {
                warn!("Volume query failed: {}", e);
                BTreeMap::new()
            }
        }
    }

    /// Like [`query`](Self::query), but service failures are returned.
    pub fn try_query(&self) -> Result<BTreeMap<String, DriveInfo>> {
        let rows = self
            .service
            .query(&Query::new(S::LOGICAL_DISKS, VOLUME_FIELDS))?;

        let drives: BTreeMap<String, DriveInfo> = rows
            .iter()
            .map(DriveInfo::from_row)
            // Unassigned and raw volumes have no mount identifier.
            .filter(|drive| !drive.mount_point.is_empty())
            .map(|drive| (drive.mount_point.clone(), drive))
            .collect();

        debug!("Volume query returned {} drives", drives.len());
        Ok(drives)
    }
}
