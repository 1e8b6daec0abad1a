/// Error type shared by the monitor, the resolver and the platform services.
///
/// Only failures that prevent establishing state reach the caller as an
/// `Err`: subscription failures from [`DriveNotify::start`] and, for hosts
/// that ask for it, service failures from [`VolumeQuery::try_query`].
/// Everything that can go wrong in steady state is absorbed and surfaced as
/// data (an `Unknown` event, a partial identity, an empty snapshot).
///
/// [`DriveNotify::start`]: crate::monitor::DriveNotify::start
/// [`VolumeQuery::try_query`]: crate::volume::VolumeQuery::try_query
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, DriveError>;

#[derive(Debug, Error)]
pub enum DriveError {
    /// The device service could not be reached, or it refused the
    /// notification subscription. Retriable by calling `start` again.
    #[error("could not subscribe to drive notifications: {0}")]
    Subscription(String),

    /// An established subscription stopped delivering events for good.
    #[error("drive notification subscription lost: {0}")]
    SubscriptionLost(String),

    /// `start` was called while a worker is already running.
    #[error("drive monitor is already running")]
    AlreadyRunning,

    /// A field query against the device service failed.
    #[error("query on {provider} failed: {message}")]
    Query { provider: String, message: String },

    /// The worker thread could not be spawned.
    #[error("failed to spawn monitor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl DriveError {
    pub fn query(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::Query {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}
