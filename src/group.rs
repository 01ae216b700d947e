//! Peer registry interfaces.
//!
//! Room membership lives outside this crate; the forwarder only needs to
//! enumerate the other clients of a group and hand them a completed
//! publisher connection.

use std::sync::Arc;

use crate::up::{UpConnection, UpTrack};

/// One connected client, as seen by the forwarder.
pub trait Client: Send + Sync {
    fn id(&self) -> &str;

    fn group(&self) -> Arc<dyn Group>;

    /// Offer a completed publisher connection and its tracks to this
    /// client so it can subscribe.
    fn push_conn(
        &self,
        conn_id: &str,
        up: Arc<UpConnection>,
        tracks: Vec<Arc<UpTrack>>,
        label: &str,
    );
}

/// The set of clients a publisher's tracks are announced to.
pub trait Group: Send + Sync {
    /// Current clients, excluding `exclude` (usually the publisher).
    fn get_clients(&self, exclude: Option<&str>) -> Vec<Arc<dyn Client>>;
}
