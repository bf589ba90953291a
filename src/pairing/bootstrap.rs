//! Bootstrapping instances.
//!
//! Bootstrapping ids are released as soon as the exchange is confirmed,
//! so no cross-reference outlives the handshake.

use super::InstanceRegistry;
use crate::MacAddr;

/// One bootstrapping exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootstrapInstance {
    pub peer: MacAddr,
    pub match_id: u16,
    pub session_id: u16,
    /// Created by an inbound request rather than a local one.
    pub inbound: bool,
    pub serial: u64,
}

/// Bootstrapping id space.
pub type BootstrapRegistry = InstanceRegistry<BootstrapInstance>;

impl InstanceRegistry<BootstrapInstance> {
    /// Pending exchange with `peer` on `session_id`.
    pub fn find(&self, peer: MacAddr, session_id: u16) -> Option<u16> {
        self.iter()
            .find(|(_, b)| b.peer == peer && b.session_id == session_id)
            .map(|(id, _)| id)
    }
}
