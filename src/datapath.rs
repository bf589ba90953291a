//! Data interfaces and their peer records.
//!
//! Every NDP terminates on a local data interface (NDI). Each interface
//! keeps one record per remote NDI with the number of NDPs to that peer.
//! The record list sits behind its own lock, which is only ever taken
//! while the manager-wide lock is already held.

use crate::ndl::NdlVifId;
use crate::MacAddr;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from data-interface management.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatapathError {
    #[error("data interface {0} already exists")]
    Exists(MacAddr),

    #[error("data interface {0} not found")]
    NotFound(MacAddr),

    #[error("data interface {ndi} still carries {peers} peer(s)")]
    Busy { ndi: MacAddr, peers: usize },

    #[error("invalid data interface address {0}")]
    InvalidAddress(MacAddr),
}

/// One remote data interface reachable through a local one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    pub peer_ndi: MacAddr,
    /// Link the peer is reached over.
    pub ndl_vif: NdlVifId,
    /// NDPs to this peer on this interface.
    pub ndp_count: u32,
}

#[derive(Debug, Default)]
struct PeerList {
    peers: Vec<PeerRecord>,
    activated: bool,
}

/// A local NAN data interface.
#[derive(Debug)]
pub struct DataInterface {
    local_ndi: MacAddr,
    inner: Mutex<PeerList>,
}

impl DataInterface {
    fn new(local_ndi: MacAddr) -> Self {
        Self {
            local_ndi,
            inner: Mutex::new(PeerList::default()),
        }
    }

    pub fn local_ndi(&self) -> MacAddr {
        self.local_ndi
    }

    /// Add one NDP reference to `peer_ndi`, creating the record if needed.
    ///
    /// Returns the record's count afterwards.
    pub fn add_peer_ref(&self, peer_ndi: MacAddr, ndl_vif: NdlVifId) -> u32 {
        let mut list = self.inner.lock();
        list.activated = true;

        if let Some(record) = list.peers.iter_mut().find(|p| p.peer_ndi == peer_ndi) {
            if record.ndl_vif != ndl_vif {
                warn!(
                    ndi = %self.local_ndi,
                    peer = %peer_ndi,
                    old = %record.ndl_vif,
                    new = %ndl_vif,
                    "peer record moved to another link"
                );
                record.ndl_vif = ndl_vif;
            }
            record.ndp_count += 1;
            return record.ndp_count;
        }

        list.peers.push(PeerRecord {
            peer_ndi,
            ndl_vif,
            ndp_count: 1,
        });
        debug!(ndi = %self.local_ndi, peer = %peer_ndi, vif = %ndl_vif, "Peer record added");
        1
    }

    /// Drop one NDP reference to `peer_ndi`.
    ///
    /// The record is removed when its count reaches zero and the interface
    /// is deactivated once no records remain. Returns the remaining count,
    /// or `None` if there was no record.
    pub fn remove_peer_ref(&self, peer_ndi: MacAddr) -> Option<u32> {
        let mut list = self.inner.lock();
        let index = list.peers.iter().position(|p| p.peer_ndi == peer_ndi)?;

        let record = &mut list.peers[index];
        record.ndp_count = record.ndp_count.saturating_sub(1);
        let remaining = record.ndp_count;

        if remaining == 0 {
            list.peers.swap_remove(index);
            debug!(ndi = %self.local_ndi, peer = %peer_ndi, "Peer record removed");
            if list.peers.is_empty() {
                list.activated = false;
            }
        }
        Some(remaining)
    }

    /// Snapshot of the peer records.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.inner.lock().peers.clone()
    }

    pub fn peer(&self, peer_ndi: MacAddr) -> Option<PeerRecord> {
        self.inner
            .lock()
            .peers
            .iter()
            .find(|p| p.peer_ndi == peer_ndi)
            .copied()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.lock().peers.len()
    }

    /// True while at least one peer is attached.
    pub fn is_activated(&self) -> bool {
        self.inner.lock().activated
    }

    /// Drop every peer record, returning how many there were.
    pub fn clear_peers(&self) -> usize {
        let mut list = self.inner.lock();
        let n = list.peers.len();
        list.peers.clear();
        list.activated = false;
        n
    }

    /// Check whether the per-interface lock is free.
    ///
    /// Used by tests asserting the lock is never held across calls.
    pub fn is_unlocked(&self) -> bool {
        !self.inner.is_locked()
    }
}

/// All local data interfaces, keyed by NDI.
#[derive(Debug, Default)]
pub struct DataInterfaceTable {
    interfaces: BTreeMap<MacAddr, DataInterface>,
}

impl DataInterfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local data interface.
    pub fn create(&mut self, local_ndi: MacAddr) -> Result<&DataInterface, DatapathError> {
        if local_ndi.is_zero() || local_ndi.is_multicast() {
            return Err(DatapathError::InvalidAddress(local_ndi));
        }
        if self.interfaces.contains_key(&local_ndi) {
            return Err(DatapathError::Exists(local_ndi));
        }
        Ok(self
            .interfaces
            .entry(local_ndi)
            .or_insert_with(|| DataInterface::new(local_ndi)))
    }

    /// Look up an interface, registering it if unknown.
    pub fn get_or_create(&mut self, local_ndi: MacAddr) -> &DataInterface {
        self.interfaces
            .entry(local_ndi)
            .or_insert_with(|| DataInterface::new(local_ndi))
    }

    /// Remove an interface that carries no peers.
    pub fn delete(&mut self, local_ndi: MacAddr) -> Result<(), DatapathError> {
        let iface = self
            .interfaces
            .get(&local_ndi)
            .ok_or(DatapathError::NotFound(local_ndi))?;
        let peers = iface.peer_count();
        if peers > 0 {
            return Err(DatapathError::Busy {
                ndi: local_ndi,
                peers,
            });
        }
        self.interfaces.remove(&local_ndi);
        Ok(())
    }

    pub fn get(&self, local_ndi: MacAddr) -> Option<&DataInterface> {
        self.interfaces.get(&local_ndi)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataInterface> {
        self.interfaces.values()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Drop the peers of every interface, keeping the interfaces.
    pub fn clear_all_peers(&self) -> usize {
        self.interfaces.values().map(DataInterface::clear_peers).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(val: u8) -> MacAddr {
        MacAddr::new([0x06, 0, 0, 0, 0x60, val])
    }

    #[test]
    fn test_create_and_delete() {
        let mut table = DataInterfaceTable::new();
        table.create(addr(1)).unwrap();
        assert_eq!(table.create(addr(1)).unwrap_err(), DatapathError::Exists(addr(1)));
        assert_eq!(
            table.create(MacAddr::ZERO).unwrap_err(),
            DatapathError::InvalidAddress(MacAddr::ZERO)
        );

        table.delete(addr(1)).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.delete(addr(1)), Err(DatapathError::NotFound(addr(1))));
    }

    #[test]
    fn test_delete_busy() {
        let mut table = DataInterfaceTable::new();
        table.create(addr(1)).unwrap().add_peer_ref(addr(9), NdlVifId::new(2));
        assert_eq!(
            table.delete(addr(1)),
            Err(DatapathError::Busy {
                ndi: addr(1),
                peers: 1
            })
        );
    }

    #[test]
    fn test_peer_refcount() {
        let mut table = DataInterfaceTable::new();
        let iface = table.get_or_create(addr(1));
        let vif = NdlVifId::new(3);

        assert!(!iface.is_activated());
        assert_eq!(iface.add_peer_ref(addr(9), vif), 1);
        assert_eq!(iface.add_peer_ref(addr(9), vif), 2);
        assert_eq!(iface.add_peer_ref(addr(8), vif), 1);
        assert!(iface.is_activated());
        assert_eq!(iface.peer_count(), 2);

        assert_eq!(iface.remove_peer_ref(addr(9)), Some(1));
        assert_eq!(iface.remove_peer_ref(addr(9)), Some(0));
        assert!(iface.peer(addr(9)).is_none());
        assert!(iface.is_activated());

        assert_eq!(iface.remove_peer_ref(addr(8)), Some(0));
        assert!(!iface.is_activated());
        assert_eq!(iface.remove_peer_ref(addr(8)), None);
        assert!(iface.is_unlocked());
    }

    #[test]
    fn test_clear_all_peers() {
        let mut table = DataInterfaceTable::new();
        table.get_or_create(addr(1)).add_peer_ref(addr(9), NdlVifId::new(2));
        table.get_or_create(addr(2)).add_peer_ref(addr(8), NdlVifId::new(2));
        table.get_or_create(addr(2)).add_peer_ref(addr(7), NdlVifId::new(3));

        assert_eq!(table.clear_all_peers(), 3);
        assert!(table.iter().all(|i| i.peer_count() == 0 && !i.is_activated()));
        assert_eq!(table.len(), 2);
    }
}
