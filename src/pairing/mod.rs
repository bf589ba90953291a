//! Pairing and bootstrapping instances.
//!
//! Both spaces are a first-fit identifier pool plus one optional entry per
//! id. An id is active in the pool exactly when its entry is `Some`.

mod bootstrap;

pub use bootstrap::{BootstrapInstance, BootstrapRegistry};

use crate::utils::index::{IdentifierPool, IndexError};
use crate::MacAddr;
use std::fmt;
use tracing::warn;

/// Which side started the pairing exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairingRole {
    Initiator,
    Responder,
}

impl fmt::Display for PairingRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingRole::Initiator => write!(f, "initiator"),
            PairingRole::Responder => write!(f, "responder"),
        }
    }
}

/// One pairing session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairingInstance {
    pub peer: MacAddr,
    pub match_id: u16,
    pub session_id: u16,
    pub role: PairingRole,
    /// Pairing confirmed by firmware.
    pub completed: bool,
    pub serial: u64,
}

/// Bounded id space with one entry per allocated id.
#[derive(Debug, Clone)]
pub struct InstanceRegistry<T> {
    pool: IdentifierPool,
    entries: Box<[Option<T>]>,
}

impl<T: Clone> InstanceRegistry<T> {
    pub fn new(capacity: u16) -> Self {
        Self {
            pool: IdentifierPool::new(capacity),
            entries: vec![None; capacity as usize].into_boxed_slice(),
        }
    }
}

impl<T> InstanceRegistry<T> {
    /// Allocate the lowest free id and store `instance` under it.
    pub fn allocate(&mut self, instance: T) -> Result<u16, IndexError> {
        let id = self.pool.allocate_first()?;
        self.entries[(id - 1) as usize] = Some(instance);
        Ok(id)
    }

    pub fn get(&self, id: u16) -> Option<&T> {
        self.slot(id)?.as_ref()
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut T> {
        let index = self.index(id)?;
        self.entries[index].as_mut()
    }

    /// Free an id, returning its entry. `None` if it was not allocated.
    pub fn release(&mut self, id: u16) -> Option<T> {
        let index = self.index(id)?;
        let instance = self.entries[index].take()?;
        if let Err(e) = self.pool.free(id) {
            warn!(id, error = %e, "instance id release mismatch");
        }
        Some(instance)
    }

    /// Free an id only if its entry satisfies `pred`.
    pub fn release_if(&mut self, id: u16, pred: impl FnOnce(&T) -> bool) -> Option<T> {
        if self.get(id).is_some_and(pred) {
            self.release(id)
        } else {
            None
        }
    }

    pub fn is_active(&self, id: u16) -> bool {
        self.get(id).is_some()
    }

    /// Allocated ids with their entries, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i as u16 + 1, e)))
    }

    pub fn count(&self) -> usize {
        self.pool.count()
    }

    pub fn capacity(&self) -> u16 {
        self.pool.capacity()
    }

    /// First id whose pool bit and entry disagree.
    pub fn find_divergence(&self) -> Option<u16> {
        (1..=self.pool.capacity()).find(|&id| self.pool.is_active(id) != self.is_active(id))
    }

    pub fn clear(&mut self) {
        self.pool.clear();
        self.entries.iter_mut().for_each(|e| *e = None);
    }

    fn slot(&self, id: u16) -> Option<&Option<T>> {
        self.entries.get(self.index(id)?)
    }

    fn index(&self, id: u16) -> Option<usize> {
        self.pool.in_range(id).then(|| (id - 1) as usize)
    }
}

/// Pairing id space.
pub type PairingRegistry = InstanceRegistry<PairingInstance>;

impl InstanceRegistry<PairingInstance> {
    /// Pending (not completed) instance for `peer`.
    pub fn find_pending_by_peer(&self, peer: MacAddr) -> Option<u16> {
        self.iter()
            .find(|(_, p)| p.peer == peer && !p.completed)
            .map(|(id, _)| id)
    }
}
