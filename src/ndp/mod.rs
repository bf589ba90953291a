//! NAN Data Path instances.
//!
//! The registry owns the NDP identifier pool and one entry per possible
//! id. An entry moves `Free -> InUse -> Terminating -> Free`; the id and
//! the NDL slot recorded in it are meaningful only while it is not Free.
//!
//! ## Design
//!
//! - Ids are drawn with a rotating hint so a freshly released id is not
//!   immediately handed out again while stale firmware events for it may
//!   still be in flight
//! - `new_entry` and `del_entry` are the only places that touch the NDL
//!   retain count, so "slot count == number of non-Free entries on that
//!   slot" holds as long as every path goes through them
//! - A non-Free entry whose id is not active in the pool (or the reverse)
//!   is reported as [`NdpError::Corrupt`]

use crate::ndl::{NdlTable, NdlVifId};
use crate::utils::index::{IdentifierPool, IndexError};
use crate::MacAddr;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from NDP bookkeeping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NdpError {
    #[error("ndp id {0} out of range")]
    InvalidId(u16),

    #[error("ndl slot {0} out of range")]
    InvalidSlot(usize),

    #[error("ndp id {ndp_id} is not in use")]
    NotInUse { ndp_id: u16 },

    #[error("ndp registry corrupt at id {ndp_id}: {detail}")]
    Corrupt { ndp_id: u16, detail: &'static str },

    #[error(transparent)]
    Pool(#[from] IndexError),
}

/// Lifecycle state of an NDP entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NdpState {
    #[default]
    Free,
    InUse,
    Terminating,
}

impl fmt::Display for NdpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NdpState::Free => "free",
            NdpState::InUse => "in-use",
            NdpState::Terminating => "terminating",
        };
        write!(f, "{}", s)
    }
}

/// One NDP instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NdpEntry {
    pub state: NdpState,
    /// Owning NDL slot index.
    pub slot: usize,
    /// Local data interface address; zero until known.
    pub local_ndi: MacAddr,
    /// Peer data interface address, set when setup is confirmed.
    pub peer_ndi: MacAddr,
    /// Firmware reference for a peer-initiated request.
    pub local_ref: Option<u16>,
    /// Setup confirmed and a peer record exists on the data interface.
    pub active: bool,
    pub created: Option<Instant>,
    /// Claim serial, used to match rollbacks to the claim they undo.
    pub serial: u64,
}

impl NdpEntry {
    /// Check if the entry holds an id.
    pub fn is_live(&self) -> bool {
        self.state != NdpState::Free
    }
}

/// NDP id pool plus entry table.
#[derive(Debug, Clone)]
pub struct NdpRegistry {
    pool: IdentifierPool,
    next_hint: u16,
    entries: Box<[NdpEntry]>,
}

impl NdpRegistry {
    /// Create a registry for ids `1..=max_ndp`.
    pub fn new(max_ndp: u16) -> Self {
        Self {
            pool: IdentifierPool::new(max_ndp),
            next_hint: 1,
            entries: vec![NdpEntry::default(); max_ndp as usize].into_boxed_slice(),
        }
    }

    /// Highest NDP id.
    pub fn max_ndp(&self) -> u16 {
        self.pool.capacity()
    }

    /// Allocate an id starting from the rotation hint.
    pub fn allocate_id(&mut self) -> Result<u16, IndexError> {
        let id = self.pool.allocate(self.next_hint)?;
        self.next_hint = (id + 1) % (self.max_ndp() + 1);
        Ok(id)
    }

    /// Return an id that never got an entry.
    pub fn release_id(&mut self, ndp_id: u16) -> Result<(), NdpError> {
        let entry = self.entry(ndp_id).ok_or(NdpError::InvalidId(ndp_id))?;
        if entry.is_live() {
            return Err(NdpError::Corrupt {
                ndp_id,
                detail: "releasing id of a live entry",
            });
        }
        self.pool.free(ndp_id)?;
        Ok(())
    }

    /// Record a new instance on `slot` and retain the slot.
    pub fn new_entry(
        &mut self,
        ndl: &mut NdlTable,
        ndp_id: u16,
        slot: usize,
        local_ndi: MacAddr,
        serial: u64,
    ) -> Result<(), NdpError> {
        let index = self.index(ndp_id)?;
        if !ndl.in_range(slot) {
            return Err(NdpError::InvalidSlot(slot));
        }
        if !self.pool.is_active(ndp_id) {
            return Err(NdpError::Corrupt {
                ndp_id,
                detail: "entry created for an unallocated id",
            });
        }
        if self.entries[index].is_live() {
            return Err(NdpError::Corrupt {
                ndp_id,
                detail: "entry already live",
            });
        }

        let count = ndl.ndp_count(slot).unwrap_or(0);
        if count as usize >= self.entries.len() {
            warn!(
                ndp_id,
                slot,
                count,
                "ndl slot count exceeds ndp capacity"
            );
        }

        ndl.retain(slot);
        self.entries[index] = NdpEntry {
            state: NdpState::InUse,
            slot,
            local_ndi,
            peer_ndi: MacAddr::ZERO,
            local_ref: None,
            active: false,
            created: Some(Instant::now()),
            serial,
        };
        Ok(())
    }

    /// Release an instance and its slot reference.
    ///
    /// Returns the entry as it was, or `None` if it was already Free.
    pub fn del_entry(&mut self, ndl: &mut NdlTable, ndp_id: u16) -> Option<NdpEntry> {
        let index = self.index(ndp_id).ok()?;
        if !self.entries[index].is_live() {
            debug!(ndp_id, "ndp entry already free");
            return None;
        }

        let old = std::mem::take(&mut self.entries[index]);
        ndl.release(old.slot);
        if let Err(e) = self.pool.free(ndp_id) {
            warn!(ndp_id, error = %e, "ndp id release mismatch");
        }
        Some(old)
    }

    /// Move an InUse entry to Terminating.
    pub fn mark_terminating(&mut self, ndp_id: u16) -> bool {
        match self.entry_mut(ndp_id) {
            Some(entry) if entry.state == NdpState::InUse => {
                entry.state = NdpState::Terminating;
                true
            }
            _ => false,
        }
    }

    /// Record a confirmed setup.
    pub fn mark_active(&mut self, ndp_id: u16, peer_ndi: MacAddr) -> bool {
        match self.entry_mut(ndp_id) {
            Some(entry) if entry.state == NdpState::InUse => {
                entry.active = true;
                entry.peer_ndi = peer_ndi;
                true
            }
            _ => false,
        }
    }

    /// Set the local data interface of a live entry.
    pub fn set_local_ndi(&mut self, ndp_id: u16, local_ndi: MacAddr) -> bool {
        match self.entry_mut(ndp_id) {
            Some(entry) if entry.is_live() => {
                entry.local_ndi = local_ndi;
                true
            }
            _ => false,
        }
    }

    /// Set the firmware local reference of a live entry.
    pub fn set_local_ref(&mut self, ndp_id: u16, local_ref: u16) -> bool {
        match self.entry_mut(ndp_id) {
            Some(entry) if entry.is_live() => {
                entry.local_ref = Some(local_ref);
                true
            }
            _ => false,
        }
    }

    /// Borrow the entry for an id. `None` for out-of-range ids.
    pub fn entry(&self, ndp_id: u16) -> Option<&NdpEntry> {
        let index = self.index(ndp_id).ok()?;
        Some(&self.entries[index])
    }

    fn entry_mut(&mut self, ndp_id: u16) -> Option<&mut NdpEntry> {
        let index = self.index(ndp_id).ok()?;
        Some(&mut self.entries[index])
    }

    /// State of an id; out-of-range ids read as Free.
    pub fn state(&self, ndp_id: u16) -> NdpState {
        self.entry(ndp_id).map(|e| e.state).unwrap_or_default()
    }

    /// Ids of live entries on a local data interface.
    pub fn entries_for_ndi(&self, local_ndi: MacAddr) -> Vec<u16> {
        self.live()
            .filter(|(_, e)| e.local_ndi == local_ndi)
            .map(|(id, _)| id)
            .collect()
    }

    /// Live entry on the given link and local data interface.
    pub fn ndp_for_slot_ndi(
        &self,
        ndl: &NdlTable,
        vif: NdlVifId,
        local_ndi: MacAddr,
    ) -> Option<u16> {
        let slot = ndl.slot_for_vif(vif)?;
        self.live()
            .find(|(_, e)| e.slot == slot && e.local_ndi == local_ndi)
            .map(|(id, _)| id)
    }

    /// Live entry created for firmware reference `local_ref`.
    pub fn find_by_local_ref(&self, local_ref: u16) -> Option<u16> {
        self.live()
            .find(|(_, e)| e.local_ref == Some(local_ref))
            .map(|(id, _)| id)
    }

    /// Ids of every live entry.
    pub fn in_use_ids(&self) -> Vec<u16> {
        self.live().map(|(id, _)| id).collect()
    }

    /// Number of live entries on a slot.
    pub fn count_on_slot(&self, slot: usize) -> usize {
        self.live().filter(|(_, e)| e.slot == slot).count()
    }

    /// InUse entries whose setup has not completed within `timeout`.
    pub fn stalled(&self, now: Instant, timeout: Duration) -> Vec<u16> {
        self.live()
            .filter(|(_, e)| e.state == NdpState::InUse && !e.active)
            .filter(|(_, e)| {
                e.created
                    .is_some_and(|t| now.saturating_duration_since(t) >= timeout)
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Verify the pool and the entry table agree.
    pub fn check_consistency(&self) -> Result<(), NdpError> {
        for (index, entry) in self.entries.iter().enumerate() {
            let ndp_id = index as u16 + 1;
            if entry.is_live() != self.pool.is_active(ndp_id) {
                return Err(NdpError::Corrupt {
                    ndp_id,
                    detail: "pool and entry table diverge",
                });
            }
        }
        Ok(())
    }

    /// Number of allocated ids.
    pub fn count(&self) -> usize {
        self.pool.count()
    }

    /// Current rotation hint.
    pub fn next_hint(&self) -> u16 {
        self.next_hint
    }

    /// Reset the pool, the hint and every entry.
    pub fn clear(&mut self) {
        self.pool.clear();
        self.next_hint = 1;
        self.entries.iter_mut().for_each(|e| *e = NdpEntry::default());
    }

    fn live(&self) -> impl Iterator<Item = (u16, &NdpEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_live())
            .map(|(i, e)| (i as u16 + 1, e))
    }

    fn index(&self, ndp_id: u16) -> Result<usize, NdpError> {
        if self.pool.in_range(ndp_id) {
            Ok((ndp_id - 1) as usize)
        } else {
            Err(NdpError::InvalidId(ndp_id))
        }
    }
}
