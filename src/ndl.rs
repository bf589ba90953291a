//! NAN Data Link slots.
//!
//! An NDL slot is the negotiated link to one peer discovery address (NMI).
//! Several NDPs to the same peer multiplex onto the same slot; the slot
//! keeps a count of them and is cleared when the count drops to zero.
//!
//! Firmware addresses slots as virtual interfaces numbered immediately
//! after the management interface: `vif = ndl_vif_base + slot_index`.
//! All conversions between the two go through [`NdlTable::vif_id`] and
//! [`NdlTable::slot_for_vif`].

use crate::MacAddr;
use std::fmt;
use tracing::warn;

/// Externally visible identifier of an NDL slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NdlVifId(u16);

impl NdlVifId {
    /// Create from a raw firmware vif number.
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the raw vif number.
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for NdlVifId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vif{}", self.0)
    }
}

/// One data-link slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NdlSlot {
    /// Peer discovery address; zero when the slot is free.
    pub peer_nmi: MacAddr,
    /// Number of NDPs currently multiplexed onto this slot.
    pub ndp_count: u32,
}

impl NdlSlot {
    /// Check if the slot is completely unused.
    pub fn is_empty(&self) -> bool {
        self.ndp_count == 0 && self.peer_nmi.is_zero()
    }
}

/// Fixed-size table of NDL slots.
#[derive(Debug, Clone)]
pub struct NdlTable {
    slots: Box<[NdlSlot]>,
    vif_base: u16,
}

impl NdlTable {
    /// Create a table of `capacity` slots whose vif ids start at `vif_base`.
    pub fn new(capacity: usize, vif_base: u16) -> Self {
        Self {
            slots: vec![NdlSlot::default(); capacity].into_boxed_slice(),
            vif_base,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Find the slot already linked to `peer`, or claim an empty one.
    ///
    /// Claiming writes the peer address immediately so a second lookup for
    /// the same peer returns the same slot. `None` means every slot is in
    /// use by other peers.
    pub fn get_or_create_slot(&mut self, peer: MacAddr) -> Option<usize> {
        if peer.is_zero() {
            return None;
        }
        if let Some(index) = self.find_slot(peer) {
            return Some(index);
        }
        let index = self.slots.iter().position(NdlSlot::is_empty)?;
        self.slots[index].peer_nmi = peer;
        Some(index)
    }

    /// Slot currently linked to `peer`.
    pub fn find_slot(&self, peer: MacAddr) -> Option<usize> {
        if peer.is_zero() {
            return None;
        }
        self.slots.iter().position(|s| s.peer_nmi == peer)
    }

    /// Add one data path to a slot.
    pub fn retain(&mut self, slot: usize) -> Option<u32> {
        let entry = self.slots.get_mut(slot)?;
        entry.ndp_count += 1;
        Some(entry.ndp_count)
    }

    /// Remove one data path from a slot, returning the new count.
    ///
    /// The peer address is cleared when the count reaches zero. Releasing a
    /// slot whose count is already zero is logged and leaves it at zero.
    pub fn release(&mut self, slot: usize) -> u32 {
        let Some(entry) = self.slots.get_mut(slot) else {
            warn!(slot, "release of out-of-range ndl slot");
            return 0;
        };

        if entry.ndp_count == 0 {
            warn!(
                slot,
                peer = %entry.peer_nmi,
                "ndl slot count underflow, clamping to zero"
            );
        } else {
            entry.ndp_count -= 1;
        }

        if entry.ndp_count == 0 {
            entry.peer_nmi = MacAddr::ZERO;
        }
        entry.ndp_count
    }

    /// Undo a claim made by `get_or_create_slot` that was never retained.
    pub fn abandon_claim(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            if entry.ndp_count == 0 {
                entry.peer_nmi = MacAddr::ZERO;
            }
        }
    }

    /// Peer address of a slot (zero when free).
    pub fn slot_peer(&self, slot: usize) -> Option<MacAddr> {
        self.slots.get(slot).map(|s| s.peer_nmi)
    }

    /// Live data-path count of a slot.
    pub fn ndp_count(&self, slot: usize) -> Option<u32> {
        self.slots.get(slot).map(|s| s.ndp_count)
    }

    /// Borrow a slot.
    pub fn slot(&self, slot: usize) -> Option<&NdlSlot> {
        self.slots.get(slot)
    }

    /// Iterate over all slots with their index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &NdlSlot)> {
        self.slots.iter().enumerate()
    }

    /// Check if `slot` is a valid index.
    pub fn in_range(&self, slot: usize) -> bool {
        slot < self.slots.len()
    }

    /// Firmware vif id for a slot index.
    pub fn vif_id(&self, slot: usize) -> NdlVifId {
        NdlVifId(self.vif_base + slot as u16)
    }

    /// Slot index for a firmware vif id.
    pub fn slot_for_vif(&self, vif: NdlVifId) -> Option<usize> {
        let index = vif.0.checked_sub(self.vif_base)? as usize;
        self.in_range(index).then_some(index)
    }

    /// Number of slots linked to a peer.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    /// Reset every slot.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = NdlSlot::default());
    }
}
