//! Follow-up single-flight tracking.
//!
//! At most one follow-up message may be outstanding per match. The tracker
//! is a small fixed table of `(match_id, transaction_id)` pairs; an entry
//! is pushed when a follow-up is accepted and popped when the transmit
//! status arrives, whatever that status is.

use thiserror::Error;

/// Reasons a follow-up cannot be queued. Both are designed rejections.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FollowupError {
    #[error("follow-up already pending for match {match_id} (transaction {transaction_id})")]
    Pending { match_id: u16, transaction_id: u16 },

    #[error("follow-up table full: max {max} outstanding")]
    Full { max: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FollowupEntry {
    match_id: u16,
    transaction_id: u16,
}

/// Bounded match-id to transaction-id association table.
#[derive(Debug, Clone)]
pub struct FollowupTracker {
    slots: Box<[Option<FollowupEntry>]>,
}

impl FollowupTracker {
    /// Create a tracker with room for `capacity` outstanding follow-ups.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
        }
    }

    /// Record an outstanding follow-up for `match_id`.
    ///
    /// Returns the table slot used.
    pub fn push(&mut self, match_id: u16, transaction_id: u16) -> Result<usize, FollowupError> {
        if let Some(pending) = self.pending(match_id) {
            return Err(FollowupError::Pending {
                match_id,
                transaction_id: pending,
            });
        }

        let max = self.slots.len();
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(FollowupError::Full { max })?;

        *slot = Some(FollowupEntry {
            match_id,
            transaction_id,
        });
        Ok(index)
    }

    /// Remove the entry for `match_id`, returning its transaction id.
    pub fn pop(&mut self, match_id: u16) -> Option<u16> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(e) if e.match_id == match_id))?;
        slot.take().map(|e| e.transaction_id)
    }

    /// Remove the entry only if it still belongs to `transaction_id`.
    pub fn remove_if(&mut self, match_id: u16, transaction_id: u16) -> bool {
        match self.pending(match_id) {
            Some(tid) if tid == transaction_id => self.pop(match_id).is_some(),
            _ => false,
        }
    }

    /// Transaction id of the outstanding follow-up for `match_id`.
    pub fn pending(&self, match_id: u16) -> Option<u16> {
        self.slots
            .iter()
            .flatten()
            .find(|e| e.match_id == match_id)
            .map(|e| e.transaction_id)
    }

    /// Number of outstanding follow-ups.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Check if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}
