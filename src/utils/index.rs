//! Instance Identifier Allocator
//!
//! Manages allocation of small integer identifiers in a fixed range
//! `[1, capacity]`. Every NAN instance space (publish/subscribe services,
//! NDP instances, pairing and bootstrapping instances) draws its ids from
//! one of these pools.
//!
//! ## Design
//!
//! - `0` is reserved as "no identifier" and is never handed out
//! - Allocation scans forward from a caller-supplied hint and wraps to 1,
//!   so a rotating hint spreads reuse across the id space
//! - Occupancy lives in a bounded slice indexed by `id - 1`; an id outside
//!   the range can never be marked

use std::fmt;
use thiserror::Error;

/// Errors related to identifier allocation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("no available identifiers (pool of {capacity} exhausted)")]
    Exhausted { capacity: u16 },

    #[error("identifier {0} out of range")]
    OutOfRange(u16),

    #[error("identifier {0} not allocated")]
    NotAllocated(u16),
}

/// Fixed-capacity identifier pool with a wrap-around allocation hint.
#[derive(Clone)]
pub struct IdentifierPool {
    /// Occupancy for ids `1..=capacity`, stored at `id - 1`.
    in_use: Box<[bool]>,
    /// Number of ids currently allocated.
    count: usize,
}

impl IdentifierPool {
    /// Create an empty pool covering `[1, capacity]`.
    pub fn new(capacity: u16) -> Self {
        Self {
            in_use: vec![false; capacity as usize].into_boxed_slice(),
            count: 0,
        }
    }

    /// Highest id this pool can hand out.
    pub fn capacity(&self) -> u16 {
        self.in_use.len() as u16
    }

    /// Allocate the first free id at or after `start_hint`, wrapping to 1.
    ///
    /// A hint of 0 is treated as 1. A hint beyond the capacity yields no
    /// id at all, which callers only hit if they fail to wrap their hint.
    pub fn allocate(&mut self, start_hint: u16) -> Result<u16, IndexError> {
        let capacity = self.capacity();
        let start = start_hint.max(1);

        if start > capacity {
            return Err(IndexError::Exhausted { capacity });
        }

        let candidate = (start..=capacity)
            .chain(1..start)
            .find(|&id| !self.in_use[(id - 1) as usize]);

        match candidate {
            Some(id) => {
                self.in_use[(id - 1) as usize] = true;
                self.count += 1;
                Ok(id)
            }
            None => Err(IndexError::Exhausted { capacity }),
        }
    }

    /// Allocate the lowest free id.
    pub fn allocate_first(&mut self) -> Result<u16, IndexError> {
        self.allocate(1)
    }

    /// Return an id to the pool.
    ///
    /// Freeing an id that is not allocated leaves the pool untouched and
    /// reports `NotAllocated`; callers log it as a double free.
    pub fn free(&mut self, id: u16) -> Result<(), IndexError> {
        let slot = self.slot_mut(id)?;
        if !*slot {
            return Err(IndexError::NotAllocated(id));
        }
        *slot = false;
        self.count -= 1;
        Ok(())
    }

    /// Check if an id is currently allocated. Out-of-range ids never are.
    pub fn is_active(&self, id: u16) -> bool {
        id != 0 && self.in_use.get((id - 1) as usize).copied().unwrap_or(false)
    }

    /// Check if an id is inside `[1, capacity]`.
    pub fn in_range(&self, id: u16) -> bool {
        id != 0 && id <= self.capacity()
    }

    /// Number of currently allocated ids.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Check if no ids are allocated.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if every id is allocated.
    pub fn is_full(&self) -> bool {
        self.count == self.in_use.len()
    }

    /// Allocated ids in ascending order.
    pub fn active_ids(&self) -> Vec<u16> {
        self.in_use
            .iter()
            .enumerate()
            .filter(|(_, used)| **used)
            .map(|(i, _)| i as u16 + 1)
            .collect()
    }

    /// Release every id.
    pub fn clear(&mut self) {
        self.in_use.iter_mut().for_each(|used| *used = false);
        self.count = 0;
    }

    fn slot_mut(&mut self, id: u16) -> Result<&mut bool, IndexError> {
        if id == 0 {
            return Err(IndexError::OutOfRange(id));
        }
        self.in_use
            .get_mut((id - 1) as usize)
            .ok_or(IndexError::OutOfRange(id))
    }
}

impl fmt::Debug for IdentifierPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierPool")
            .field("capacity", &self.capacity())
            .field("active", &self.active_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_pool_basic() {
        let mut pool = IdentifierPool::new(4);
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 4);

        let id1 = pool.allocate_first().unwrap();
        let id2 = pool.allocate_first().unwrap();
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert_eq!(pool.count(), 2);
        assert!(pool.is_active(1));
        assert!(!pool.is_active(3));

        pool.free(id1).unwrap();
        assert!(!pool.is_active(id1));
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn test_pool_never_allocates_zero() {
        let mut pool = IdentifierPool::new(3);
        let ids: Vec<u16> = (0..3).map(|_| pool.allocate(0).unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(!pool.is_active(0));
    }

    #[test]
    fn test_pool_wraps_from_hint() {
        let mut pool = IdentifierPool::new(4);
        assert_eq!(pool.allocate(3).unwrap(), 3);
        assert_eq!(pool.allocate(3).unwrap(), 4);
        // Nothing left at or after 3, wraps to the low end
        assert_eq!(pool.allocate(3).unwrap(), 1);
        assert_eq!(pool.allocate(4).unwrap(), 2);
    }

    #[test]
    fn test_pool_hint_beyond_capacity() {
        let mut pool = IdentifierPool::new(4);
        assert_eq!(
            pool.allocate(5),
            Err(IndexError::Exhausted { capacity: 4 })
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = IdentifierPool::new(2);
        pool.allocate_first().unwrap();
        pool.allocate_first().unwrap();
        assert!(pool.is_full());
        assert_eq!(
            pool.allocate_first(),
            Err(IndexError::Exhausted { capacity: 2 })
        );
    }

    #[test]
    fn test_pool_double_free() {
        let mut pool = IdentifierPool::new(4);
        let id = pool.allocate_first().unwrap();
        pool.free(id).unwrap();
        assert_eq!(pool.free(id), Err(IndexError::NotAllocated(id)));
        assert_eq!(pool.count(), 0);
    }

    #[test]
    fn test_pool_free_out_of_range() {
        let mut pool = IdentifierPool::new(4);
        assert_eq!(pool.free(0), Err(IndexError::OutOfRange(0)));
        assert_eq!(pool.free(5), Err(IndexError::OutOfRange(5)));
        assert!(!pool.is_active(5));
    }

    #[test]
    fn test_pool_reuse_after_free() {
        let mut pool = IdentifierPool::new(8);
        let id = pool.allocate_first().unwrap();
        pool.free(id).unwrap();
        assert_eq!(pool.allocate_first().unwrap(), id);
    }

    #[test]
    fn test_pool_no_duplicates_under_churn() {
        let mut pool = IdentifierPool::new(16);
        let mut live: HashSet<u16> = HashSet::new();
        let mut hint = 1u16;

        // Deterministic mix of allocations and frees
        for step in 0..500u32 {
            if step % 3 == 2 && !live.is_empty() {
                let victim = *live.iter().min().unwrap();
                pool.free(victim).unwrap();
                live.remove(&victim);
            } else {
                match pool.allocate(hint) {
                    Ok(id) => {
                        assert!(live.insert(id), "id {} handed out twice", id);
                        hint = (id + 1) % 17;
                    }
                    Err(IndexError::Exhausted { .. }) => assert_eq!(live.len(), 16),
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            assert!(live.len() <= 16);
            assert_eq!(pool.count(), live.len());
        }
    }

    #[test]
    fn test_pool_clear() {
        let mut pool = IdentifierPool::new(4);
        for _ in 0..4 {
            pool.allocate_first().unwrap();
        }
        pool.clear();
        assert!(pool.is_empty());
        assert!(pool.active_ids().is_empty());
    }

    #[test]
    fn test_index_error_display() {
        assert_eq!(
            IndexError::Exhausted { capacity: 8 }.to_string(),
            "no available identifiers (pool of 8 exhausted)"
        );
        assert_eq!(IndexError::NotAllocated(3).to_string(), "identifier 3 not allocated");
    }
}
