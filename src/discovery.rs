//! Discovery-session records.
//!
//! One record per active publish or subscribe instance. A record remembers
//! the last peer matched on the session so later requests addressed only
//! by peer can find their session id. Indications naming a session with no
//! record are not remembered, so the table never outgrows the service pool.

use crate::MacAddr;
use std::collections::BTreeMap;
use std::fmt;

/// Which side of discovery a service instance plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionRole {
    Publish,
    Subscribe,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Publish => write!(f, "publish"),
            SessionRole::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// State kept per discovery session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryRecord {
    /// Always set once opened; `None` only on a default record.
    pub role: Option<SessionRole>,
    /// Last matched peer discovery address; zero if none.
    pub peer: MacAddr,
    /// Last match id; 0 if none.
    pub match_id: u16,
    pub serial: u64,
}

/// Session id to record map, ordered by id for deterministic lookups.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRegistry {
    records: BTreeMap<u16, DiscoveryRecord>,
}

impl DiscoveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or refresh the record for a local publish/subscribe.
    ///
    /// A modify keeps the last matched peer.
    pub fn open_session(&mut self, session_id: u16, role: SessionRole, serial: u64) {
        let record = self.records.entry(session_id).or_default();
        record.role = Some(role);
        record.serial = serial;
    }

    /// Remember the latest peer matched on an open session.
    ///
    /// Returns false, recording nothing, if the session has no record.
    pub fn record_match(&mut self, session_id: u16, peer: MacAddr, match_id: u16) -> bool {
        match self.records.get_mut(&session_id) {
            Some(record) => {
                record.peer = peer;
                record.match_id = match_id;
                true
            }
            None => false,
        }
    }

    /// Forget a match if it is still the one recorded.
    pub fn clear_match(&mut self, session_id: u16, match_id: u16) -> bool {
        match self.records.get_mut(&session_id) {
            Some(record) if record.match_id == match_id => {
                record.peer = MacAddr::ZERO;
                record.match_id = 0;
                true
            }
            _ => false,
        }
    }

    /// Lowest session id whose last match was `peer`, with that match id.
    pub fn find_by_peer(&self, peer: MacAddr) -> Option<(u16, u16)> {
        if peer.is_zero() {
            return None;
        }
        self.records
            .iter()
            .find(|(_, r)| r.peer == peer)
            .map(|(&id, r)| (id, r.match_id))
    }

    /// Role of a session, if it is a local publish/subscribe.
    pub fn role(&self, session_id: u16) -> Option<SessionRole> {
        self.records.get(&session_id).and_then(|r| r.role)
    }

    pub fn get(&self, session_id: u16) -> Option<&DiscoveryRecord> {
        self.records.get(&session_id)
    }

    /// Drop a session record.
    pub fn close_session(&mut self, session_id: u16) -> Option<DiscoveryRecord> {
        self.records.remove(&session_id)
    }

    /// Drop a record only if it still carries `serial`.
    pub fn close_if_serial(&mut self, session_id: u16, serial: u64) -> bool {
        match self.records.get(&session_id) {
            Some(r) if r.serial == serial => self.records.remove(&session_id).is_some(),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
