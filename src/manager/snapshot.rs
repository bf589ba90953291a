//! Read-only view of manager state for diagnostics.

use super::{NanState, SessionManager, State};
use crate::datapath::PeerRecord;
use crate::firmware::Firmware;
use crate::ndl::NdlVifId;
use crate::ndp::NdpState;
use crate::MacAddr;
use std::fmt;

/// One live NDP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NdpSnapshot {
    pub ndp_id: u16,
    pub state: NdpState,
    pub vif: NdlVifId,
    pub local_ndi: MacAddr,
    pub peer_ndi: MacAddr,
    pub active: bool,
}

/// One claimed NDL slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NdlSnapshot {
    pub vif: NdlVifId,
    pub peer_nmi: MacAddr,
    pub ndp_count: u32,
}

/// Point-in-time copy of every pool and table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerSnapshot {
    pub state: NanState,
    pub nmi: MacAddr,
    pub generation: u64,
    pub degraded: bool,
    pub services: Vec<u16>,
    pub discovery_sessions: usize,
    pub followups: usize,
    pub ndps: Vec<NdpSnapshot>,
    pub ndl_slots: Vec<NdlSnapshot>,
    pub pairing: Vec<u16>,
    pub bootstrapping: Vec<u16>,
    pub interfaces: Vec<(MacAddr, Vec<PeerRecord>)>,
}

impl ManagerSnapshot {
    /// True when no identifier of any kind is allocated.
    pub fn is_idle(&self) -> bool {
        self.services.is_empty()
            && self.followups == 0
            && self.ndps.is_empty()
            && self.ndl_slots.is_empty()
            && self.pairing.is_empty()
            && self.bootstrapping.is_empty()
    }

    fn from_state(st: &State) -> Self {
        let ndps = st
            .ndp
            .in_use_ids()
            .into_iter()
            .filter_map(|id| {
                st.ndp.entry(id).map(|e| NdpSnapshot {
                    ndp_id: id,
                    state: e.state,
                    vif: st.ndl.vif_id(e.slot),
                    local_ndi: e.local_ndi,
                    peer_ndi: e.peer_ndi,
                    active: e.active,
                })
            })
            .collect();

        let ndl_slots = st
            .ndl
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(slot, s)| NdlSnapshot {
                vif: st.ndl.vif_id(slot),
                peer_nmi: s.peer_nmi,
                ndp_count: s.ndp_count,
            })
            .collect();

        Self {
            state: st.nan,
            nmi: st.nmi,
            generation: st.generation,
            degraded: st.degraded,
            services: st.services.active_ids(),
            discovery_sessions: st.discovery.len(),
            followups: st.followups.len(),
            ndps,
            ndl_slots,
            pairing: st.pairing.iter().map(|(id, _)| id).collect(),
            bootstrapping: st.bootstrap.iter().map(|(id, _)| id).collect(),
            interfaces: st
                .interfaces
                .iter()
                .map(|i| (i.local_ndi(), i.peers()))
                .collect(),
        }
    }
}

impl fmt::Display for ManagerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nmi={} services={} ndps={} slots={} pairing={} bootstrapping={} followups={}",
            self.state,
            self.nmi,
            self.services.len(),
            self.ndps.len(),
            self.ndl_slots.len(),
            self.pairing.len(),
            self.bootstrapping.len(),
            self.followups
        )?;
        if self.degraded {
            write!(f, " DEGRADED")?;
        }
        Ok(())
    }
}

impl<F: Firmware> SessionManager<F> {
    /// Copy the current state under the manager-wide lock.
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot::from_state(&self.state.lock())
    }
}
