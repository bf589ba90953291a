//! NAN Data Path operations and notifications.

use super::{Claim, SessionManager, State};
use crate::error::{Command, IdKind, NanError, Resource};
use crate::firmware::Firmware;
use crate::ndl::NdlVifId;
use crate::ndp::{NdpError, NdpState};
use crate::request::{NdpEndRequest, NdpInitiateRequest, NdpRespondRequest};
use crate::MacAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Reason code logged when the setup watchdog fires.
const REASON_SETUP_TIMEOUT: u16 = 0xffff;

impl State {
    /// Allocate an NDP id, a slot for `peer_nmi`, and the entry.
    ///
    /// On any failure nothing stays allocated.
    fn open_ndp(
        &mut self,
        peer_nmi: MacAddr,
        local_ndi: MacAddr,
    ) -> Result<(u16, NdlVifId, Claim), NanError> {
        let ndp_id = self.ndp.allocate_id().map_err(|_| {
            info!(peer = %peer_nmi, "Ndp ids exhausted");
            NanError::exhausted(Resource::NdpId)
        })?;

        let Some(slot) = self.ndl.get_or_create_slot(peer_nmi) else {
            info!(ndp_id, peer = %peer_nmi, "Ndl slots exhausted");
            if let Err(e) = self.ndp.release_id(ndp_id) {
                self.enter_degraded(&e.to_string());
            }
            return Err(NanError::exhausted(Resource::NdlSlot));
        };

        let claim = self.claim();
        if let Err(e) = self
            .ndp
            .new_entry(&mut self.ndl, ndp_id, slot, local_ndi, claim.serial)
        {
            self.ndl.abandon_claim(slot);
            if !matches!(e, NdpError::Corrupt { .. }) {
                if let Err(e) = self.ndp.release_id(ndp_id) {
                    warn!(ndp_id, error = %e, "Ndp id release mismatch");
                }
            }
            self.enter_degraded(&e.to_string());
            return Err(NanError::Degraded);
        }

        Ok((ndp_id, self.ndl.vif_id(slot), claim))
    }

    fn log_ndp_table(&self) {
        for ndp_id in self.ndp.in_use_ids() {
            let Some(e) = self.ndp.entry(ndp_id) else {
                continue;
            };
            debug!(
                ndp_id,
                state = %e.state,
                vif = %self.ndl.vif_id(e.slot),
                ndi = %e.local_ndi,
                peer_ndi = %e.peer_ndi,
                active = e.active,
                "ndp entry"
            );
        }
    }
}

impl<F: Firmware> SessionManager<F> {
    /// Open a data path to a matched peer as initiator.
    pub fn ndp_initiate(&self, req: &NdpInitiateRequest) -> Result<u16, NanError> {
        if req.peer_nmi.is_zero() {
            return Err(NanError::InvalidParameter("peer discovery address not set"));
        }
        if req.local_ndi.is_zero() || req.local_ndi.is_multicast() {
            return Err(NanError::InvalidParameter("local data interface must be unicast"));
        }

        let (ndp_id, vif, claim) = {
            let mut st = self.state.lock();
            st.ensure_allocatable()?;
            st.open_ndp(req.peer_nmi, req.local_ndi)?
        };

        if let Err(e) = self.firmware.ndp_request(req, ndp_id, vif) {
            warn!(tid = req.transaction_id, ndp_id, vif = %vif, error = %e, "Firmware rejected ndp request");
            self.state.lock().teardown_claimed_ndp(ndp_id, claim);
            return Err(NanError::rejected(Command::NdpRequest, e));
        }

        info!(
            tid = req.transaction_id,
            ndp_id,
            vif = %vif,
            peer = %req.peer_nmi,
            "Ndp requested"
        );
        Ok(ndp_id)
    }

    /// Answer a peer-initiated data path.
    ///
    /// A reject releases the entry before the answer is forwarded.
    pub fn ndp_respond(&self, req: &NdpRespondRequest) -> Result<u16, NanError> {
        let ndp_id = req.ndp_instance_id;
        if req.accept && (req.local_ndi.is_zero() || req.local_ndi.is_multicast()) {
            return Err(NanError::InvalidParameter("local data interface must be unicast"));
        }

        let (local_ref, vif, claim) = {
            let mut st = self.state.lock();
            st.ensure_enabled()?;

            let entry = st
                .ndp
                .entry(ndp_id)
                .filter(|e| e.state == NdpState::InUse)
                .ok_or(NanError::invalid(IdKind::Ndp, ndp_id))?;
            let local_ref = entry
                .local_ref
                .ok_or(NanError::invalid(IdKind::Ndp, ndp_id))?;
            let vif = st.ndl.vif_id(entry.slot);
            let claim = Claim {
                generation: st.generation,
                serial: entry.serial,
            };

            if req.accept {
                st.ndp.set_local_ndi(ndp_id, req.local_ndi);
            } else {
                st.teardown_ndp(ndp_id);
            }
            (local_ref, vif, claim)
        };

        if let Err(e) = self.firmware.ndp_response(req, local_ref, Some(vif)) {
            warn!(tid = req.transaction_id, ndp_id, error = %e, "Firmware rejected ndp response");
            if req.accept {
                self.state.lock().teardown_claimed_ndp(ndp_id, claim);
            }
            return Err(NanError::rejected(Command::NdpResponse, e));
        }

        info!(tid = req.transaction_id, ndp_id, accept = req.accept, "Ndp response sent");
        Ok(ndp_id)
    }

    /// Ask firmware to end data paths.
    ///
    /// Unknown or non-InUse ids are skipped. Entries move to Terminating and
    /// are released by the termination notification. Returns how many
    /// terminations firmware accepted.
    pub fn ndp_end(&self, req: &NdpEndRequest) -> Result<usize, NanError> {
        self.state.lock().ensure_enabled()?;

        let mut accepted = 0;
        let mut first_error = None;
        for &ndp_id in &req.ndp_instance_ids {
            let claim = {
                let st = self.state.lock();
                match st.ndp.entry(ndp_id) {
                    Some(e) if e.state == NdpState::InUse => Claim {
                        generation: st.generation,
                        serial: e.serial,
                    },
                    _ => {
                        warn!(tid = req.transaction_id, ndp_id, "Ndp end for id not in use, skipping");
                        continue;
                    }
                }
            };

            match self.firmware.ndp_terminate(req.transaction_id, ndp_id) {
                Ok(()) => {
                    let mut st = self.state.lock();
                    let current = st
                        .ndp
                        .entry(ndp_id)
                        .is_some_and(|e| e.serial == claim.serial);
                    if st.generation == claim.generation && current {
                        st.ndp.mark_terminating(ndp_id);
                    }
                    accepted += 1;
                    debug!(tid = req.transaction_id, ndp_id, "Ndp terminating");
                }
                Err(e) => {
                    warn!(tid = req.transaction_id, ndp_id, error = %e, "Firmware rejected ndp terminate");
                    first_error.get_or_insert(NanError::rejected(Command::NdpTerminate, e));
                }
            }
        }

        match first_error {
            Some(e) if accepted == 0 => Err(e),
            _ => Ok(accepted),
        }
    }

    /// A peer asked to open a data path.
    ///
    /// Returns the NDP id allocated for it. When no id or slot is free the
    /// request is rejected towards firmware and `None` is returned.
    pub fn on_ndp_requested(
        &self,
        session_id: u16,
        match_id: u16,
        peer_nmi: MacAddr,
        local_ref: u16,
    ) -> Option<u16> {
        let opened = {
            let mut st = self.state.lock();
            if let Some(existing) = st.ndp.find_by_local_ref(local_ref) {
                debug!(ndp_id = existing, local_ref, "Duplicate ndp request indication");
                return Some(existing);
            }
            let result = st.ensure_allocatable().and_then(|()| {
                if peer_nmi.is_zero() {
                    return Err(NanError::InvalidParameter("peer discovery address not set"));
                }
                st.open_ndp(peer_nmi, MacAddr::ZERO)
            });
            if let Ok((ndp_id, _, _)) = result {
                st.ndp.set_local_ref(ndp_id, local_ref);
                st.discovery.record_match(session_id, peer_nmi, match_id);
            }
            result
        };

        match opened {
            Ok((ndp_id, vif, _)) => {
                info!(ndp_id, vif = %vif, peer = %peer_nmi, local_ref, "Ndp requested by peer");
                Some(ndp_id)
            }
            Err(e) => {
                info!(peer = %peer_nmi, local_ref, error = %e, "Rejecting peer ndp request");
                let reject = NdpRespondRequest {
                    accept: false,
                    ..Default::default()
                };
                if let Err(e) = self.firmware.ndp_response(&reject, local_ref, None) {
                    warn!(local_ref, error = %e, "Firmware rejected automatic ndp reject");
                }
                None
            }
        }
    }

    /// Outcome of data path negotiation.
    ///
    /// Accepted: the entry becomes active and its peer is recorded on the
    /// local data interface. Rejected: the entry is released.
    pub fn on_ndp_setup_result(&self, ndp_id: u16, peer_ndi: MacAddr, accepted: bool, reason: u16) {
        let mut st = self.state.lock();
        let Some(entry) = st.ndp.entry(ndp_id).filter(|e| e.is_live()).cloned() else {
            debug!(ndp_id, "Setup result for free ndp");
            return;
        };

        if accepted && peer_ndi.is_zero() {
            warn!(ndp_id, "Setup confirmed without a peer data address, releasing");
        }
        if !accepted || peer_ndi.is_zero() {
            st.teardown_ndp(ndp_id);
            info!(ndp_id, reason, "Ndp setup rejected");
            st.log_ndp_table();
            return;
        }

        if entry.state != NdpState::InUse || entry.active {
            debug!(ndp_id, state = %entry.state, "Setup result ignored");
            return;
        }
        if entry.local_ndi.is_zero() {
            warn!(ndp_id, "Setup confirmed without a local data interface");
            return;
        }

        let vif = st.ndl.vif_id(entry.slot);
        if st.interfaces.get(entry.local_ndi).is_none() {
            info!(ndp_id, ndi = %entry.local_ndi, "Registering unknown data interface");
        }
        let count = st
            .interfaces
            .get_or_create(entry.local_ndi)
            .add_peer_ref(peer_ndi, vif);
        st.ndp.mark_active(ndp_id, peer_ndi);

        info!(
            ndp_id,
            vif = %vif,
            ndi = %entry.local_ndi,
            peer_ndi = %peer_ndi,
            peer_ndps = count,
            "Ndp established"
        );
        st.log_ndp_table();
    }

    /// Firmware ended a data path. Safe to call for an already free id.
    pub fn on_ndp_terminated(&self, ndp_id: u16, reason: u16) -> bool {
        let mut st = self.state.lock();
        match st.teardown_ndp(ndp_id) {
            Some(entry) => {
                info!(
                    ndp_id,
                    reason,
                    vif = %st.ndl.vif_id(entry.slot),
                    was = %entry.state,
                    "Ndp terminated"
                );
                st.log_ndp_table();
                true
            }
            None => {
                debug!(ndp_id, reason, "Termination for free ndp");
                false
            }
        }
    }

    /// A local data interface went away; every NDP on it is released.
    pub fn on_data_interface_down(&self, local_ndi: MacAddr) -> usize {
        if local_ndi.is_zero() || local_ndi.is_multicast() {
            warn!(ndi = %local_ndi, "Interface down for a non-unicast address, ignoring");
            return 0;
        }
        let mut st = self.state.lock();
        let ids = st.ndp.entries_for_ndi(local_ndi);
        let released = ids
            .iter()
            .filter(|&&id| st.teardown_ndp(id).is_some())
            .count();
        if let Some(iface) = st.interfaces.get(local_ndi) {
            iface.clear_peers();
        }
        info!(ndi = %local_ndi, released, "Data interface down");
        released
    }

    /// Release NDPs whose setup did not complete within `timeout`.
    ///
    /// Firmware is asked to terminate each; the entry is then released
    /// unless it was freed or replaced in the meantime.
    pub fn expire_stalled_ndps(&self, now: Instant, timeout: Duration) -> Vec<u16> {
        let stalled: Vec<(u16, Claim)> = {
            let st = self.state.lock();
            st.ndp
                .stalled(now, timeout)
                .into_iter()
                .filter_map(|id| {
                    st.ndp.entry(id).map(|e| {
                        (
                            id,
                            Claim {
                                generation: st.generation,
                                serial: e.serial,
                            },
                        )
                    })
                })
                .collect()
        };

        let mut expired = Vec::new();
        for (ndp_id, claim) in stalled {
            if let Err(e) = self.firmware.ndp_terminate(0, ndp_id) {
                debug!(ndp_id, error = %e, "Terminate of stalled ndp rejected");
            }
            if self.state.lock().teardown_claimed_ndp(ndp_id, claim).is_some() {
                warn!(ndp_id, timeout_secs = timeout.as_secs(), reason = REASON_SETUP_TIMEOUT, "Ndp setup timed out");
                expired.push(ndp_id);
            }
        }
        expired
    }
}
