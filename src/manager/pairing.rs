//! Pairing and bootstrapping operations and notifications.

use super::{Claim, SessionManager};
use crate::error::{Command, IdKind, NanError, Resource};
use crate::firmware::Firmware;
use crate::pairing::{BootstrapInstance, PairingInstance, PairingRole};
use crate::request::{BootstrapRequest, BootstrapResponse, PairingRequest, PairingResponse};
use crate::MacAddr;
use tracing::{debug, info, warn};

impl<F: Firmware> SessionManager<F> {
    // === Pairing ===

    /// Start pairing with a matched peer.
    ///
    /// The session id is taken from the discovery record of the peer.
    pub fn pairing_request(&self, req: &PairingRequest) -> Result<u16, NanError> {
        if req.peer.is_zero() {
            return Err(NanError::InvalidParameter("peer discovery address not set"));
        }

        let (pairing_id, session_id, claim) = {
            let mut st = self.state.lock();
            st.ensure_allocatable()?;

            let session_id = match st.discovery.find_by_peer(req.peer) {
                Some((session_id, _)) => session_id,
                None => {
                    debug!(tid = req.transaction_id, peer = %req.peer, "No discovery record for pairing peer");
                    0
                }
            };
            let claim = st.claim();
            let pairing_id = st
                .pairing
                .allocate(PairingInstance {
                    peer: req.peer,
                    match_id: req.match_id,
                    session_id,
                    role: PairingRole::Initiator,
                    completed: false,
                    serial: claim.serial,
                })
                .map_err(|_| {
                    info!(tid = req.transaction_id, peer = %req.peer, "Pairing ids exhausted");
                    NanError::exhausted(Resource::PairingId)
                })?;
            (pairing_id, session_id, claim)
        };

        if let Err(e) = self.firmware.pairing_request(req, pairing_id, session_id) {
            warn!(tid = req.transaction_id, pairing_id, error = %e, "Firmware rejected pairing request");
            self.release_pairing(pairing_id, claim);
            return Err(NanError::rejected(Command::PairingRequest, e));
        }

        info!(tid = req.transaction_id, pairing_id, session_id, peer = %req.peer, "Pairing requested");
        Ok(pairing_id)
    }

    /// Answer an inbound pairing indication.
    ///
    /// Peer, match and session are taken from the instance the indication
    /// created. A reject, or a rejected forward, releases the instance.
    pub fn pairing_response(&self, req: &PairingResponse) -> Result<u16, NanError> {
        let pairing_id = req.pairing_instance_id;
        let (instance, claim) = {
            let st = self.state.lock();
            st.ensure_enabled()?;
            let instance = st
                .pairing
                .get(pairing_id)
                .filter(|p| p.role == PairingRole::Responder && !p.completed)
                .copied()
                .ok_or(NanError::invalid(IdKind::Pairing, pairing_id))?;
            let claim = Claim {
                generation: st.generation,
                serial: instance.serial,
            };
            (instance, claim)
        };

        let result = self.firmware.pairing_response(req, &instance);
        if result.is_err() || !req.accept {
            self.release_pairing(pairing_id, claim);
        }
        if let Err(e) = result {
            warn!(tid = req.transaction_id, pairing_id, error = %e, "Firmware rejected pairing response");
            return Err(NanError::rejected(Command::PairingResponse, e));
        }

        info!(
            tid = req.transaction_id,
            pairing_id,
            accept = req.accept,
            peer = %instance.peer,
            "Pairing response sent"
        );
        Ok(pairing_id)
    }

    /// End a pairing session. The instance is released before forwarding.
    pub fn pairing_end(&self, transaction_id: u16, pairing_id: u16) -> Result<(), NanError> {
        let instance = {
            let mut st = self.state.lock();
            st.ensure_enabled()?;
            st.pairing
                .release(pairing_id)
                .ok_or(NanError::invalid(IdKind::Pairing, pairing_id))?
        };

        if let Err(e) = self.firmware.pairing_end(transaction_id, pairing_id, instance.peer) {
            warn!(tid = transaction_id, pairing_id, error = %e, "Firmware rejected pairing end");
        }
        info!(tid = transaction_id, pairing_id, peer = %instance.peer, "Pairing ended");
        Ok(())
    }

    fn release_pairing(&self, pairing_id: u16, claim: Claim) {
        let mut st = self.state.lock();
        if st.generation == claim.generation {
            st.pairing.release_if(pairing_id, |p| p.serial == claim.serial);
        }
    }

    /// A peer asked to pair. Returns the pairing id allocated for it.
    pub fn on_pairing_requested(&self, peer: MacAddr, match_id: u16, session_id: u16) -> Option<u16> {
        let mut st = self.state.lock();
        if st.ensure_allocatable().is_err() {
            warn!(peer = %peer, "Pairing indication while not accepting allocations");
            return None;
        }

        st.discovery.record_match(session_id, peer, match_id);
        let claim = st.claim();
        let allocated = st.pairing.allocate(PairingInstance {
            peer,
            match_id,
            session_id,
            role: PairingRole::Responder,
            completed: false,
            serial: claim.serial,
        });

        match allocated {
            Ok(pairing_id) => {
                info!(pairing_id, peer = %peer, match_id, session_id, "Pairing requested by peer");
                Some(pairing_id)
            }
            Err(_) => {
                info!(peer = %peer, "Pairing ids exhausted, ignoring indication");
                None
            }
        }
    }

    /// Pairing with `peer` finished. Rejection releases the instance.
    pub fn on_pairing_confirmed(&self, peer: MacAddr, accepted: bool) -> Option<u16> {
        let mut st = self.state.lock();
        let Some(pairing_id) = st.pairing.find_pending_by_peer(peer) else {
            debug!(peer = %peer, "Pairing confirm with no pending instance");
            return None;
        };

        if accepted {
            if let Some(p) = st.pairing.get_mut(pairing_id) {
                p.completed = true;
            }
        } else {
            st.pairing.release(pairing_id);
        }
        info!(pairing_id, peer = %peer, accepted, "Pairing confirmed");
        Some(pairing_id)
    }

    // === Bootstrapping ===

    /// Start bootstrapping with a matched peer.
    pub fn bootstrapping_request(&self, req: &BootstrapRequest) -> Result<u16, NanError> {
        if req.peer.is_zero() {
            return Err(NanError::InvalidParameter("peer discovery address not set"));
        }

        let (bootstrapping_id, claim) = {
            let mut st = self.state.lock();
            st.ensure_allocatable()?;
            if st.service_role(req.session_id).is_none() {
                return Err(NanError::invalid(IdKind::Service, req.session_id));
            }
            let claim = st.claim();
            let id = st
                .bootstrap
                .allocate(BootstrapInstance {
                    peer: req.peer,
                    match_id: req.match_id,
                    session_id: req.session_id,
                    inbound: false,
                    serial: claim.serial,
                })
                .map_err(|_| {
                    info!(tid = req.transaction_id, peer = %req.peer, "Bootstrapping ids exhausted");
                    NanError::exhausted(Resource::BootstrappingId)
                })?;
            (id, claim)
        };

        if let Err(e) = self.firmware.bootstrapping_request(req, bootstrapping_id) {
            warn!(tid = req.transaction_id, bootstrapping_id, error = %e, "Firmware rejected bootstrapping request");
            self.release_bootstrap(bootstrapping_id, claim);
            return Err(NanError::rejected(Command::BootstrappingRequest, e));
        }

        info!(tid = req.transaction_id, bootstrapping_id, peer = %req.peer, "Bootstrapping requested");
        Ok(bootstrapping_id)
    }

    /// Answer an inbound bootstrapping indication.
    pub fn bootstrapping_response(&self, req: &BootstrapResponse) -> Result<u16, NanError> {
        let id = req.bootstrapping_instance_id;
        let (instance, claim) = {
            let st = self.state.lock();
            st.ensure_enabled()?;
            let instance = st
                .bootstrap
                .get(id)
                .filter(|b| b.inbound)
                .copied()
                .ok_or(NanError::invalid(IdKind::Bootstrapping, id))?;
            let claim = Claim {
                generation: st.generation,
                serial: instance.serial,
            };
            (instance, claim)
        };

        let result = self.firmware.bootstrapping_response(req, &instance);
        if result.is_err() || !req.accept {
            self.release_bootstrap(id, claim);
        }
        if let Err(e) = result {
            warn!(tid = req.transaction_id, bootstrapping_id = id, error = %e, "Firmware rejected bootstrapping response");
            return Err(NanError::rejected(Command::BootstrappingResponse, e));
        }

        info!(tid = req.transaction_id, bootstrapping_id = id, accept = req.accept, "Bootstrapping response sent");
        Ok(id)
    }

    fn release_bootstrap(&self, id: u16, claim: Claim) {
        let mut st = self.state.lock();
        if st.generation == claim.generation {
            st.bootstrap.release_if(id, |b| b.serial == claim.serial);
        }
    }

    /// A peer asked to bootstrap. Returns the bootstrapping id allocated.
    pub fn on_bootstrapping_requested(
        &self,
        peer: MacAddr,
        match_id: u16,
        session_id: u16,
    ) -> Option<u16> {
        let mut st = self.state.lock();
        if st.ensure_allocatable().is_err() {
            warn!(peer = %peer, "Bootstrapping indication while not accepting allocations");
            return None;
        }

        st.discovery.record_match(session_id, peer, match_id);
        let claim = st.claim();
        match st.bootstrap.allocate(BootstrapInstance {
            peer,
            match_id,
            session_id,
            inbound: true,
            serial: claim.serial,
        }) {
            Ok(id) => {
                info!(bootstrapping_id = id, peer = %peer, session_id, "Bootstrapping requested by peer");
                Some(id)
            }
            Err(_) => {
                info!(peer = %peer, "Bootstrapping ids exhausted, ignoring indication");
                None
            }
        }
    }

    /// Bootstrapping finished either way; the id is released.
    pub fn on_bootstrapping_confirmed(&self, bootstrapping_id: u16, accepted: bool) -> bool {
        let released = self.state.lock().bootstrap.release(bootstrapping_id);
        match released {
            Some(b) => {
                info!(bootstrapping_id, peer = %b.peer, accepted, "Bootstrapping confirmed");
                true
            }
            None => {
                debug!(bootstrapping_id, "Bootstrapping confirm for free id");
                false
            }
        }
    }
}
