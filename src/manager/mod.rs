//! NAN Session Manager
//!
//! Top-level context for one NAN-capable radio. The manager owns every
//! identifier space (services, NDPs, NDL slots, pairing, bootstrapping),
//! the follow-up tracker, the discovery records and the data interface
//! table, and forwards commands to the [`Firmware`] it was built with.
//!
//! ## Design
//!
//! - One manager-wide lock guards all bookkeeping. It is never held while
//!   calling firmware.
//! - Per-interface peer lists have their own lock, taken only while the
//!   manager-wide lock is held.
//! - Every operation mutates under the lock, unlocks, forwards, and on a
//!   firmware rejection re-locks to roll back. Rollbacks are matched by
//!   enable generation and claim serial so they never undo state that was
//!   released and re-allocated in between.
//! - Detected pool corruption puts the manager in degraded mode: teardown
//!   keeps working, new allocations are refused until `disable`.

mod events;
mod ndp;
mod pairing;
mod snapshot;
#[cfg(test)]
mod tests;

pub use events::run_event_loop;
pub use snapshot::{ManagerSnapshot, NdlSnapshot, NdpSnapshot};

use crate::config::Config;
use crate::datapath::DataInterfaceTable;
use crate::discovery::{DiscoveryRegistry, SessionRole};
use crate::error::{Command, IdKind, NanError, Resource};
use crate::firmware::Firmware;
use crate::followup::{FollowupError, FollowupTracker};
use crate::ndl::NdlTable;
use crate::ndp::{NdpEntry, NdpRegistry};
use crate::pairing::{BootstrapRegistry, PairingRegistry};
use crate::request::{EnableRequest, FollowupRequest, PublishRequest, SubscribeRequest};
use crate::utils::index::IdentifierPool;
use crate::MacAddr;
use parking_lot::Mutex;
use std::fmt;
use tracing::{debug, error, info, warn};

/// NAN operational state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NanState {
    /// Not started, or stopped.
    #[default]
    Disabled,
    /// Enable forwarded, waiting for firmware.
    Enabling,
    /// Fully operational.
    Enabled,
}

impl NanState {
    /// Check if requests can be served.
    pub fn is_operational(&self) -> bool {
        matches!(self, NanState::Enabled)
    }
}

impl fmt::Display for NanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NanState::Disabled => "disabled",
            NanState::Enabling => "enabling",
            NanState::Enabled => "enabled",
        };
        write!(f, "{}", s)
    }
}

/// Identifies one allocation so a later rollback can tell whether the
/// state it is about to undo is still the state it created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Claim {
    generation: u64,
    serial: u64,
}

/// Everything behind the manager-wide lock.
#[derive(Debug)]
struct State {
    nan: NanState,
    nmi: MacAddr,
    /// Bumped on every enable and disable.
    generation: u64,
    next_serial: u64,
    degraded: bool,

    services: IdentifierPool,
    discovery: DiscoveryRegistry,
    followups: FollowupTracker,
    ndl: NdlTable,
    ndp: NdpRegistry,
    pairing: PairingRegistry,
    bootstrap: BootstrapRegistry,
    interfaces: DataInterfaceTable,
}

impl State {
    fn new(config: &Config) -> Self {
        let limits = &config.limits;
        Self {
            nan: NanState::Disabled,
            nmi: MacAddr::ZERO,
            generation: 0,
            next_serial: 1,
            degraded: false,
            services: IdentifierPool::new(limits.max_services()),
            discovery: DiscoveryRegistry::new(),
            followups: FollowupTracker::new(limits.max_followups()),
            ndl: NdlTable::new(
                limits.max_ndl_slots() as usize,
                config.interface.ndl_vif_base(),
            ),
            ndp: NdpRegistry::new(limits.max_ndp_instances()),
            pairing: PairingRegistry::new(limits.max_pairing_instances()),
            bootstrap: BootstrapRegistry::new(limits.max_bootstrapping_instances()),
            interfaces: DataInterfaceTable::new(),
        }
    }

    fn ensure_enabled(&self) -> Result<(), NanError> {
        if self.nan.is_operational() {
            Ok(())
        } else {
            debug!(state = %self.nan, "Request while nan not enabled");
            Err(NanError::NotReady)
        }
    }

    /// Enabled and allowed to allocate.
    fn ensure_allocatable(&self) -> Result<(), NanError> {
        self.ensure_enabled()?;
        if self.degraded {
            return Err(NanError::Degraded);
        }
        Ok(())
    }

    fn claim(&mut self) -> Claim {
        let serial = self.next_serial;
        self.next_serial += 1;
        Claim {
            generation: self.generation,
            serial,
        }
    }

    fn enter_degraded(&mut self, detail: &str) {
        if !self.degraded {
            error!(detail, "Bookkeeping corruption detected, refusing new allocations");
        }
        self.degraded = true;
    }

    /// Role of an active local service id.
    fn service_role(&self, id: u16) -> Option<SessionRole> {
        if !self.services.is_active(id) {
            return None;
        }
        self.discovery.role(id)
    }

    /// Release an NDP entry, its slot reference and its peer record.
    fn teardown_ndp(&mut self, ndp_id: u16) -> Option<NdpEntry> {
        let entry = self.ndp.entry(ndp_id).filter(|e| e.is_live())?.clone();

        if entry.active {
            let removed = self
                .interfaces
                .get(entry.local_ndi)
                .and_then(|iface| iface.remove_peer_ref(entry.peer_ndi));
            if removed.is_none() {
                warn!(
                    ndp_id,
                    ndi = %entry.local_ndi,
                    peer = %entry.peer_ndi,
                    "No peer record for active ndp"
                );
            }
        }
        self.ndp.del_entry(&mut self.ndl, ndp_id)
    }

    /// Tear down an NDP only if it still belongs to `claim`.
    fn teardown_claimed_ndp(&mut self, ndp_id: u16, claim: Claim) -> Option<NdpEntry> {
        if self.generation != claim.generation {
            return None;
        }
        match self.ndp.entry(ndp_id) {
            Some(e) if e.is_live() && e.serial == claim.serial => self.teardown_ndp(ndp_id),
            _ => None,
        }
    }

    /// Cross-check pools against their entry tables.
    fn audit(&mut self) -> bool {
        let mut problem: Option<String> = None;

        if let Err(e) = self.ndp.check_consistency() {
            problem = Some(e.to_string());
        } else if let Some(id) = self.pairing.find_divergence() {
            problem = Some(format!("pairing id {} diverges from its entry", id));
        } else if let Some(id) = self.bootstrap.find_divergence() {
            problem = Some(format!("bootstrapping id {} diverges from its entry", id));
        } else {
            for (slot, s) in self.ndl.iter() {
                let live = self.ndp.count_on_slot(slot);
                if s.ndp_count as usize != live {
                    problem = Some(format!(
                        "ndl slot {} count {} but {} live ndp(s)",
                        slot, s.ndp_count, live
                    ));
                    break;
                }
            }
        }

        match problem {
            Some(detail) => {
                self.enter_degraded(&detail);
                false
            }
            None => true,
        }
    }

    /// Drop everything and return to Disabled.
    fn reset(&mut self) {
        for ndp_id in self.ndp.in_use_ids() {
            self.teardown_ndp(ndp_id);
        }
        let stray = self.interfaces.clear_all_peers();
        if stray > 0 {
            warn!(count = stray, "Peer records left after ndp teardown");
        }
        if self.ndl.active_count() > 0 {
            warn!(count = self.ndl.active_count(), "Ndl slots left after ndp teardown");
        }

        self.ndl.clear();
        self.ndp.clear();
        self.discovery.clear();
        self.followups.clear();
        self.pairing.clear();
        self.bootstrap.clear();
        self.services.clear();

        self.nan = NanState::Disabled;
        self.nmi = MacAddr::ZERO;
        self.degraded = false;
        self.generation += 1;
    }
}

/// Session and data-path instance manager for one NAN radio.
pub struct SessionManager<F: Firmware> {
    config: Config,
    firmware: F,
    state: Mutex<State>,
}

impl<F: Firmware> SessionManager<F> {
    /// Create a manager from configuration.
    pub fn new(config: Config, firmware: F) -> Result<Self, NanError> {
        config.validate()?;
        let state = State::new(&config);
        Ok(Self {
            config,
            firmware,
            state: Mutex::new(state),
        })
    }

    /// Create a manager with default configuration.
    pub fn with_defaults(firmware: F) -> Self {
        let config = Config::default();
        let state = State::new(&config);
        Self {
            config,
            firmware,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn firmware(&self) -> &F {
        &self.firmware
    }

    pub fn state(&self) -> NanState {
        self.state.lock().nan
    }

    /// Current management address; zero when disabled.
    pub fn nmi(&self) -> MacAddr {
        self.state.lock().nmi
    }

    pub fn is_degraded(&self) -> bool {
        self.state.lock().degraded
    }

    /// Cross-check all pools, entering degraded mode on divergence.
    ///
    /// Returns `true` when everything is consistent.
    pub fn audit(&self) -> bool {
        self.state.lock().audit()
    }

    // === Lifecycle ===

    /// Start NAN, returning the management address in use.
    pub fn enable(&self, req: &EnableRequest) -> Result<MacAddr, NanError> {
        if let Some(nmi) = req.nmi {
            if nmi.is_zero() || nmi.is_multicast() {
                return Err(NanError::InvalidParameter("nmi must be a unicast address"));
            }
        }

        let (nmi, generation) = {
            let mut st = self.state.lock();
            if st.nan != NanState::Disabled {
                return Err(NanError::AlreadyEnabled);
            }
            let nmi = self.select_nmi(req);
            st.nan = NanState::Enabling;
            st.nmi = nmi;
            st.generation += 1;
            (nmi, st.generation)
        };

        if let Err(e) = self.firmware.enable(req, nmi) {
            warn!(tid = req.transaction_id, error = %e, "Firmware rejected enable");
            let mut st = self.state.lock();
            if st.generation == generation && st.nan == NanState::Enabling {
                st.nan = NanState::Disabled;
                st.nmi = MacAddr::ZERO;
            }
            return Err(NanError::rejected(Command::Enable, e));
        }

        let mut st = self.state.lock();
        if st.generation != generation || st.nan != NanState::Enabling {
            debug!(tid = req.transaction_id, "Disabled while enable was in flight");
            return Err(NanError::NotReady);
        }
        st.nan = NanState::Enabled;
        info!(tid = req.transaction_id, nmi = %nmi, "NAN enabled");
        Ok(nmi)
    }

    fn select_nmi(&self, req: &EnableRequest) -> MacAddr {
        if self.config.interface.randomize_nmi() {
            return MacAddr::random_local();
        }
        req.nmi
            .or(self.config.interface.nmi)
            .unwrap_or_else(MacAddr::random_local)
    }

    /// Stop NAN and release every identifier.
    ///
    /// Never fails. A no-op (and no firmware command) when already disabled.
    pub fn disable(&self, transaction_id: u16) {
        {
            let mut st = self.state.lock();
            if st.nan == NanState::Disabled {
                debug!(tid = transaction_id, "Disable while already disabled");
                return;
            }
            let ndps = st.ndp.count();
            st.reset();
            info!(tid = transaction_id, ndps, "NAN disabled");
        }
        self.firmware.disable(transaction_id);
    }

    // === Publish / Subscribe ===

    /// Create (`publish_id == 0`) or modify a publish instance.
    pub fn publish(&self, req: &PublishRequest) -> Result<u16, NanError> {
        let (id, claim, fresh) =
            self.open_service(req.publish_id, SessionRole::Publish, IdKind::Publish)?;

        if let Err(e) = self.firmware.publish(req, id) {
            warn!(tid = req.transaction_id, publish_id = id, error = %e, "Firmware rejected publish");
            if fresh {
                self.rollback_service(id, claim);
            }
            return Err(NanError::rejected(Command::Publish, e));
        }

        info!(tid = req.transaction_id, publish_id = id, modify = !fresh, "Publish started");
        Ok(id)
    }

    /// Create (`subscribe_id == 0`) or modify a subscribe instance.
    pub fn subscribe(&self, req: &SubscribeRequest) -> Result<u16, NanError> {
        let (id, claim, fresh) =
            self.open_service(req.subscribe_id, SessionRole::Subscribe, IdKind::Subscribe)?;

        if let Err(e) = self.firmware.subscribe(req, id) {
            warn!(tid = req.transaction_id, subscribe_id = id, error = %e, "Firmware rejected subscribe");
            if fresh {
                self.rollback_service(id, claim);
            }
            return Err(NanError::rejected(Command::Subscribe, e));
        }

        info!(tid = req.transaction_id, subscribe_id = id, modify = !fresh, "Subscribe started");
        Ok(id)
    }

    fn open_service(
        &self,
        requested: u16,
        role: SessionRole,
        kind: IdKind,
    ) -> Result<(u16, Claim, bool), NanError> {
        let mut st = self.state.lock();
        st.ensure_enabled()?;

        if requested != 0 {
            if st.service_role(requested) != Some(role) {
                return Err(NanError::invalid(kind, requested));
            }
            let claim = st.claim();
            st.discovery.open_session(requested, role, claim.serial);
            return Ok((requested, claim, false));
        }

        st.ensure_allocatable()?;
        let id = st.services.allocate_first().map_err(|_| {
            info!(role = %role, "Service ids exhausted");
            NanError::exhausted(Resource::ServiceId)
        })?;
        let claim = st.claim();
        st.discovery.open_session(id, role, claim.serial);
        Ok((id, claim, true))
    }

    fn rollback_service(&self, id: u16, claim: Claim) {
        let mut st = self.state.lock();
        if st.generation == claim.generation && st.discovery.close_if_serial(id, claim.serial) {
            if let Err(e) = st.services.free(id) {
                warn!(id, error = %e, "Service id rollback mismatch");
            }
        }
    }

    /// Stop a publish instance.
    pub fn publish_cancel(&self, transaction_id: u16, publish_id: u16) -> Result<(), NanError> {
        self.close_service(publish_id, SessionRole::Publish, IdKind::Publish)?;
        if let Err(e) = self.firmware.publish_cancel(transaction_id, publish_id) {
            warn!(tid = transaction_id, publish_id, error = %e, "Firmware rejected publish cancel");
        }
        info!(tid = transaction_id, publish_id, "Publish cancelled");
        Ok(())
    }

    /// Stop a subscribe instance.
    pub fn subscribe_cancel(&self, transaction_id: u16, subscribe_id: u16) -> Result<(), NanError> {
        self.close_service(subscribe_id, SessionRole::Subscribe, IdKind::Subscribe)?;
        if let Err(e) = self.firmware.subscribe_cancel(transaction_id, subscribe_id) {
            warn!(tid = transaction_id, subscribe_id, error = %e, "Firmware rejected subscribe cancel");
        }
        info!(tid = transaction_id, subscribe_id, "Subscribe cancelled");
        Ok(())
    }

    fn close_service(&self, id: u16, role: SessionRole, kind: IdKind) -> Result<(), NanError> {
        let mut st = self.state.lock();
        st.ensure_enabled()?;
        if st.service_role(id) != Some(role) {
            return Err(NanError::invalid(kind, id));
        }
        st.discovery.close_session(id);
        if let Err(e) = st.services.free(id) {
            warn!(id, error = %e, "Service id release mismatch");
        }
        Ok(())
    }

    /// Firmware ended a publish instance on its own.
    pub fn on_publish_terminated(&self, publish_id: u16, reason: u16) -> bool {
        self.service_terminated(publish_id, SessionRole::Publish, reason)
    }

    /// Firmware ended a subscribe instance on its own.
    pub fn on_subscribe_terminated(&self, subscribe_id: u16, reason: u16) -> bool {
        self.service_terminated(subscribe_id, SessionRole::Subscribe, reason)
    }

    fn service_terminated(&self, id: u16, role: SessionRole, reason: u16) -> bool {
        let mut st = self.state.lock();
        if st.service_role(id) != Some(role) {
            debug!(id, role = %role, "Termination for inactive service");
            return false;
        }
        st.discovery.close_session(id);
        if let Err(e) = st.services.free(id) {
            warn!(id, error = %e, "Service id release mismatch");
        }
        info!(id, role = %role, reason, "Service terminated by firmware");
        true
    }

    /// A peer matched a local service.
    pub fn on_service_match(&self, session_id: u16, match_id: u16, peer: MacAddr) {
        let mut st = self.state.lock();
        if !st.nan.is_operational() {
            debug!(session_id, match_id, "Match while nan not enabled");
            return;
        }
        if !st.discovery.record_match(session_id, peer, match_id) {
            debug!(session_id, match_id, "Match for inactive service");
            return;
        }
        debug!(session_id, match_id, peer = %peer, "Service match");
    }

    /// A previously reported match is gone.
    pub fn on_match_expired(&self, session_id: u16, match_id: u16) -> bool {
        let cleared = self.state.lock().discovery.clear_match(session_id, match_id);
        debug!(session_id, match_id, cleared, "Match expired");
        cleared
    }

    // === Follow-up ===

    /// Send a follow-up; at most one may be outstanding per match.
    pub fn transmit_followup(&self, req: &FollowupRequest) -> Result<(), NanError> {
        let generation = {
            let mut st = self.state.lock();
            st.ensure_enabled()?;
            if st.service_role(req.session_id).is_none() {
                return Err(NanError::invalid(IdKind::Service, req.session_id));
            }
            if req.match_id == 0 {
                return Err(NanError::invalid(IdKind::Match, 0));
            }
            match st.followups.push(req.match_id, req.transaction_id) {
                Ok(_) => {}
                Err(FollowupError::Pending { transaction_id, .. }) => {
                    info!(
                        tid = req.transaction_id,
                        match_id = req.match_id,
                        pending = transaction_id,
                        "Follow-up already outstanding"
                    );
                    return Err(NanError::FollowupQueueFull {
                        match_id: req.match_id,
                    });
                }
                Err(FollowupError::Full { max }) => {
                    info!(tid = req.transaction_id, match_id = req.match_id, max, "Follow-up table full");
                    return Err(NanError::FollowupQueueFull {
                        match_id: req.match_id,
                    });
                }
            }
            st.generation
        };

        if let Err(e) = self.firmware.transmit_followup(req) {
            warn!(tid = req.transaction_id, match_id = req.match_id, error = %e, "Firmware rejected follow-up");
            let mut st = self.state.lock();
            if st.generation == generation {
                st.followups.remove_if(req.match_id, req.transaction_id);
            }
            return Err(NanError::rejected(Command::Followup, e));
        }

        debug!(tid = req.transaction_id, match_id = req.match_id, "Follow-up queued");
        Ok(())
    }

    /// Transmit status for the outstanding follow-up of a match.
    ///
    /// Returns the transaction id it belonged to.
    pub fn on_followup_transmitted(&self, match_id: u16, success: bool) -> Option<u16> {
        let tid = self.state.lock().followups.pop(match_id);
        match tid {
            Some(tid) => debug!(tid, match_id, success, "Follow-up transmitted"),
            None => debug!(match_id, success, "Transmit status with no pending follow-up"),
        }
        tid
    }

    // === Data interfaces ===

    /// Register a local data interface.
    pub fn create_data_interface(&self, local_ndi: MacAddr) -> Result<(), NanError> {
        self.state.lock().interfaces.create(local_ndi)?;
        info!(ndi = %local_ndi, "Data interface created");
        Ok(())
    }

    /// Remove a local data interface that carries no peers.
    pub fn delete_data_interface(&self, local_ndi: MacAddr) -> Result<(), NanError> {
        self.state.lock().interfaces.delete(local_ndi)?;
        info!(ndi = %local_ndi, "Data interface deleted");
        Ok(())
    }
}
