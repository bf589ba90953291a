//! Firmware boundary.
//!
//! [`Firmware`] is the outbound command interface. The manager never holds
//! its own lock while calling it. Inbound notifications are delivered
//! either by calling the `on_*` methods of the manager directly or by
//! sending [`FirmwareEvent`]s into the channel drained by
//! [`run_event_loop`](crate::run_event_loop).

use crate::ndl::NdlVifId;
use crate::pairing::{BootstrapInstance, PairingInstance};
use crate::request::{
    BootstrapRequest, BootstrapResponse, EnableRequest, FollowupRequest, NdpInitiateRequest,
    NdpRespondRequest, PairingRequest, PairingResponse, PublishRequest, SubscribeRequest,
};
use crate::MacAddr;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Outbound Commands
// ============================================================================

/// Reasons firmware refuses a command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FirmwareError {
    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("invalid parameters")]
    InvalidParameters,

    #[error("no over-the-air acknowledgement")]
    NoOtaAck,

    #[error("firmware did not answer")]
    Timeout,
}

/// Outbound firmware command interface.
///
/// All methods take `&self` and may be called from any thread. A returned
/// error means the command did not take effect.
pub trait Firmware: Send + Sync {
    /// Start NAN with management address `nmi`.
    fn enable(&self, req: &EnableRequest, nmi: MacAddr) -> Result<(), FirmwareError>;

    /// Stop NAN. Best effort, never fails.
    fn disable(&self, transaction_id: u16);

    fn publish(&self, req: &PublishRequest, publish_id: u16) -> Result<(), FirmwareError>;

    fn publish_cancel(&self, transaction_id: u16, publish_id: u16) -> Result<(), FirmwareError>;

    fn subscribe(&self, req: &SubscribeRequest, subscribe_id: u16) -> Result<(), FirmwareError>;

    fn subscribe_cancel(&self, transaction_id: u16, subscribe_id: u16)
        -> Result<(), FirmwareError>;

    fn transmit_followup(&self, req: &FollowupRequest) -> Result<(), FirmwareError>;

    /// Request a data path as initiator on link `vif`.
    fn ndp_request(
        &self,
        req: &NdpInitiateRequest,
        ndp_id: u16,
        vif: NdlVifId,
    ) -> Result<(), FirmwareError>;

    /// Answer a peer request identified by firmware reference `local_ref`.
    ///
    /// `vif` is `None` for an automatic reject issued before any link was
    /// assigned.
    fn ndp_response(
        &self,
        req: &NdpRespondRequest,
        local_ref: u16,
        vif: Option<NdlVifId>,
    ) -> Result<(), FirmwareError>;

    fn ndp_terminate(&self, transaction_id: u16, ndp_id: u16) -> Result<(), FirmwareError>;

    fn pairing_request(
        &self,
        req: &PairingRequest,
        pairing_id: u16,
        session_id: u16,
    ) -> Result<(), FirmwareError>;

    /// Answer a pairing indication; addressing comes from `instance`.
    fn pairing_response(
        &self,
        req: &PairingResponse,
        instance: &PairingInstance,
    ) -> Result<(), FirmwareError>;

    fn pairing_end(
        &self,
        transaction_id: u16,
        pairing_id: u16,
        peer: MacAddr,
    ) -> Result<(), FirmwareError>;

    fn bootstrapping_request(
        &self,
        req: &BootstrapRequest,
        bootstrapping_id: u16,
    ) -> Result<(), FirmwareError>;

    fn bootstrapping_response(
        &self,
        req: &BootstrapResponse,
        instance: &BootstrapInstance,
    ) -> Result<(), FirmwareError>;
}

/// Firmware that accepts every command and does nothing.
///
/// Used by the daemon when no radio backend is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFirmware;

impl Firmware for NullFirmware {
    fn enable(&self, req: &EnableRequest, nmi: MacAddr) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, nmi = %nmi, "null firmware: enable");
        Ok(())
    }

    fn disable(&self, transaction_id: u16) {
        debug!(tid = transaction_id, "null firmware: disable");
    }

    fn publish(&self, req: &PublishRequest, publish_id: u16) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, publish_id, service = %req.service_name, "null firmware: publish");
        Ok(())
    }

    fn publish_cancel(&self, transaction_id: u16, publish_id: u16) -> Result<(), FirmwareError> {
        debug!(tid = transaction_id, publish_id, "null firmware: publish cancel");
        Ok(())
    }

    fn subscribe(&self, req: &SubscribeRequest, subscribe_id: u16) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, subscribe_id, service = %req.service_name, "null firmware: subscribe");
        Ok(())
    }

    fn subscribe_cancel(
        &self,
        transaction_id: u16,
        subscribe_id: u16,
    ) -> Result<(), FirmwareError> {
        debug!(tid = transaction_id, subscribe_id, "null firmware: subscribe cancel");
        Ok(())
    }

    fn transmit_followup(&self, req: &FollowupRequest) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, match_id = req.match_id, len = req.payload.len(), "null firmware: followup");
        Ok(())
    }

    fn ndp_request(
        &self,
        req: &NdpInitiateRequest,
        ndp_id: u16,
        vif: NdlVifId,
    ) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, ndp_id, vif = %vif, peer = %req.peer_nmi, "null firmware: ndp request");
        Ok(())
    }

    fn ndp_response(
        &self,
        req: &NdpRespondRequest,
        local_ref: u16,
        vif: Option<NdlVifId>,
    ) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, local_ref, vif = ?vif, accept = req.accept, "null firmware: ndp response");
        Ok(())
    }

    fn ndp_terminate(&self, transaction_id: u16, ndp_id: u16) -> Result<(), FirmwareError> {
        debug!(tid = transaction_id, ndp_id, "null firmware: ndp terminate");
        Ok(())
    }

    fn pairing_request(
        &self,
        req: &PairingRequest,
        pairing_id: u16,
        session_id: u16,
    ) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, pairing_id, session_id, peer = %req.peer, "null firmware: pairing request");
        Ok(())
    }

    fn pairing_response(
        &self,
        req: &PairingResponse,
        instance: &PairingInstance,
    ) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, pairing_id = req.pairing_instance_id, peer = %instance.peer, "null firmware: pairing response");
        Ok(())
    }

    fn pairing_end(
        &self,
        transaction_id: u16,
        pairing_id: u16,
        peer: MacAddr,
    ) -> Result<(), FirmwareError> {
        debug!(tid = transaction_id, pairing_id, peer = %peer, "null firmware: pairing end");
        Ok(())
    }

    fn bootstrapping_request(
        &self,
        req: &BootstrapRequest,
        bootstrapping_id: u16,
    ) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, bootstrapping_id, peer = %req.peer, "null firmware: bootstrapping request");
        Ok(())
    }

    fn bootstrapping_response(
        &self,
        req: &BootstrapResponse,
        instance: &BootstrapInstance,
    ) -> Result<(), FirmwareError> {
        debug!(tid = req.transaction_id, peer = %instance.peer, accept = req.accept, "null firmware: bootstrapping response");
        Ok(())
    }
}

// ============================================================================
// Inbound Events
// ============================================================================

/// Asynchronous notification from firmware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FirmwareEvent {
    PublishTerminated { publish_id: u16, reason: u16 },
    SubscribeTerminated { subscribe_id: u16, reason: u16 },
    ServiceMatch { session_id: u16, match_id: u16, peer: MacAddr },
    MatchExpired { session_id: u16, match_id: u16 },
    FollowupTransmitted { match_id: u16, success: bool },
    NdpRequested {
        session_id: u16,
        match_id: u16,
        peer_nmi: MacAddr,
        local_ref: u16,
    },
    NdpSetupResult {
        ndp_id: u16,
        peer_ndi: MacAddr,
        accepted: bool,
        reason: u16,
    },
    NdpTerminated { ndp_id: u16, reason: u16 },
    DataInterfaceDown { local_ndi: MacAddr },
    PairingRequested { peer: MacAddr, match_id: u16, session_id: u16 },
    PairingConfirmed { peer: MacAddr, accepted: bool },
    BootstrappingRequested { peer: MacAddr, match_id: u16, session_id: u16 },
    BootstrappingConfirmed { bootstrapping_id: u16, accepted: bool },
}

/// Channel sender for firmware events.
pub type EventTx = tokio::sync::mpsc::Sender<FirmwareEvent>;

/// Channel receiver for firmware events.
pub type EventRx = tokio::sync::mpsc::Receiver<FirmwareEvent>;

/// Create a bounded firmware event channel.
pub fn event_channel(buffer: usize) -> (EventTx, EventRx) {
    tokio::sync::mpsc::channel(buffer)
}
