//! Caller requests.
//!
//! Plain data handed to [`SessionManager`](crate::SessionManager)
//! operations and passed through to [`Firmware`](crate::Firmware). Each
//! carries an opaque `transaction_id` that is only logged and echoed back
//! to firmware.

use crate::MacAddr;

/// Start NAN on the radio.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnableRequest {
    pub transaction_id: u16,
    /// Management address override; takes precedence over configuration.
    pub nmi: Option<MacAddr>,
    pub master_preference: u8,
    pub cluster_low: u16,
    pub cluster_high: u16,
    pub support_5g: bool,
}

/// Create (id 0) or modify a publish instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishRequest {
    pub transaction_id: u16,
    pub publish_id: u16,
    pub service_name: String,
    pub service_specific_info: Vec<u8>,
    /// Lifetime in seconds, 0 for unlimited.
    pub ttl: u16,
    pub period: u16,
}

/// Create (id 0) or modify a subscribe instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub transaction_id: u16,
    pub subscribe_id: u16,
    pub service_name: String,
    pub service_specific_info: Vec<u8>,
    pub ttl: u16,
    pub period: u16,
    /// Active (transmit subscribe frames) rather than passive.
    pub active: bool,
}

/// Send a follow-up message to a matched peer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FollowupRequest {
    pub transaction_id: u16,
    /// Local publish or subscribe id.
    pub session_id: u16,
    /// Requestor instance id of the match.
    pub match_id: u16,
    pub peer: MacAddr,
    pub payload: Vec<u8>,
}

/// Open a data path to a matched peer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NdpInitiateRequest {
    pub transaction_id: u16,
    /// Local service instance the match belongs to.
    pub session_id: u16,
    /// Requestor instance id of the match.
    pub match_id: u16,
    /// Peer discovery address.
    pub peer_nmi: MacAddr,
    /// Local data interface to carry the path.
    pub local_ndi: MacAddr,
    pub app_info: Vec<u8>,
}

/// Answer a peer-initiated data path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NdpRespondRequest {
    pub transaction_id: u16,
    pub ndp_instance_id: u16,
    pub accept: bool,
    pub local_ndi: MacAddr,
    pub app_info: Vec<u8>,
}

/// Tear down one or more data paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NdpEndRequest {
    pub transaction_id: u16,
    pub ndp_instance_ids: Vec<u16>,
}

/// Kind of pairing exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PairingKind {
    #[default]
    Setup,
    Verification,
}

/// Start pairing with the peer of a match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PairingRequest {
    pub transaction_id: u16,
    pub peer: MacAddr,
    pub match_id: u16,
    pub kind: PairingKind,
}

/// Answer an inbound pairing indication.
///
/// Only the instance id is taken from the caller; peer, match and session
/// come from the indication that created the instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PairingResponse {
    pub transaction_id: u16,
    pub pairing_instance_id: u16,
    pub accept: bool,
    pub kind: PairingKind,
}

/// Start bootstrapping with the peer of a match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub transaction_id: u16,
    pub session_id: u16,
    pub match_id: u16,
    pub peer: MacAddr,
    /// Requested bootstrapping method bitmap.
    pub method: u16,
}

/// Answer an inbound bootstrapping indication.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootstrapResponse {
    pub transaction_id: u16,
    pub bootstrapping_instance_id: u16,
    pub accept: bool,
}
