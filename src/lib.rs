//! nanmgr: NAN session and data-path instance manager
//!
//! Tracks every identifier a Wi-Fi Aware (NAN) radio hands out on behalf
//! of its callers: publish/subscribe instances, follow-up transmissions,
//! data paths and their links, pairing and bootstrapping sessions. Commands
//! are forwarded to a pluggable firmware backend and rolled back when the
//! firmware refuses them.

pub mod addr;
pub mod config;
pub mod datapath;
pub mod discovery;
pub mod error;
pub mod firmware;
pub mod followup;
pub mod manager;
pub mod ndl;
pub mod ndp;
pub mod pairing;
pub mod request;
pub mod utils;

// Re-export address types
pub use addr::{AddrError, MacAddr};

// Re-export config types
pub use config::{Config, ConfigError, InterfaceConfig, LimitsConfig, WatchdogConfig};

// Re-export error types
pub use error::{Command, IdKind, NanError, NanStatus, Resource};

// Re-export firmware types
pub use firmware::{
    event_channel, EventRx, EventTx, Firmware, FirmwareError, FirmwareEvent, NullFirmware,
};

// Re-export request types
pub use request::{
    BootstrapRequest, BootstrapResponse, EnableRequest, FollowupRequest, NdpEndRequest,
    NdpInitiateRequest, NdpRespondRequest, PairingKind, PairingRequest, PairingResponse,
    PublishRequest, SubscribeRequest,
};

// Re-export bookkeeping types
pub use datapath::{DataInterface, DatapathError, PeerRecord};
pub use discovery::SessionRole;
pub use ndl::NdlVifId;
pub use ndp::{NdpError, NdpState};
pub use pairing::{BootstrapInstance, PairingInstance, PairingRole};
pub use utils::index::{IdentifierPool, IndexError};

// Re-export manager types
pub use manager::{
    run_event_loop, ManagerSnapshot, NanState, NdlSnapshot, NdpSnapshot, SessionManager,
};
