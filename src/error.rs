//! Manager errors and caller-facing status codes.

use crate::config::ConfigError;
use crate::datapath::DatapathError;
use crate::firmware::FirmwareError;
use std::fmt;
use thiserror::Error;

/// Bounded resource a request could not obtain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    ServiceId,
    NdpId,
    NdlSlot,
    PairingId,
    BootstrappingId,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::ServiceId => "service id",
            Resource::NdpId => "ndp id",
            Resource::NdlSlot => "ndl slot",
            Resource::PairingId => "pairing id",
            Resource::BootstrappingId => "bootstrapping id",
        };
        write!(f, "{}", s)
    }
}

/// Identifier space a caller-supplied id belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    Service,
    Publish,
    Subscribe,
    Match,
    Ndp,
    Pairing,
    Bootstrapping,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdKind::Service => "service",
            IdKind::Publish => "publish",
            IdKind::Subscribe => "subscribe",
            IdKind::Match => "match",
            IdKind::Ndp => "ndp",
            IdKind::Pairing => "pairing",
            IdKind::Bootstrapping => "bootstrapping",
        };
        write!(f, "{}", s)
    }
}

/// Firmware command that was forwarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Enable,
    Publish,
    PublishCancel,
    Subscribe,
    SubscribeCancel,
    Followup,
    NdpRequest,
    NdpResponse,
    NdpTerminate,
    PairingRequest,
    PairingResponse,
    PairingEnd,
    BootstrappingRequest,
    BootstrappingResponse,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Command::Enable => "enable",
            Command::Publish => "publish",
            Command::PublishCancel => "publish-cancel",
            Command::Subscribe => "subscribe",
            Command::SubscribeCancel => "subscribe-cancel",
            Command::Followup => "followup",
            Command::NdpRequest => "ndp-request",
            Command::NdpResponse => "ndp-response",
            Command::NdpTerminate => "ndp-terminate",
            Command::PairingRequest => "pairing-request",
            Command::PairingResponse => "pairing-response",
            Command::PairingEnd => "pairing-end",
            Command::BootstrappingRequest => "bootstrapping-request",
            Command::BootstrappingResponse => "bootstrapping-response",
        };
        write!(f, "{}", s)
    }
}

/// Errors returned by [`SessionManager`](crate::SessionManager) operations.
#[derive(Debug, Error)]
pub enum NanError {
    #[error("nan is not enabled")]
    NotReady,

    #[error("nan is already enabled")]
    AlreadyEnabled,

    #[error("no {resource} available")]
    Exhausted { resource: Resource },

    #[error("follow-up already outstanding for match {match_id}")]
    FollowupQueueFull { match_id: u16 },

    #[error("invalid {kind} id {id}")]
    InvalidIdentifier { kind: IdKind, id: u16 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("firmware rejected {command}: {source}")]
    ForwardRejected {
        command: Command,
        #[source]
        source: FirmwareError,
    },

    #[error("manager degraded, new allocations refused until disable")]
    Degraded,

    #[error("data interface: {0}")]
    Datapath(#[from] DatapathError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl NanError {
    pub(crate) fn exhausted(resource: Resource) -> Self {
        NanError::Exhausted { resource }
    }

    pub(crate) fn invalid(kind: IdKind, id: u16) -> Self {
        NanError::InvalidIdentifier { kind, id }
    }

    pub(crate) fn rejected(command: Command, source: FirmwareError) -> Self {
        NanError::ForwardRejected { command, source }
    }

    /// Caller-facing status code.
    pub fn status(&self) -> NanStatus {
        match self {
            NanError::NotReady => NanStatus::UnsupportedConcurrencyNanDisabled,
            NanError::AlreadyEnabled => NanStatus::AlreadyEnabled,
            NanError::Exhausted { .. } => NanStatus::NoResourceAvailable,
            NanError::FollowupQueueFull { .. } => NanStatus::FollowupQueueFull,
            NanError::InvalidIdentifier { kind, .. } => match kind {
                IdKind::Service | IdKind::Publish | IdKind::Subscribe => {
                    NanStatus::InvalidPublishSubscribeId
                }
                IdKind::Match => NanStatus::InvalidRequestorInstanceId,
                IdKind::Ndp => NanStatus::InvalidNdpId,
                IdKind::Pairing => NanStatus::InvalidPairingId,
                IdKind::Bootstrapping => NanStatus::InvalidBootstrappingId,
            },
            NanError::InvalidParameter(_) | NanError::Datapath(_) | NanError::Config(_) => {
                NanStatus::InvalidParam
            }
            NanError::ForwardRejected { source, .. } => match source {
                FirmwareError::InvalidParameters => NanStatus::InvalidParam,
                FirmwareError::NoOtaAck => NanStatus::NoOtaAck,
                FirmwareError::Rejected(_) | FirmwareError::Timeout => NanStatus::ProtocolFailure,
            },
            NanError::Degraded => NanStatus::InternalFailure,
        }
    }

    /// True when the same call may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NanError::Exhausted { .. } | NanError::FollowupQueueFull { .. }
        )
    }
}

/// Status codes reported to the caller, in HAL numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NanStatus {
    Success = 0,
    InternalFailure = 1,
    ProtocolFailure = 2,
    InvalidPublishSubscribeId = 3,
    NoResourceAvailable = 4,
    InvalidParam = 5,
    InvalidRequestorInstanceId = 6,
    InvalidNdpId = 7,
    NanNotAllowed = 8,
    NoOtaAck = 9,
    AlreadyEnabled = 10,
    FollowupQueueFull = 11,
    UnsupportedConcurrencyNanDisabled = 12,
    InvalidPairingId = 13,
    InvalidBootstrappingId = 14,
}

impl NanStatus {
    /// Numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Status for an operation result.
    pub fn of<T>(result: &Result<T, NanError>) -> Self {
        match result {
            Ok(_) => NanStatus::Success,
            Err(e) => e.status(),
        }
    }
}

impl fmt::Display for NanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(NanStatus::Success.code(), 0);
        assert_eq!(NanStatus::NoResourceAvailable.code(), 4);
        assert_eq!(NanStatus::FollowupQueueFull.code(), 11);
        assert_eq!(NanStatus::InvalidBootstrappingId.code(), 14);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            NanError::exhausted(Resource::NdlSlot).status(),
            NanStatus::NoResourceAvailable
        );
        assert_eq!(
            NanError::invalid(IdKind::Ndp, 9).status(),
            NanStatus::InvalidNdpId
        );
        assert_eq!(
            NanError::invalid(IdKind::Subscribe, 9).status(),
            NanStatus::InvalidPublishSubscribeId
        );
        assert_eq!(
            NanError::rejected(Command::Enable, FirmwareError::InvalidParameters).status(),
            NanStatus::InvalidParam
        );
        assert_eq!(NanError::Degraded.status(), NanStatus::InternalFailure);
        assert_eq!(
            NanError::NotReady.status(),
            NanStatus::UnsupportedConcurrencyNanDisabled
        );
    }

    #[test]
    fn test_retryable() {
        assert!(NanError::exhausted(Resource::NdpId).is_retryable());
        assert!(NanError::FollowupQueueFull { match_id: 1 }.is_retryable());
        assert!(!NanError::NotReady.is_retryable());
        assert!(!NanError::Degraded.is_retryable());
    }

    #[test]
    fn test_status_of_result() {
        let ok: Result<u16, NanError> = Ok(1);
        assert_eq!(NanStatus::of(&ok), NanStatus::Success);
        let err: Result<u16, NanError> = Err(NanError::AlreadyEnabled);
        assert_eq!(NanStatus::of(&err), NanStatus::AlreadyEnabled);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            NanError::exhausted(Resource::NdlSlot).to_string(),
            "no ndl slot available"
        );
        assert_eq!(
            NanError::rejected(Command::NdpRequest, FirmwareError::Timeout).to_string(),
            "firmware rejected ndp-request: firmware did not answer"
        );
    }

    #[test]
    fn test_every_resource_is_retryable() {
        let all = [
            Resource::ServiceId,
            Resource::NdpId,
            Resource::NdlSlot,
            Resource::PairingId,
            Resource::BootstrappingId,
        ];
        for resource in all {
            let err = NanError::exhausted(resource);
            assert!(err.is_retryable());
            assert!(err.to_string().starts_with("no "));
        }
        // Follow-up admission has its own status.
        assert!(NanError::FollowupQueueFull { match_id: 1 }.is_retryable());
    }
}
