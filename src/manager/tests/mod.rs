use super::*;
use crate::firmware::FirmwareError;
use crate::ndl::NdlVifId;
use crate::pairing::{BootstrapInstance, PairingInstance};
use crate::request::{
    BootstrapRequest, BootstrapResponse, NdpEndRequest, NdpInitiateRequest, NdpRespondRequest,
    PairingRequest, PairingResponse,
};
use std::sync::atomic::{AtomicUsize, Ordering};

mod lifecycle;

/// One command as seen by [`RecordingFirmware`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Sent {
    Enable(MacAddr),
    Disable,
    Publish(u16),
    PublishCancel(u16),
    Subscribe(u16),
    SubscribeCancel(u16),
    Followup { match_id: u16, tid: u16 },
    NdpRequest { ndp_id: u16, vif: NdlVifId },
    NdpResponse { local_ref: u16, accept: bool, vif: Option<NdlVifId> },
    NdpTerminate(u16),
    PairingRequest { pairing_id: u16, session_id: u16 },
    PairingResponse { pairing_id: u16, peer: MacAddr, session_id: u16, match_id: u16, accept: bool },
    PairingEnd { pairing_id: u16, peer: MacAddr },
    BootstrappingRequest(u16),
    BootstrappingResponse { id: u16, peer: MacAddr, accept: bool },
}

type LockCheck = Box<dyn Fn() -> bool + Send + Sync>;

/// Firmware double that logs every command and rejects on demand.
#[derive(Default)]
pub(super) struct RecordingFirmware {
    sent: Mutex<Vec<Sent>>,
    reject: Mutex<Vec<Command>>,
    check: Mutex<Option<LockCheck>>,
    check_failures: AtomicUsize,
}

impl RecordingFirmware {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Reject every later `command` until [`accept`](Self::accept).
    pub(super) fn reject(&self, command: Command) {
        self.reject.lock().push(command);
    }

    pub(super) fn accept(&self, command: Command) {
        self.reject.lock().retain(|c| *c != command);
    }

    pub(super) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub(super) fn last(&self) -> Option<Sent> {
        self.sent.lock().last().cloned()
    }

    pub(super) fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Run `check` on every command; a `false` result counts as a failure.
    pub(super) fn set_check(&self, check: LockCheck) {
        *self.check.lock() = Some(check);
    }

    pub(super) fn check_failures(&self) -> usize {
        self.check_failures.load(Ordering::SeqCst)
    }

    fn record(&self, command: Option<Command>, sent: Sent) -> Result<(), FirmwareError> {
        if let Some(check) = self.check.lock().as_ref() {
            if !check() {
                self.check_failures.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.sent.lock().push(sent);
        match command {
            Some(c) if self.reject.lock().contains(&c) => {
                Err(FirmwareError::Rejected(format!("{} refused", c)))
            }
            _ => Ok(()),
        }
    }
}

impl Firmware for RecordingFirmware {
    fn enable(&self, _req: &EnableRequest, nmi: MacAddr) -> Result<(), FirmwareError> {
        self.record(Some(Command::Enable), Sent::Enable(nmi))
    }

    fn disable(&self, _transaction_id: u16) {
        let _ = self.record(None, Sent::Disable);
    }

    fn publish(&self, _req: &PublishRequest, publish_id: u16) -> Result<(), FirmwareError> {
        self.record(Some(Command::Publish), Sent::Publish(publish_id))
    }

    fn publish_cancel(&self, _tid: u16, publish_id: u16) -> Result<(), FirmwareError> {
        self.record(Some(Command::PublishCancel), Sent::PublishCancel(publish_id))
    }

    fn subscribe(&self, _req: &SubscribeRequest, subscribe_id: u16) -> Result<(), FirmwareError> {
        self.record(Some(Command::Subscribe), Sent::Subscribe(subscribe_id))
    }

    fn subscribe_cancel(&self, _tid: u16, subscribe_id: u16) -> Result<(), FirmwareError> {
        self.record(
            Some(Command::SubscribeCancel),
            Sent::SubscribeCancel(subscribe_id),
        )
    }

    fn transmit_followup(&self, req: &FollowupRequest) -> Result<(), FirmwareError> {
        self.record(
            Some(Command::Followup),
            Sent::Followup {
                match_id: req.match_id,
                tid: req.transaction_id,
            },
        )
    }

    fn ndp_request(
        &self,
        _req: &NdpInitiateRequest,
        ndp_id: u16,
        vif: NdlVifId,
    ) -> Result<(), FirmwareError> {
        self.record(Some(Command::NdpRequest), Sent::NdpRequest { ndp_id, vif })
    }

    fn ndp_response(
        &self,
        req: &NdpRespondRequest,
        local_ref: u16,
        vif: Option<NdlVifId>,
    ) -> Result<(), FirmwareError> {
        self.record(
            Some(Command::NdpResponse),
            Sent::NdpResponse {
                local_ref,
                accept: req.accept,
                vif,
            },
        )
    }

    fn ndp_terminate(&self, _tid: u16, ndp_id: u16) -> Result<(), FirmwareError> {
        self.record(Some(Command::NdpTerminate), Sent::NdpTerminate(ndp_id))
    }

    fn pairing_request(
        &self,
        _req: &PairingRequest,
        pairing_id: u16,
        session_id: u16,
    ) -> Result<(), FirmwareError> {
        self.record(
            Some(Command::PairingRequest),
            Sent::PairingRequest {
                pairing_id,
                session_id,
            },
        )
    }

    fn pairing_response(
        &self,
        req: &PairingResponse,
        instance: &PairingInstance,
    ) -> Result<(), FirmwareError> {
        self.record(
            Some(Command::PairingResponse),
            Sent::PairingResponse {
                pairing_id: req.pairing_instance_id,
                peer: instance.peer,
                session_id: instance.session_id,
                match_id: instance.match_id,
                accept: req.accept,
            },
        )
    }

    fn pairing_end(&self, _tid: u16, pairing_id: u16, peer: MacAddr) -> Result<(), FirmwareError> {
        self.record(
            Some(Command::PairingEnd),
            Sent::PairingEnd { pairing_id, peer },
        )
    }

    fn bootstrapping_request(
        &self,
        _req: &BootstrapRequest,
        bootstrapping_id: u16,
    ) -> Result<(), FirmwareError> {
        self.record(
            Some(Command::BootstrappingRequest),
            Sent::BootstrappingRequest(bootstrapping_id),
        )
    }

    fn bootstrapping_response(
        &self,
        req: &BootstrapResponse,
        instance: &BootstrapInstance,
    ) -> Result<(), FirmwareError> {
        self.record(
            Some(Command::BootstrappingResponse),
            Sent::BootstrappingResponse {
                id: req.bootstrapping_instance_id,
                peer: instance.peer,
                accept: req.accept,
            },
        )
    }
}

pub(super) type TestManager = SessionManager<RecordingFirmware>;

pub(super) fn make_manager() -> TestManager {
    SessionManager::with_defaults(RecordingFirmware::new())
}

pub(super) fn make_manager_with(config: Config) -> TestManager {
    SessionManager::new(config, RecordingFirmware::new()).unwrap()
}

/// Manager with small pools, already enabled.
pub(super) fn make_small_manager(max_ndp: u16, max_slots: u16) -> TestManager {
    let mut config = Config::new();
    config.limits.max_ndp_instances = Some(max_ndp);
    config.limits.max_ndl_slots = Some(max_slots);
    let manager = make_manager_with(config);
    enable(&manager);
    manager
}

pub(super) fn make_enabled_manager() -> TestManager {
    let manager = make_manager();
    enable(&manager);
    manager
}

pub(super) fn enable(manager: &TestManager) -> MacAddr {
    let req = EnableRequest {
        transaction_id: 1,
        nmi: Some(addr(0xaa)),
        ..Default::default()
    };
    manager.enable(&req).unwrap()
}

/// Locally administered unicast address ending in `val`.
pub(super) fn addr(val: u8) -> MacAddr {
    MacAddr::new([0x02, 0, 0, 0, 0, val])
}

pub(super) fn publish(manager: &TestManager) -> u16 {
    manager
        .publish(&PublishRequest {
            transaction_id: 2,
            service_name: "svc".into(),
            ..Default::default()
        })
        .unwrap()
}

pub(super) fn subscribe(manager: &TestManager) -> u16 {
    manager
        .subscribe(&SubscribeRequest {
            transaction_id: 3,
            service_name: "svc".into(),
            ..Default::default()
        })
        .unwrap()
}

pub(super) fn initiate(manager: &TestManager, peer: MacAddr, ndi: MacAddr) -> Result<u16, NanError> {
    manager.ndp_initiate(&NdpInitiateRequest {
        transaction_id: 10,
        session_id: 1,
        match_id: 1,
        peer_nmi: peer,
        local_ndi: ndi,
        app_info: Vec::new(),
    })
}

/// Initiate and confirm an NDP, returning its id.
pub(super) fn establish(manager: &TestManager, peer: MacAddr, ndi: MacAddr, peer_ndi: MacAddr) -> u16 {
    let ndp_id = initiate(manager, peer, ndi).unwrap();
    manager.on_ndp_setup_result(ndp_id, peer_ndi, true, 0);
    ndp_id
}

/// The manager holds no identifiers and every pool agrees with its table.
pub(super) fn assert_idle(manager: &TestManager) {
    let snap = manager.snapshot();
    assert!(snap.is_idle(), "not idle: {}", snap);
    assert!(manager.audit());
    for (ndi, peers) in &snap.interfaces {
        assert!(peers.is_empty(), "interface {} still has peers", ndi);
    }
}
