//! Firmware event dispatch and the watchdog loop.

use super::SessionManager;
use crate::config::WatchdogConfig;
use crate::firmware::{EventRx, Firmware, FirmwareEvent};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

impl<F: Firmware> SessionManager<F> {
    /// Apply one firmware notification.
    pub fn handle_event(&self, event: FirmwareEvent) {
        match event {
            FirmwareEvent::PublishTerminated { publish_id, reason } => {
                self.on_publish_terminated(publish_id, reason);
            }
            FirmwareEvent::SubscribeTerminated {
                subscribe_id,
                reason,
            } => {
                self.on_subscribe_terminated(subscribe_id, reason);
            }
            FirmwareEvent::ServiceMatch {
                session_id,
                match_id,
                peer,
            } => self.on_service_match(session_id, match_id, peer),
            FirmwareEvent::MatchExpired {
                session_id,
                match_id,
            } => {
                self.on_match_expired(session_id, match_id);
            }
            FirmwareEvent::FollowupTransmitted { match_id, success } => {
                self.on_followup_transmitted(match_id, success);
            }
            FirmwareEvent::NdpRequested {
                session_id,
                match_id,
                peer_nmi,
                local_ref,
            } => {
                self.on_ndp_requested(session_id, match_id, peer_nmi, local_ref);
            }
            FirmwareEvent::NdpSetupResult {
                ndp_id,
                peer_ndi,
                accepted,
                reason,
            } => self.on_ndp_setup_result(ndp_id, peer_ndi, accepted, reason),
            FirmwareEvent::NdpTerminated { ndp_id, reason } => {
                self.on_ndp_terminated(ndp_id, reason);
            }
            FirmwareEvent::DataInterfaceDown { local_ndi } => {
                self.on_data_interface_down(local_ndi);
            }
            FirmwareEvent::PairingRequested {
                peer,
                match_id,
                session_id,
            } => {
                self.on_pairing_requested(peer, match_id, session_id);
            }
            FirmwareEvent::PairingConfirmed { peer, accepted } => {
                self.on_pairing_confirmed(peer, accepted);
            }
            FirmwareEvent::BootstrappingRequested {
                peer,
                match_id,
                session_id,
            } => {
                self.on_bootstrapping_requested(peer, match_id, session_id);
            }
            FirmwareEvent::BootstrappingConfirmed {
                bootstrapping_id,
                accepted,
            } => {
                self.on_bootstrapping_confirmed(bootstrapping_id, accepted);
            }
        }
    }

    /// Periodic maintenance: expire stalled NDP setups and audit pools.
    pub fn tick(&self, now: Instant, watchdog: &WatchdogConfig) {
        if let Some(timeout) = watchdog.ndp_setup_timeout() {
            let expired = self.expire_stalled_ndps(now, timeout);
            if !expired.is_empty() {
                debug!(count = expired.len(), "Expired stalled ndp setups");
            }
        }
        if !self.audit() {
            warn!(snapshot = %self.snapshot(), "Manager degraded");
        }
    }
}

/// Drain firmware events into `manager` and run the watchdog tick.
///
/// Runs until every sender of the channel is dropped.
pub async fn run_event_loop<F: Firmware>(
    manager: Arc<SessionManager<F>>,
    mut events: EventRx,
    watchdog: WatchdogConfig,
) {
    let mut tick = tokio::time::interval(watchdog.tick_interval());

    info!(
        tick_secs = watchdog.tick_interval().as_secs(),
        "Event loop started"
    );

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(e) => manager.handle_event(e),
                    None => break, // channel closed
                }
            }
            _ = tick.tick() => {
                manager.tick(Instant::now(), &watchdog);
            }
        }
    }

    info!("Event loop stopped");
}
