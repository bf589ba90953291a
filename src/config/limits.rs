//! Configuration subsections.
//!
//! Every field is optional in YAML; accessors return the built-in default
//! when a value is not configured, so merging only ever overrides values a
//! file actually sets.

use crate::MacAddr;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default publish/subscribe id space.
const DEFAULT_MAX_SERVICES: u16 = 255;

/// Default NDP id space.
const DEFAULT_MAX_NDP: u16 = 8;

/// Default pairing id space.
const DEFAULT_MAX_PAIRING: u16 = 8;

/// Default bootstrapping id space.
const DEFAULT_MAX_BOOTSTRAPPING: u16 = 8;

/// Default outstanding follow-up table size.
const DEFAULT_MAX_FOLLOWUPS: usize = 20;

/// Default first NDL vif id (management interface + 1).
const DEFAULT_NDL_VIF_BASE: u16 = 2;

/// Default NDP setup timeout in seconds.
const DEFAULT_NDP_SETUP_TIMEOUT_SECS: u64 = 10;

/// Default watchdog tick in seconds.
const DEFAULT_TICK_INTERVAL_SECS: u64 = 1;

/// Default firmware event channel depth.
const DEFAULT_EVENT_BUFFER: usize = 64;

// ============================================================================
// Limits
// ============================================================================

/// Identifier space sizes (`limits.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Shared publish/subscribe id space (`limits.max_services`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_services: Option<u16>,

    /// NDP id space (`limits.max_ndp_instances`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ndp_instances: Option<u16>,

    /// NDL slots (`limits.max_ndl_slots`). Defaults to the NDP id space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ndl_slots: Option<u16>,

    /// Pairing id space (`limits.max_pairing_instances`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pairing_instances: Option<u16>,

    /// Bootstrapping id space (`limits.max_bootstrapping_instances`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bootstrapping_instances: Option<u16>,

    /// Outstanding follow-ups (`limits.max_followups`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_followups: Option<usize>,
}

impl LimitsConfig {
    pub fn max_services(&self) -> u16 {
        self.max_services.unwrap_or(DEFAULT_MAX_SERVICES)
    }

    pub fn max_ndp_instances(&self) -> u16 {
        self.max_ndp_instances.unwrap_or(DEFAULT_MAX_NDP)
    }

    pub fn max_ndl_slots(&self) -> u16 {
        self.max_ndl_slots.unwrap_or_else(|| self.max_ndp_instances())
    }

    pub fn max_pairing_instances(&self) -> u16 {
        self.max_pairing_instances.unwrap_or(DEFAULT_MAX_PAIRING)
    }

    pub fn max_bootstrapping_instances(&self) -> u16 {
        self.max_bootstrapping_instances
            .unwrap_or(DEFAULT_MAX_BOOTSTRAPPING)
    }

    pub fn max_followups(&self) -> usize {
        self.max_followups.unwrap_or(DEFAULT_MAX_FOLLOWUPS)
    }

    pub(super) fn merge(&mut self, other: LimitsConfig) {
        if other.max_services.is_some() {
            self.max_services = other.max_services;
        }
        if other.max_ndp_instances.is_some() {
            self.max_ndp_instances = other.max_ndp_instances;
        }
        if other.max_ndl_slots.is_some() {
            self.max_ndl_slots = other.max_ndl_slots;
        }
        if other.max_pairing_instances.is_some() {
            self.max_pairing_instances = other.max_pairing_instances;
        }
        if other.max_bootstrapping_instances.is_some() {
            self.max_bootstrapping_instances = other.max_bootstrapping_instances;
        }
        if other.max_followups.is_some() {
            self.max_followups = other.max_followups;
        }
    }
}

// ============================================================================
// Interface
// ============================================================================

/// Management interface settings (`interface.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    /// Fixed management address (`interface.nmi`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nmi: Option<MacAddr>,

    /// Use a fresh random management address on every enable
    /// (`interface.randomize_nmi`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub randomize_nmi: Option<bool>,

    /// First firmware vif id used for NDL slots (`interface.ndl_vif_base`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndl_vif_base: Option<u16>,
}

impl InterfaceConfig {
    pub fn randomize_nmi(&self) -> bool {
        self.randomize_nmi.unwrap_or(false)
    }

    pub fn ndl_vif_base(&self) -> u16 {
        self.ndl_vif_base.unwrap_or(DEFAULT_NDL_VIF_BASE)
    }

    pub(super) fn merge(&mut self, other: InterfaceConfig) {
        if other.nmi.is_some() {
            self.nmi = other.nmi;
        }
        if other.randomize_nmi.is_some() {
            self.randomize_nmi = other.randomize_nmi;
        }
        if other.ndl_vif_base.is_some() {
            self.ndl_vif_base = other.ndl_vif_base;
        }
    }
}

// ============================================================================
// Watchdog
// ============================================================================

/// Event loop and NDP setup watchdog (`watchdog.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogConfig {
    /// Seconds an NDP may stay unconfirmed before it is torn down
    /// (`watchdog.ndp_setup_timeout_secs`). 0 disables the check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndp_setup_timeout_secs: Option<u64>,

    /// Tick period of the event loop (`watchdog.tick_interval_secs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval_secs: Option<u64>,

    /// Firmware event channel depth (`watchdog.event_buffer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_buffer: Option<usize>,
}

impl WatchdogConfig {
    /// Setup timeout, `None` when disabled.
    pub fn ndp_setup_timeout(&self) -> Option<Duration> {
        let secs = self
            .ndp_setup_timeout_secs
            .unwrap_or(DEFAULT_NDP_SETUP_TIMEOUT_SECS);
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.unwrap_or(DEFAULT_TICK_INTERVAL_SECS))
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER)
    }

    pub(super) fn merge(&mut self, other: WatchdogConfig) {
        if other.ndp_setup_timeout_secs.is_some() {
            self.ndp_setup_timeout_secs = other.ndp_setup_timeout_secs;
        }
        if other.tick_interval_secs.is_some() {
            self.tick_interval_secs = other.tick_interval_secs;
        }
        if other.event_buffer.is_some() {
            self.event_buffer = other.event_buffer;
        }
    }
}
