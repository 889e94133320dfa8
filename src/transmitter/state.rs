use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::LocationFix;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransmissionStatus {
    Idle,
    Sending,
    Success,
    Error,
}

impl Default for TransmissionStatus {
    fn default() -> Self {
        TransmissionStatus::Idle
    }
}

impl TransmissionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TransmissionStatus::Idle => "Ready",
            TransmissionStatus::Sending => "Sending...",
            TransmissionStatus::Success => "Sent successfully!",
            TransmissionStatus::Error => "Failed to send",
        }
    }

    /// Neutral, amber, green, red.
    pub fn color(&self) -> &'static str {
        match self {
            TransmissionStatus::Idle => "#888888",
            TransmissionStatus::Sending => "#ffaa00",
            TransmissionStatus::Success => "#00ff88",
            TransmissionStatus::Error => "#ff4444",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionStatus {
    Checking,
    Granted,
    Denied,
}

impl Default for PermissionStatus {
    fn default() -> Self {
        PermissionStatus::Checking
    }
}

impl PermissionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PermissionStatus::Checking => "Checking permissions...",
            PermissionStatus::Granted => "Auto-updating",
            PermissionStatus::Denied => "Permission denied",
        }
    }
}

/// Everything the UI shows about the transmitter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransmitterState {
    pub transmission: TransmissionStatus,
    pub permission: PermissionStatus,
    pub local_id: Option<String>,
    pub backend_id: Option<String>,
    pub last_fix: Option<LocationFix>,
    pub last_update: Option<DateTime<Utc>>,
    pub update_count: u64,
    /// Bumped on every transmission status write; a scheduled reset only
    /// applies while the generation it captured is still current.
    #[serde(skip)]
    pub status_generation: u64,
}

impl TransmitterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transmission(&mut self, status: TransmissionStatus) -> u64 {
        self.status_generation = self.status_generation.wrapping_add(1);
        self.transmission = status;
        self.status_generation
    }

    pub fn reset_if_current(&mut self, generation: u64) -> bool {
        if self.status_generation != generation || self.transmission == TransmissionStatus::Idle {
            return false;
        }
        self.set_transmission(TransmissionStatus::Idle);
        true
    }

    pub fn record_fix(&mut self, fix: LocationFix, received_at: DateTime<Utc>) {
        self.last_fix = Some(fix);
        self.last_update = Some(received_at);
        self.update_count = self.update_count.saturating_add(1);
    }
}

/// Snapshot plus the text and colour the webview renders for it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmitterView {
    #[serde(flatten)]
    pub state: TransmitterState,
    pub transmission_label: &'static str,
    pub transmission_color: &'static str,
    pub permission_label: &'static str,
}

impl From<TransmitterState> for TransmitterView {
    fn from(state: TransmitterState) -> Self {
        Self {
            transmission_label: state.transmission.label(),
            transmission_color: state.transmission.color(),
            permission_label: state.permission.label(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_reset_is_ignored() {
        let mut state = TransmitterState::new();
        let first = state.set_transmission(TransmissionStatus::Success);
        let second = state.set_transmission(TransmissionStatus::Error);

        assert!(!state.reset_if_current(first));
        assert_eq!(state.transmission, TransmissionStatus::Error);

        assert!(state.reset_if_current(second));
        assert_eq!(state.transmission, TransmissionStatus::Idle);
    }

    #[test]
    fn reset_of_idle_is_a_no_op() {
        let mut state = TransmitterState::new();
        let generation = state.status_generation;
        assert!(!state.reset_if_current(generation));
    }

    #[test]
    fn record_fix_counts_updates() {
        let mut state = TransmitterState::new();
        let fix = LocationFix {
            latitude: 1.0,
            longitude: 2.0,
            accuracy: Some(3.0),
            speed: None,
            captured_at: Utc::now(),
        };
        state.record_fix(fix.clone(), Utc::now());
        state.record_fix(fix.clone(), Utc::now());

        assert_eq!(state.update_count, 2);
        assert_eq!(state.last_fix, Some(fix));
    }

    #[test]
    fn serializes_for_the_webview() {
        let json = serde_json::to_value(TransmitterState::new()).unwrap();
        assert_eq!(json["transmission"], "idle");
        assert_eq!(json["permission"], "checking");
        assert_eq!(json["updateCount"], 0);
        assert!(json.get("statusGeneration").is_none());
    }

    #[test]
    fn view_carries_display_text() {
        let mut state = TransmitterState::new();
        state.set_transmission(TransmissionStatus::Error);
        state.permission = PermissionStatus::Denied;

        let json = serde_json::to_value(TransmitterView::from(state)).unwrap();
        assert_eq!(json["transmission"], "error");
        assert_eq!(json["transmissionLabel"], "Failed to send");
        assert_eq!(json["transmissionColor"], "#ff4444");
        assert_eq!(json["permissionLabel"], "Permission denied");
        assert!(json.get("statusGeneration").is_none());
    }
}
