//! Rows exchanged with the hosted backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::LocationFix;

/// A registered device as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceRecord {
    pub id: String,
    pub identifier: String,
    pub display_name: String,
}

/// One location row, keyed by the backend device id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationReading {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationReading {
    pub fn from_fix(device_id: impl Into<String>, fix: &LocationFix) -> Self {
        Self {
            device_id: device_id.into(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            speed: fix.speed,
            timestamp: fix.captured_at,
        }
    }
}
