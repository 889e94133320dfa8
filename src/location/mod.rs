pub mod bridge;

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "app")]
pub use bridge::WebviewLocationSource;
pub use bridge::PendingRequests;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionOutcome {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Accuracy {
    Balanced,
    High,
}

/// A single position reading as produced by the sensor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// Geolocation capability: a permission prompt and a single-shot fix.
pub trait LocationSource: Send + Sync + 'static {
    fn request_foreground_permission(
        &self,
    ) -> impl Future<Output = Result<PermissionOutcome>> + Send;

    fn current_position(
        &self,
        accuracy: Accuracy,
    ) -> impl Future<Output = Result<LocationFix>> + Send;
}
