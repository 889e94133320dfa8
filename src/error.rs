use serde::Serialize;
use thiserror::Error;

/// Failures that end a transmission attempt early.
///
/// All of them are caught at the attempt boundary and turned into an [`Alert`];
/// none of them escape to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum TransmitError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("failed to get location: {0}")]
    SensorFailure(String),
    #[error("failed to register device: {0}")]
    RegistrationFailed(String),
    #[error("failed to save location: {0}")]
    TransmissionFailed(String),
}

/// A blocking, user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

impl TransmitError {
    pub fn alert(&self) -> Alert {
        match self {
            TransmitError::PermissionDenied => Alert::new(
                "Location permission denied",
                "Please enable location access in settings",
            ),
            TransmitError::SensorFailure(message) => {
                Alert::new("Error getting location", message.clone())
            }
            TransmitError::RegistrationFailed(message) => Alert::new(
                "Device Registration Error",
                format!("Failed to register device: {message}"),
            ),
            TransmitError::TransmissionFailed(message) => Alert::new(
                "Database Error",
                format!("Failed to save location: {message}"),
            ),
        }
    }

    /// Permission denial leaves the transmission status alone; everything else flips it to error.
    pub fn marks_error(&self) -> bool {
        !matches!(self, TransmitError::PermissionDenied)
    }
}
