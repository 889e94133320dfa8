#[cfg(feature = "app")]
pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{AttemptOutcome, TransmitterController, TransmitterSettings};
pub use state::{PermissionStatus, TransmissionStatus, TransmitterState, TransmitterView};
