pub mod models;
pub mod supabase;

use std::future::Future;

use anyhow::Result;

pub use models::{DeviceRecord, LocationReading};
pub use supabase::SupabaseClient;

/// Hosted data store the transmitter reports to.
pub trait Backend: Send + Sync + 'static {
    /// Create-or-update keyed by `identifier`. Repeated calls with the same
    /// identifier must yield the same record id.
    fn upsert_device(
        &self,
        identifier: &str,
        display_name: &str,
    ) -> impl Future<Output = Result<DeviceRecord>> + Send;

    /// Append-only insert.
    fn insert_location(&self, reading: &LocationReading) -> impl Future<Output = Result<()>> + Send;
}
