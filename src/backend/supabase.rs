//! Thin PostgREST client for the Supabase project the transmitters report to.
//!
//! Calls go through a blocking `ureq` agent on tokio's blocking pool; the
//! agent's timeout is the only timeout applied to backend calls.

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::BackendConfig;

use super::{Backend, DeviceRecord, LocationReading};

const DEVICES_TABLE: &str = "devices";
const LOCATIONS_TABLE: &str = "location_data";
const DEVICE_CONFLICT_COLUMN: &str = "device_id";

#[derive(Clone)]
pub struct SupabaseClient {
    agent: ureq::Agent,
    rest_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct DeviceRow {
    id: Value,
    device_id: String,
    #[serde(default)]
    device_name: Option<String>,
}

#[derive(Deserialize)]
struct PostgrestError {
    #[serde(default)]
    message: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &BackendConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            agent,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
        }
    }

    fn post(&self, table: &str) -> ureq::Request {
        self.agent
            .post(&format!("{}/{}", self.rest_url, table))
            .set("apikey", &self.anon_key)
            .set("Authorization", &format!("Bearer {}", self.anon_key))
            .set("Content-Type", "application/json")
    }

    fn upsert_device_blocking(&self, identifier: &str, display_name: &str) -> Result<DeviceRecord> {
        let request = self
            .post(DEVICES_TABLE)
            .query("on_conflict", DEVICE_CONFLICT_COLUMN)
            .set("Prefer", "resolution=merge-duplicates,return=representation");
        let body = json!([{
            "device_id": identifier,
            "device_name": display_name,
            "is_active": true,
        }]);

        let response = send(request, &body)?;
        let raw = response
            .into_string()
            .context("failed to read device upsert response")?;
        let rows: Vec<DeviceRow> =
            serde_json::from_str(&raw).context("unexpected device upsert response")?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("device upsert returned no rows"))?;

        Ok(DeviceRecord {
            id: id_to_string(&row.id)?,
            identifier: row.device_id,
            display_name: row.device_name.unwrap_or_else(|| display_name.to_string()),
        })
    }

    fn insert_location_blocking(&self, reading: &LocationReading) -> Result<()> {
        let request = self.post(LOCATIONS_TABLE).set("Prefer", "return=minimal");
        let body = serde_json::to_value([reading]).context("failed to encode location reading")?;
        send(request, &body)?;
        Ok(())
    }
}

impl Backend for SupabaseClient {
    async fn upsert_device(&self, identifier: &str, display_name: &str) -> Result<DeviceRecord> {
        let client = self.clone();
        let identifier = identifier.to_string();
        let display_name = display_name.to_string();

        let record = tokio::task::spawn_blocking(move || {
            client.upsert_device_blocking(&identifier, &display_name)
        })
        .await
        .context("device upsert worker join failed")??;

        info!("Device {} upserted as {}", record.identifier, record.id);
        Ok(record)
    }

    async fn insert_location(&self, reading: &LocationReading) -> Result<()> {
        let client = self.clone();
        let reading = reading.clone();

        tokio::task::spawn_blocking(move || client.insert_location_blocking(&reading))
            .await
            .context("location insert worker join failed")??;

        debug!("Location row inserted");
        Ok(())
    }
}

fn send(request: ureq::Request, body: &Value) -> Result<ureq::Response> {
    match request.send_string(&body.to_string()) {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => {
            let raw = response.into_string().unwrap_or_default();
            Err(anyhow!(error_message(status, &raw)))
        }
        Err(ureq::Error::Transport(transport)) => Err(anyhow!("Network error: {transport}")),
    }
}

/// PostgREST reports failures as `{"message": ...}`; anything else is echoed raw.
fn error_message(status: u16, raw: &str) -> String {
    match serde_json::from_str::<PostgrestError>(raw) {
        Ok(PostgrestError {
            message: Some(message),
        }) if !message.is_empty() => message,
        _ if !raw.trim().is_empty() => format!("HTTP {status}: {}", raw.trim()),
        _ => format!("HTTP {status}"),
    }
}

fn id_to_string(id: &Value) -> Result<String> {
    match id {
        Value::String(id) if !id.is_empty() => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(anyhow!("device upsert returned unusable id {other}")),
    }
}
