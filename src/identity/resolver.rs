use anyhow::Result;
use log::{info, warn};
use rand::Rng;
use uuid::Uuid;

use crate::{backend::Backend, error::TransmitError, storage::KeyValueStore};

pub const LOCAL_ID_KEY: &str = "device_id";

const FALLBACK_PREFIX: &str = "device_";
const FALLBACK_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const DISPLAY_PREFIX_CHARS: usize = 8;

/// Produces the device's local identifier from durable storage.
pub struct IdentityResolver<S> {
    store: S,
}

impl<S: KeyValueStore> IdentityResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Never fails: when storage is unusable a session-only id is returned instead.
    pub fn resolve_local_id(&self) -> String {
        match self.load_or_create() {
            Ok(id) => id,
            Err(err) => {
                let fallback = fallback_local_id();
                warn!("Device id storage unavailable ({err:#}); using session id {fallback}");
                fallback
            }
        }
    }

    fn load_or_create(&self) -> Result<String> {
        if let Some(existing) = self.store.get(LOCAL_ID_KEY)?.filter(|id| !id.is_empty()) {
            info!("Existing device id loaded: {existing}");
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        self.store.set(LOCAL_ID_KEY, &id)?;
        info!("New device id generated: {id}");
        Ok(id)
    }
}

fn fallback_local_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..FALLBACK_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{FALLBACK_PREFIX}{suffix}")
}

pub fn display_name_for(local_id: &str) -> String {
    let prefix: String = local_id.chars().take(DISPLAY_PREFIX_CHARS).collect();
    format!("Transmitter-{prefix}")
}

/// Upserts the device and returns the backend-assigned id.
pub async fn register_device<B: Backend>(
    backend: &B,
    local_id: &str,
    display_name: &str,
) -> Result<String, TransmitError> {
    let record = backend
        .upsert_device(local_id, display_name)
        .await
        .map_err(|err| TransmitError::RegistrationFailed(format!("{err:#}")))?;

    if record.id.is_empty() {
        return Err(TransmitError::RegistrationFailed(
            "backend returned an empty device id".into(),
        ));
    }

    info!("Device {local_id} registered; backend id {}", record.id);
    Ok(record.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore};
    use anyhow::anyhow;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("storage offline"))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("storage offline"))
        }
    }

    #[test]
    fn generates_once_then_reuses() {
        let resolver = IdentityResolver::new(MemoryStore::new());
        let first = resolver.resolve_local_id();
        let second = resolver.resolve_local_id();

        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(
            resolver.store().get(LOCAL_ID_KEY).unwrap().as_deref(),
            Some(first.as_str())
        );
    }

    #[test]
    fn keeps_previously_persisted_id() {
        let store = MemoryStore::new();
        store.set(LOCAL_ID_KEY, "existing-id").unwrap();
        assert_eq!(IdentityResolver::new(store).resolve_local_id(), "existing-id");
    }

    #[test]
    fn broken_storage_degrades_to_session_id() {
        let id = IdentityResolver::new(BrokenStore).resolve_local_id();
        assert!(id.starts_with(FALLBACK_PREFIX));
        let suffix = &id[FALLBACK_PREFIX.len()..];
        assert_eq!(suffix.len(), FALLBACK_LEN);
        assert!(suffix.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn damaged_store_yields_one_id_across_launches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, r#"{"device_id": "abc"#).unwrap();

        let first = IdentityResolver::new(FileStore::new(path.clone())).resolve_local_id();
        let second = IdentityResolver::new(FileStore::new(path)).resolve_local_id();

        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(first, second);
    }

    #[test]
    fn display_name_uses_short_prefix() {
        assert_eq!(
            display_name_for("4f9c2a10-1111-2222-3333-444455556666"),
            "Transmitter-4f9c2a10"
        );
        assert_eq!(display_name_for("abc"), "Transmitter-abc");
    }
}
