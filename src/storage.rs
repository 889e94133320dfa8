use anyhow::{anyhow, Context, Result};
use log::warn;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

/// Device-local durable key/value storage.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// JSON object on disk, loaded once and rewritten on every `set`.
///
/// Writes go through a temporary sibling that is renamed into place. A file
/// that exists but cannot be parsed is moved aside to `<name>.corrupt` and the
/// store starts empty, so the next `set` leaves a readable file behind.
pub struct FileStore {
    path: PathBuf,
    data: RwLock<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store from {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        match serde_json::from_str(&contents) {
            Ok(data) => Ok(data),
            Err(err) => {
                let backup = self.sibling(".corrupt");
                warn!(
                    "Store at {} is damaged ({err}); moving it to {} and starting empty",
                    self.path.display(),
                    backup.display()
                );
                if let Err(err) = fs::rename(&self.path, &backup) {
                    warn!("Failed to keep damaged store at {}: {err}", backup.display());
                }
                Ok(BTreeMap::new())
            }
        }
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        let staging = self.sibling(".tmp");
        fs::write(&staging, serialized)
            .with_context(|| format!("Failed to write store to {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("Failed to move store into {}", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        {
            let guard = self.data.read().map_err(|_| anyhow!("store lock poisoned"))?;
            if let Some(data) = guard.as_ref() {
                return Ok(data.get(key).cloned());
            }
        }

        let mut guard = self.data.write().map_err(|_| anyhow!("store lock poisoned"))?;
        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        Ok(guard.as_ref().and_then(|data| data.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.data.write().map_err(|_| anyhow!("store lock poisoned"))?;
        let mut data = match guard.take() {
            Some(data) => data,
            None => self.load()?,
        };
        data.insert(key.to_string(), value.to_string());
        let result = self.persist(&data);
        *guard = Some(data);
        result
    }
}

/// Non-durable store; values live as long as the instance.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self.data.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.data.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl<T: KeyValueStore> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}
