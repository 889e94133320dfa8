//! Request/reply bridge between the transmitter and the webview's geolocation API.
//!
//! The Rust side emits an event carrying a request id; the webview answers by
//! invoking a command with the same id. Replies that arrive after their waiter
//! gave up are rejected.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use tokio::sync::oneshot;
use tokio::time;

pub const PERMISSION_TIMEOUT: Duration = Duration::from_secs(120);
pub const FIX_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PendingRequests<T> {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<T>>>,
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiting: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> PendingRequests<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> Result<(u64, oneshot::Receiver<T>)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiting
            .lock()
            .map_err(|_| anyhow!("pending request table poisoned"))?
            .insert(id, tx);
        Ok((id, rx))
    }

    pub fn resolve(&self, id: u64, value: T) -> Result<()> {
        let sender = self
            .waiting
            .lock()
            .map_err(|_| anyhow!("pending request table poisoned"))?
            .remove(&id)
            .ok_or_else(|| anyhow!("no pending request with id {id}"))?;

        if sender.send(value).is_err() {
            bail!("request {id} is no longer awaited");
        }
        Ok(())
    }

    pub fn forget(&self, id: u64) {
        if let Ok(mut waiting) = self.waiting.lock() {
            waiting.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.waiting.lock().map(|waiting| waiting.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry is removed however the wait ends, including when the future is dropped.
    pub async fn wait(&self, id: u64, rx: oneshot::Receiver<T>, timeout: Duration) -> Result<T> {
        let _entry = ForgetOnDrop { pending: self, id };
        match time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(anyhow!("request {id} was dropped before a reply arrived")),
            Err(_) => Err(anyhow!(
                "timed out after {}s waiting for a reply",
                timeout.as_secs()
            )),
        }
    }
}

struct ForgetOnDrop<'a, T> {
    pending: &'a PendingRequests<T>,
    id: u64,
}

impl<T> Drop for ForgetOnDrop<'_, T> {
    fn drop(&mut self) {
        self.pending.forget(self.id);
    }
}

#[cfg(feature = "app")]
pub use webview::WebviewLocationSource;

#[cfg(feature = "app")]
mod webview {
    use std::sync::Arc;

    use anyhow::{anyhow, Context, Result};
    use log::info;
    use serde::Serialize;
    use tauri::{AppHandle, Emitter};

    use super::{PendingRequests, FIX_TIMEOUT, PERMISSION_TIMEOUT};
    use crate::location::{Accuracy, LocationFix, LocationSource, PermissionOutcome};

    const PERMISSION_EVENT: &str = "location-permission-requested";
    const FIX_EVENT: &str = "location-fix-requested";

    #[derive(Serialize, Clone)]
    #[serde(rename_all = "camelCase")]
    struct LocationRequestEvent {
        request_id: u64,
        high_accuracy: bool,
    }

    struct BridgeInner {
        app_handle: AppHandle,
        permissions: PendingRequests<bool>,
        fixes: PendingRequests<std::result::Result<LocationFix, String>>,
    }

    /// [`LocationSource`] backed by `navigator.geolocation` in the webview.
    #[derive(Clone)]
    pub struct WebviewLocationSource {
        inner: Arc<BridgeInner>,
    }

    impl WebviewLocationSource {
        pub fn new(app_handle: AppHandle) -> Self {
            Self {
                inner: Arc::new(BridgeInner {
                    app_handle,
                    permissions: PendingRequests::new(),
                    fixes: PendingRequests::new(),
                }),
            }
        }

        pub fn resolve_permission(&self, request_id: u64, granted: bool) -> Result<()> {
            self.inner.permissions.resolve(request_id, granted)
        }

        pub fn resolve_fix(
            &self,
            request_id: u64,
            outcome: std::result::Result<LocationFix, String>,
        ) -> Result<()> {
            self.inner.fixes.resolve(request_id, outcome)
        }

        fn emit_request(&self, event: &str, request_id: u64, high_accuracy: bool) -> Result<()> {
            self.inner
                .app_handle
                .emit(
                    event,
                    LocationRequestEvent {
                        request_id,
                        high_accuracy,
                    },
                )
                .map_err(|err| anyhow!("failed to emit {event}: {err}"))
        }
    }

    impl LocationSource for WebviewLocationSource {
        async fn request_foreground_permission(&self) -> Result<PermissionOutcome> {
            let (id, rx) = self.inner.permissions.register()?;
            if let Err(err) = self.emit_request(PERMISSION_EVENT, id, false) {
                self.inner.permissions.forget(id);
                return Err(err);
            }

            let granted = self
                .inner
                .permissions
                .wait(id, rx, PERMISSION_TIMEOUT)
                .await
                .context("location permission prompt")?;
            info!("Location permission {}", if granted { "granted" } else { "denied" });

            Ok(if granted {
                PermissionOutcome::Granted
            } else {
                PermissionOutcome::Denied
            })
        }

        async fn current_position(&self, accuracy: Accuracy) -> Result<LocationFix> {
            let (id, rx) = self.inner.fixes.register()?;
            if let Err(err) = self.emit_request(FIX_EVENT, id, accuracy == Accuracy::High) {
                self.inner.fixes.forget(id);
                return Err(err);
            }

            self.inner
                .fixes
                .wait(id, rx, FIX_TIMEOUT)
                .await
                .context("location fix request")?
                .map_err(|message| anyhow!(message))
        }
    }
}
