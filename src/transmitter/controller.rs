use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{Backend, LocationReading},
    config::{TransmitterConfig, DEFAULT_INTERVAL, DEFAULT_RESET_DELAY},
    error::{Alert, TransmitError},
    identity::{display_name_for, register_device, IdentityResolver},
    location::{Accuracy, LocationSource, PermissionOutcome},
    storage::KeyValueStore,
};

use super::{PermissionStatus, TransmissionStatus, TransmitterState};

const ALERT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct TransmitterSettings {
    pub interval: Duration,
    pub reset_delay: Duration,
}

impl Default for TransmitterSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            reset_delay: DEFAULT_RESET_DELAY,
        }
    }
}

impl From<&TransmitterConfig> for TransmitterSettings {
    fn from(config: &TransmitterConfig) -> Self {
        Self {
            interval: config.interval,
            reset_delay: config.reset_delay,
        }
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AttemptOutcome {
    Sent { reading: LocationReading },
    Failed { error: TransmitError },
    /// Another attempt was already in flight.
    Skipped,
    /// The transmitter was stopped before the attempt settled.
    Cancelled,
}

#[derive(Default)]
struct Lifecycle {
    started: bool,
    ticker: Option<JoinHandle<()>>,
    pending_reset: Option<JoinHandle<()>>,
}

struct Shared<L, B, S> {
    location: L,
    backend: B,
    identity: IdentityResolver<S>,
    settings: TransmitterSettings,
    state: watch::Sender<TransmitterState>,
    alerts: broadcast::Sender<Alert>,
    cancel_token: CancellationToken,
    in_flight: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

/// Owns the identity cache, the status fields and the repeating timer of one
/// transmitter instance. Cloning yields another handle to the same instance.
pub struct TransmitterController<L, B, S> {
    shared: Arc<Shared<L, B, S>>,
}

impl<L, B, S> Clone for TransmitterController<L, B, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<L, B, S> TransmitterController<L, B, S>
where
    L: LocationSource,
    B: Backend,
    S: KeyValueStore,
{
    pub fn new(location: L, backend: B, store: S, settings: TransmitterSettings) -> Self {
        let (state, _) = watch::channel(TransmitterState::new());
        let (alerts, _) = broadcast::channel(ALERT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                location,
                backend,
                identity: IdentityResolver::new(store),
                settings,
                state,
                alerts,
                cancel_token: CancellationToken::new(),
                in_flight: AtomicBool::new(false),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    pub fn snapshot(&self) -> TransmitterState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransmitterState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.shared.alerts.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel_token.is_cancelled()
    }

    /// Pre-warms the identity, runs one attempt, then arms the repeating timer.
    pub fn start(&self) -> Result<()> {
        if self.is_stopped() {
            bail!("transmitter already stopped");
        }

        let mut lifecycle = self
            .shared
            .lifecycle
            .lock()
            .map_err(|_| anyhow!("transmitter lifecycle lock poisoned"))?;
        if lifecycle.started {
            bail!("transmitter already running");
        }

        let controller = self.clone();
        lifecycle.ticker = Some(tokio::spawn(async move { controller.run_loop().await }));
        lifecycle.started = true;
        info!(
            "Transmitter started; interval {}s",
            self.shared.settings.interval.as_secs()
        );
        Ok(())
    }

    /// Disarms the timer and pending reset. Anything that resolves afterwards is discarded.
    pub fn stop(&self) {
        // Cancelling under the state lock orders it against every write and alert.
        let mut newly_stopped = false;
        self.shared.state.send_if_modified(|_| {
            newly_stopped = !self.shared.cancel_token.is_cancelled();
            self.shared.cancel_token.cancel();
            false
        });
        if !newly_stopped {
            return;
        }

        let mut lifecycle = match self.shared.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = lifecycle.ticker.take() {
            handle.abort();
        }
        if let Some(handle) = lifecycle.pending_reset.take() {
            handle.abort();
        }
        info!("Transmitter stopped");
    }

    /// Cached for the session, so a degraded fallback id stays stable until restart.
    pub fn resolve_local_id(&self) -> String {
        let cached = self.shared.state.borrow().local_id.clone();
        if let Some(id) = cached {
            return id;
        }

        let id = self.shared.identity.resolve_local_id();
        self.update(|state| {
            if state.local_id.is_none() {
                state.local_id = Some(id.clone());
            }
        });
        id
    }

    /// Runs one attempt unless another is in flight or the transmitter is stopped.
    pub async fn transmit_now(&self) -> AttemptOutcome {
        if self.is_stopped() {
            return AttemptOutcome::Cancelled;
        }

        let Some(_guard) = InFlightGuard::acquire(&self.shared.in_flight) else {
            info!("Transmission already in flight; skipping trigger");
            return AttemptOutcome::Skipped;
        };

        let result = tokio::select! {
            biased;
            _ = self.shared.cancel_token.cancelled() => return AttemptOutcome::Cancelled,
            result = self.attempt() => result,
        };

        if self.is_stopped() {
            return AttemptOutcome::Cancelled;
        }

        match result {
            Ok(reading) => {
                if let Some(generation) = self.set_transmission(TransmissionStatus::Success) {
                    self.schedule_reset(generation);
                }
                info!(
                    "Location sent for device {} ({:.6}, {:.6})",
                    reading.device_id, reading.latitude, reading.longitude
                );
                AttemptOutcome::Sent { reading }
            }
            Err(err) => {
                if err.marks_error() {
                    error!("Transmission attempt failed: {err}");
                    if let Some(generation) = self.set_transmission(TransmissionStatus::Error) {
                        if matches!(err, TransmitError::TransmissionFailed(_)) {
                            self.schedule_reset(generation);
                        }
                    }
                } else {
                    warn!("Transmission attempt aborted: {err}");
                }
                self.alert(err.alert());
                AttemptOutcome::Failed { error: err }
            }
        }
    }

    async fn run_loop(&self) {
        self.resolve_local_id();
        self.transmit_now().await;

        let period = self.shared.settings.interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.transmit_now().await;
                }
                _ = self.shared.cancel_token.cancelled() => {
                    info!("Transmission loop shutting down");
                    break;
                }
            }
        }
    }

    async fn attempt(&self) -> Result<LocationReading, TransmitError> {
        let permission = self
            .shared
            .location
            .request_foreground_permission()
            .await
            .map_err(|err| TransmitError::SensorFailure(format!("{err:#}")))?;

        if permission == PermissionOutcome::Denied {
            self.update(|state| state.permission = PermissionStatus::Denied);
            return Err(TransmitError::PermissionDenied);
        }
        self.update(|state| state.permission = PermissionStatus::Granted);

        let fix = self
            .shared
            .location
            .current_position(Accuracy::High)
            .await
            .map_err(|err| TransmitError::SensorFailure(format!("{err:#}")))?;
        let received_at = Utc::now();
        self.update(|state| state.record_fix(fix.clone(), received_at));

        let backend_id = self.ensure_registered().await?;

        self.set_transmission(TransmissionStatus::Sending);
        let reading = LocationReading::from_fix(backend_id, &fix);
        self.shared
            .backend
            .insert_location(&reading)
            .await
            .map_err(|err| TransmitError::TransmissionFailed(format!("{err:#}")))?;

        Ok(reading)
    }

    async fn ensure_registered(&self) -> Result<String, TransmitError> {
        let cached = self.shared.state.borrow().backend_id.clone();
        if let Some(id) = cached {
            return Ok(id);
        }

        let local_id = self.resolve_local_id();
        let display_name = display_name_for(&local_id);
        let backend_id = register_device(&self.shared.backend, &local_id, &display_name).await?;

        self.update(|state| state.backend_id = Some(backend_id.clone()));
        Ok(backend_id)
    }

    fn schedule_reset(&self, generation: u64) {
        let controller = self.clone();
        let delay = self.shared.settings.reset_delay;

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {
                    controller.update_if(|state| state.reset_if_current(generation));
                }
                _ = controller.shared.cancel_token.cancelled() => {}
            }
        });

        let mut lifecycle = match self.shared.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = lifecycle.pending_reset.replace(handle) {
            previous.abort();
        }
    }

    fn set_transmission(&self, status: TransmissionStatus) -> Option<u64> {
        let mut generation = None;
        self.update(|state| generation = Some(state.set_transmission(status)));
        generation
    }

    fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut TransmitterState),
    {
        self.update_if(|state| {
            mutate(state);
            true
        });
    }

    /// Applies `mutate` unless the transmitter is stopped; the check runs under the state lock.
    fn update_if<F>(&self, mutate: F)
    where
        F: FnOnce(&mut TransmitterState) -> bool,
    {
        let token = &self.shared.cancel_token;
        self.shared
            .state
            .send_if_modified(|state| !token.is_cancelled() && mutate(state));
    }

    fn alert(&self, alert: Alert) {
        let token = &self.shared.cancel_token;
        let alerts = &self.shared.alerts;
        self.shared.state.send_if_modified(|_| {
            if !token.is_cancelled() {
                // No subscribers is fine; the alert is simply not shown.
                let _ = alerts.send(alert);
            }
            false
        });
    }
}
