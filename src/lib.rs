pub mod backend;
pub mod config;
pub mod error;
pub mod identity;
pub mod location;
pub mod storage;
pub mod transmitter;

pub use error::{Alert, TransmitError};

#[cfg(feature = "app")]
use anyhow::Context;
#[cfg(feature = "app")]
use backend::SupabaseClient;
#[cfg(feature = "app")]
use config::TransmitterConfig;
#[cfg(feature = "app")]
use location::WebviewLocationSource;
#[cfg(feature = "app")]
use log::warn;
#[cfg(feature = "app")]
use storage::FileStore;
#[cfg(feature = "app")]
use tauri::{AppHandle, Emitter, Manager, RunEvent, State};
#[cfg(feature = "app")]
use tokio::sync::broadcast::error::RecvError;
#[cfg(feature = "app")]
use transmitter::{
    commands::{
        get_transmitter_state, resolve_location_fix, resolve_location_permission, transmit_now,
    },
    TransmitterController, TransmitterSettings, TransmitterView,
};

#[cfg(feature = "app")]
pub(crate) type AppTransmitter =
    TransmitterController<WebviewLocationSource, SupabaseClient, FileStore>;

#[cfg(feature = "app")]
pub(crate) struct AppState {
    pub(crate) transmitter: AppTransmitter,
    pub(crate) location: WebviewLocationSource,
}

/// Called by the webview once its geolocation listeners are attached.
/// Reloads of the page call it again; only the first call starts the loop.
#[cfg(feature = "app")]
#[tauri::command]
async fn start_transmitter(state: State<'_, AppState>) -> Result<bool, String> {
    let controller = state.transmitter.clone();
    match controller.start() {
        Ok(()) => Ok(true),
        Err(err) if !controller.is_stopped() => {
            log::debug!("start_transmitter ignored: {err}");
            Ok(false)
        }
        Err(err) => Err(err.to_string()),
    }
}

#[cfg(feature = "app")]
fn forward_events(app_handle: AppHandle, transmitter: &AppTransmitter) {
    let mut states = transmitter.subscribe();
    let state_handle = app_handle.clone();
    tauri::async_runtime::spawn(async move {
        while states.changed().await.is_ok() {
            let view = TransmitterView::from(states.borrow_and_update().clone());
            let _ = state_handle.emit("transmitter-state-changed", view);
        }
    });

    let mut alerts = transmitter.subscribe_alerts();
    tauri::async_runtime::spawn(async move {
        loop {
            match alerts.recv().await {
                Ok(alert) => {
                    let _ = app_handle.emit("transmitter-alert", alert);
                }
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {skipped} alerts"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(feature = "app")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Blackeye transmitter starting up...");

    let app = tauri::Builder::default()
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let config = TransmitterConfig::from_env()
                    .context("backend connection parameters are required")?;

                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let store = FileStore::new(app_data_dir.join("device.json"));
                log::info!("Device identity store at {}", store.path().display());
                let location = WebviewLocationSource::new(app.handle().clone());
                let backend = SupabaseClient::new(&config.backend);
                let transmitter = TransmitterController::new(
                    location.clone(),
                    backend,
                    store,
                    TransmitterSettings::from(&config),
                );

                let local_id = transmitter.resolve_local_id();
                log::info!("Device id {local_id}; reporting to {}", config.backend.url);

                forward_events(app.handle().clone(), &transmitter);

                app.manage(AppState {
                    transmitter,
                    location,
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            start_transmitter,
            get_transmitter_state,
            transmit_now,
            resolve_location_permission,
            resolve_location_fix,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| {
        if let RunEvent::Exit = event {
            if let Some(state) = app_handle.try_state::<AppState>() {
                state.transmitter.stop();
            }
        }
    });
}
