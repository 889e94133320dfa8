use tauri::State;

use crate::{
    location::LocationFix,
    transmitter::{AttemptOutcome, TransmitterView},
    AppState, AppTransmitter,
};

fn controller_from_state(state: &State<'_, AppState>) -> AppTransmitter {
    state.transmitter.clone()
}

#[tauri::command]
pub async fn get_transmitter_state(state: State<'_, AppState>) -> Result<TransmitterView, String> {
    Ok(controller_from_state(&state).snapshot().into())
}

#[tauri::command]
pub async fn transmit_now(state: State<'_, AppState>) -> Result<AttemptOutcome, String> {
    let controller = controller_from_state(&state);
    Ok(controller.transmit_now().await)
}

#[tauri::command]
pub fn resolve_location_permission(
    state: State<'_, AppState>,
    request_id: u64,
    granted: bool,
) -> Result<(), String> {
    state
        .location
        .resolve_permission(request_id, granted)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn resolve_location_fix(
    state: State<'_, AppState>,
    request_id: u64,
    fix: Option<LocationFix>,
    error: Option<String>,
) -> Result<(), String> {
    let outcome = match (fix, error) {
        (Some(fix), _) => Ok(fix),
        (None, Some(message)) => Err(message),
        (None, None) => Err("webview returned neither a fix nor an error".to_string()),
    };

    state
        .location
        .resolve_fix(request_id, outcome)
        .map_err(|e| e.to_string())
}
