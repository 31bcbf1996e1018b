use serde_json::Value;

use crate::{db::models::RunView, error::CommandError, AppState};

pub async fn record_run(
    state: &AppState,
    circuit_id: i64,
    payload: Value,
) -> Result<RunView, CommandError> {
    Ok(state.history.record_run(circuit_id, payload).await?)
}

pub async fn list_runs(state: &AppState) -> Result<Vec<RunView>, CommandError> {
    Ok(state.history.list_runs().await?)
}
