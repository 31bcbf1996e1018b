use serde_json::Value;

use crate::{
    db::models::{RunView, SessionView},
    error::CommandError,
    AppState,
};

pub async fn get_session(state: &AppState, circuit_id: i64) -> Result<SessionView, CommandError> {
    Ok(state.sessions.get_session(circuit_id).await?)
}

pub async fn upsert_session(
    state: &AppState,
    circuit_id: i64,
    payload: Value,
) -> Result<SessionView, CommandError> {
    Ok(state.sessions.upsert_session(circuit_id, payload).await?)
}

/// Succeeds whether or not a session existed.
pub async fn delete_session(state: &AppState, circuit_id: i64) -> Result<(), CommandError> {
    state.sessions.delete_session(circuit_id).await?;
    Ok(())
}

pub async fn finish_session(
    state: &AppState,
    circuit_id: i64,
    payload: Value,
) -> Result<RunView, CommandError> {
    Ok(state.sessions.finish_session(circuit_id, payload).await?)
}
