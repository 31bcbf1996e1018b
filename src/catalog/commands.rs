use chrono::Utc;
use serde_json::Value;

use crate::{db::models::CircuitView, error::CommandError, AppState};

pub async fn list_circuits(state: &AppState) -> Result<Vec<CircuitView>, CommandError> {
    Ok(state.catalog.list_circuits(Utc::now()).await?)
}

pub async fn get_circuit(state: &AppState, circuit_id: i64) -> Result<CircuitView, CommandError> {
    Ok(state.catalog.get_circuit(circuit_id, Utc::now()).await?)
}

pub async fn create_circuit(state: &AppState, payload: Value) -> Result<CircuitView, CommandError> {
    Ok(state.catalog.create_circuit(&payload).await?)
}

pub async fn update_circuit(
    state: &AppState,
    circuit_id: i64,
    payload: Value,
) -> Result<CircuitView, CommandError> {
    Ok(state.catalog.update_circuit(circuit_id, &payload).await?)
}

pub async fn delete_circuit(state: &AppState, circuit_id: i64) -> Result<(), CommandError> {
    Ok(state.catalog.delete_circuit(circuit_id).await?)
}
