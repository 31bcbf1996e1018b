pub mod commands;
pub mod validation;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    db::{
        models::CircuitView,
        repositories::{circuits, run_sessions},
        Database,
    },
    session::state::view_at,
};

/// Circuit definitions plus a peek at each circuit's live session.
#[derive(Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Newest first.
    pub async fn list_circuits(&self, now: DateTime<Utc>) -> Result<Vec<CircuitView>> {
        self.db
            .execute(move |conn| {
                let mut sessions = run_sessions::sessions_by_circuit(conn)?;
                let views: Vec<CircuitView> = circuits::list_circuits(conn)?
                    .into_iter()
                    .map(|circuit| {
                        let active_run = sessions
                            .remove(&circuit.id)
                            .map(|session| view_at(&session, now));
                        CircuitView::new(circuit, active_run)
                    })
                    .collect();
                Ok(views)
            })
            .await
    }

    pub async fn get_circuit(&self, circuit_id: i64, now: DateTime<Utc>) -> Result<CircuitView> {
        self.db
            .execute(move |conn| {
                let circuit = circuits::require_circuit(conn, circuit_id)?;
                let active_run = run_sessions::find_session(conn, circuit_id)?
                    .map(|session| view_at(&session, now));
                Ok(CircuitView::new(circuit, active_run))
            })
            .await
    }

    pub async fn create_circuit(&self, payload: &Value) -> Result<CircuitView> {
        let new = validation::validate_circuit(payload)?;
        let circuit = self.db.create_circuit(new).await?;
        Ok(CircuitView::new(circuit, None))
    }

    /// Replaces the whole definition. A live session whose statuses no longer
    /// match the new task count will be rejected on its next write.
    pub async fn update_circuit(&self, circuit_id: i64, payload: &Value) -> Result<CircuitView> {
        let new = validation::validate_circuit(payload)?;
        let circuit = self.db.update_circuit(circuit_id, new).await?;
        Ok(CircuitView::new(circuit, None))
    }

    pub async fn delete_circuit(&self, circuit_id: i64) -> Result<()> {
        self.db.delete_circuit(circuit_id).await
    }
}
