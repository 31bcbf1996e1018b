use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{format_datetime, parse_datetime},
        models::{Circuit, NewCircuit, Task},
    },
    error::ServiceError,
};

const ENABLE_LOGS: bool = true;

fn row_to_circuit(row: &Row) -> Result<Circuit> {
    let tasks_json: String = row.get("tasks_json")?;
    let created_at: String = row.get("created_at")?;

    Ok(Circuit {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        tasks: Task::decode_list(&tasks_json),
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

pub fn find_circuit(conn: &Connection, circuit_id: i64) -> Result<Option<Circuit>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, tasks_json, created_at
         FROM circuits
         WHERE id = ?1",
    )?;

    stmt.query_row(params![circuit_id], |row| Ok(row_to_circuit(row)))
        .optional()?
        .transpose()
}

/// Like [`find_circuit`], but absence is a [`ServiceError::NotFound`].
pub fn require_circuit(conn: &Connection, circuit_id: i64) -> Result<Circuit> {
    find_circuit(conn, circuit_id)?.ok_or_else(|| ServiceError::circuit_not_found().into())
}

/// Newest first.
pub fn list_circuits(conn: &Connection) -> Result<Vec<Circuit>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, tasks_json, created_at
         FROM circuits
         ORDER BY created_at DESC, id DESC",
    )?;

    let mut rows = stmt.query([])?;
    let mut circuits = Vec::new();
    while let Some(row) = rows.next()? {
        circuits.push(row_to_circuit(row)?);
    }

    Ok(circuits)
}

/// Insert without validation; callers go through the catalog for that.
pub fn insert_circuit(
    conn: &Connection,
    circuit: &NewCircuit,
    created_at: DateTime<Utc>,
) -> Result<Circuit> {
    let tasks_json = Task::encode_list(&circuit.tasks).context("failed to encode tasks")?;
    conn.execute(
        "INSERT INTO circuits (name, description, tasks_json, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            circuit.name,
            circuit.description,
            tasks_json,
            format_datetime(&created_at),
        ],
    )?;

    let circuit_id = conn.last_insert_rowid();
    find_circuit(conn, circuit_id)?.ok_or_else(|| anyhow!("Circuit not found after insert"))
}

/// Replace name, description and the whole task list. `None` when absent.
pub fn replace_circuit(
    conn: &Connection,
    circuit_id: i64,
    circuit: &NewCircuit,
) -> Result<Option<Circuit>> {
    let tasks_json = Task::encode_list(&circuit.tasks).context("failed to encode tasks")?;
    let rows_affected = conn.execute(
        "UPDATE circuits
         SET name = ?1,
             description = ?2,
             tasks_json = ?3
         WHERE id = ?4",
        params![circuit.name, circuit.description, tasks_json, circuit_id],
    )?;

    if rows_affected == 0 {
        return Ok(None);
    }
    find_circuit(conn, circuit_id)
}

pub fn delete_circuit(conn: &Connection, circuit_id: i64) -> Result<bool> {
    let rows_affected = conn.execute("DELETE FROM circuits WHERE id = ?1", params![circuit_id])?;
    Ok(rows_affected > 0)
}

impl Database {
    pub async fn get_circuit(&self, circuit_id: i64) -> Result<Circuit> {
        self.execute(move |conn| require_circuit(conn, circuit_id))
            .await
    }

    pub async fn create_circuit(&self, circuit: NewCircuit) -> Result<Circuit> {
        let created = self
            .execute(move |conn| insert_circuit(conn, &circuit, Utc::now()))
            .await?;
        crate::log_info!("Created circuit {} ({} tasks)", created.id, created.task_count());
        Ok(created)
    }

    pub async fn update_circuit(&self, circuit_id: i64, circuit: NewCircuit) -> Result<Circuit> {
        let updated = self
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let updated = replace_circuit(&tx, circuit_id, &circuit)?
                    .ok_or_else(ServiceError::circuit_not_found)?;
                tx.commit()?;
                Ok(updated)
            })
            .await?;
        crate::log_info!("Updated circuit {} ({} tasks)", updated.id, updated.task_count());
        Ok(updated)
    }

    /// Delete a circuit and its live session. Run history is kept.
    pub async fn delete_circuit(&self, circuit_id: i64) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            // run_sessions cascades on the foreign key; delete explicitly so the
            // outcome does not depend on the pragma being enabled.
            tx.execute(
                "DELETE FROM run_sessions WHERE circuit_id = ?1",
                params![circuit_id],
            )?;
            if !delete_circuit(&tx, circuit_id)? {
                return Err(ServiceError::circuit_not_found().into());
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        crate::log_info!("Deleted circuit {}", circuit_id);
        Ok(())
    }
}
