use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    helpers::{
        format_datetime, format_optional_datetime, index_to_i64, parse_datetime,
        parse_optional_datetime, to_i64, to_index, to_u64,
    },
    models::{RunSession, SessionStatus, SessionTaskStatus, SessionUpdate},
};

const SESSION_COLUMNS: &str = "id, circuit_id, status, current_task_index, remaining_seconds,
     has_started, running, run_started_at, last_started_at, elapsed_seconds,
     task_statuses_json, created_at, updated_at";

fn decode_task_statuses(raw: &str, session_id: i64) -> Option<Vec<SessionTaskStatus>> {
    serde_json::from_str(raw)
        .map_err(|err| warn!("Session {session_id} has unreadable task statuses: {err}"))
        .ok()
}

fn row_to_session(row: &Row) -> Result<RunSession> {
    let id: i64 = row.get("id")?;
    let status: String = row.get("status")?;
    let current_task_index: i64 = row.get("current_task_index")?;
    let remaining_seconds: i64 = row.get("remaining_seconds")?;
    let elapsed_seconds: i64 = row.get("elapsed_seconds")?;
    let run_started_at: Option<String> = row.get("run_started_at")?;
    let last_started_at: Option<String> = row.get("last_started_at")?;
    let task_statuses_json: String = row.get("task_statuses_json")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(RunSession {
        id,
        circuit_id: row.get("circuit_id")?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown session status {status}"))?,
        current_task_index: to_index(current_task_index, "current_task_index")?,
        remaining_seconds: to_u64(remaining_seconds, "remaining_seconds")?,
        has_started: row.get("has_started")?,
        running: row.get("running")?,
        run_started_at: parse_optional_datetime(run_started_at, "run_started_at")?,
        last_started_at: parse_optional_datetime(last_started_at, "last_started_at")?,
        elapsed_seconds_base: to_u64(elapsed_seconds, "elapsed_seconds")?,
        task_statuses: decode_task_statuses(&task_statuses_json, id),
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

pub fn find_session(conn: &Connection, circuit_id: i64) -> Result<Option<RunSession>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SESSION_COLUMNS}
         FROM run_sessions
         WHERE circuit_id = ?1"
    ))?;

    stmt.query_row(params![circuit_id], |row| Ok(row_to_session(row)))
        .optional()?
        .transpose()
}

/// All live sessions keyed by circuit id.
pub fn sessions_by_circuit(conn: &Connection) -> Result<HashMap<i64, RunSession>> {
    let mut stmt = conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM run_sessions"))?;

    let mut rows = stmt.query([])?;
    let mut sessions = HashMap::new();
    while let Some(row) = rows.next()? {
        let session = row_to_session(row)?;
        sessions.insert(session.circuit_id, session);
    }

    Ok(sessions)
}

/// Create the circuit's session or overwrite every field of the existing one.
/// The unique index on `circuit_id` keeps this to one row per circuit.
pub fn upsert_session(
    conn: &Connection,
    circuit_id: i64,
    update: &SessionUpdate,
    now: DateTime<Utc>,
) -> Result<RunSession> {
    let task_statuses_json =
        serde_json::to_string(&update.task_statuses).context("failed to encode task statuses")?;
    let now = format_datetime(&now);

    conn.execute(
        "INSERT INTO run_sessions (
            circuit_id, status, current_task_index, remaining_seconds, has_started, running,
            run_started_at, last_started_at, elapsed_seconds, task_statuses_json,
            created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
         ON CONFLICT(circuit_id) DO UPDATE SET
            status = excluded.status,
            current_task_index = excluded.current_task_index,
            remaining_seconds = excluded.remaining_seconds,
            has_started = excluded.has_started,
            running = excluded.running,
            run_started_at = excluded.run_started_at,
            last_started_at = excluded.last_started_at,
            elapsed_seconds = excluded.elapsed_seconds,
            task_statuses_json = excluded.task_statuses_json,
            updated_at = excluded.updated_at",
        params![
            circuit_id,
            update.status.as_str(),
            index_to_i64(update.current_task_index)?,
            to_i64(update.remaining_seconds)?,
            update.has_started,
            update.running,
            format_optional_datetime(update.run_started_at.as_ref()),
            format_optional_datetime(update.last_started_at.as_ref()),
            to_i64(update.elapsed_seconds_base)?,
            task_statuses_json,
            now,
        ],
    )
    .context("failed to upsert run session")?;

    find_session(conn, circuit_id)?.ok_or_else(|| anyhow!("Session not found after upsert"))
}

/// Returns whether a row was removed.
pub fn delete_session(conn: &Connection, circuit_id: i64) -> Result<bool> {
    let rows_affected = conn.execute(
        "DELETE FROM run_sessions WHERE circuit_id = ?1",
        params![circuit_id],
    )?;
    Ok(rows_affected > 0)
}
