//! The single path by which run history is written.
//!
//! Both a direct "record run" request and a finished session end up in
//! [`record_run_tx`], inside whatever transaction the caller already holds.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::Value;

use crate::{
    db::{
        models::{Circuit, NewRunRecord, RunRecord, RunRecordTask, RunView, TaskOutcome},
        repositories::{circuits::require_circuit, run_records::insert_run_record},
        Database,
    },
    error::ServiceError,
    log_info,
    payload::{self, field, strict_int},
    utils::time::parse_iso_timestamp,
};

const ENABLE_LOGS: bool = true;

/// Resolved outcomes keyed by task position. Positions without an entry are
/// recorded as not done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInput {
    pub outcomes: BTreeMap<usize, TaskOutcome>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

fn ensure_has_tasks(circuit: &Circuit) -> Result<(), ServiceError> {
    if circuit.tasks.is_empty() {
        return Err(ServiceError::validation("Circuit must have tasks to record a run."));
    }
    Ok(())
}

/// Parse a `{tasks: [{index, status}], started_at, ended_at}` payload.
/// A repeated index keeps the status of its last occurrence.
pub fn parse_run_payload(raw: &Value, task_count: usize) -> Result<RunInput, ServiceError> {
    let object = payload::as_object(raw, "Run")?;

    let items = field(object, "tasks")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::validation("Run payload must include a tasks array."))?;

    let mut outcomes = BTreeMap::new();
    for item in items {
        let entry = item
            .as_object()
            .ok_or_else(|| ServiceError::validation("Each task result must be an object."))?;

        let index = field(entry, "index")
            .and_then(strict_int)
            .filter(|index| *index >= 0)
            .ok_or_else(|| ServiceError::validation("Task index must be a non-negative integer."))?
            as u64;
        if index >= task_count as u64 {
            return Err(ServiceError::validation(
                "Task index is out of range for this circuit.",
            ));
        }

        let status = field(entry, "status")
            .and_then(Value::as_str)
            .and_then(TaskOutcome::parse)
            .ok_or_else(|| {
                ServiceError::validation(
                    "Task status must be one of completed, skipped, or not_done.",
                )
            })?;

        outcomes.insert(index as usize, status);
    }

    Ok(RunInput {
        outcomes,
        started_at: required_timestamp(object, "started_at")?,
        ended_at: required_timestamp(object, "ended_at")?,
    })
}

fn required_timestamp(
    object: &payload::Object,
    key: &str,
) -> Result<DateTime<Utc>, ServiceError> {
    match field(object, key) {
        None => Err(ServiceError::validation(format!("{key} is required."))),
        Some(Value::String(text)) => parse_iso_timestamp(text, key),
        Some(_) => Err(ServiceError::validation(format!(
            "{key} must be an ISO 8601 string."
        ))),
    }
}

/// Lay the outcomes over the circuit's tasks and total up durations.
pub fn build_record(circuit: &Circuit, input: &RunInput) -> Result<NewRunRecord, ServiceError> {
    ensure_has_tasks(circuit)?;
    if input.ended_at < input.started_at {
        return Err(ServiceError::validation("ended_at cannot be before started_at."));
    }

    let mut total_duration_seconds: u64 = 0;
    let mut completed_duration_seconds: u64 = 0;
    let tasks: Vec<RunRecordTask> = circuit
        .tasks
        .iter()
        .enumerate()
        .map(|(index, task)| {
            let status = input
                .outcomes
                .get(&index)
                .copied()
                .unwrap_or(TaskOutcome::NotDone);
            total_duration_seconds = total_duration_seconds.saturating_add(task.duration);
            if status == TaskOutcome::Completed {
                completed_duration_seconds = completed_duration_seconds.saturating_add(task.duration);
            }
            RunRecordTask {
                index,
                name: task.name.clone(),
                description: task.description.clone(),
                duration: task.duration,
                status,
            }
        })
        .collect();

    Ok(NewRunRecord {
        circuit_id: circuit.id,
        started_at: input.started_at,
        ended_at: input.ended_at,
        total_duration_seconds,
        completed_duration_seconds,
        tasks,
    })
}

/// Validate and insert one run with its task rows. Runs inside the caller's
/// transaction; nothing is committed here.
pub fn record_run_tx(conn: &Connection, circuit: &Circuit, input: &RunInput) -> Result<RunRecord> {
    let record = build_record(circuit, input)?;
    insert_run_record(conn, &record)
}

/// Records runs directly and lists run history.
#[derive(Clone)]
pub struct RunRecorder {
    db: Database,
}

impl RunRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn record_run(&self, circuit_id: i64, payload: Value) -> Result<RunView> {
        let (record, circuit_name) = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let circuit = require_circuit(&tx, circuit_id)?;
                ensure_has_tasks(&circuit)?;
                let input = parse_run_payload(&payload, circuit.task_count())?;
                let record = record_run_tx(&tx, &circuit, &input)?;
                tx.commit()?;
                Ok((record, circuit.name))
            })
            .await?;

        log_info!(
            "Recorded run {} for circuit {} ({}/{}s completed)",
            record.id,
            circuit_id,
            record.completed_duration_seconds,
            record.total_duration_seconds
        );
        Ok(RunView::new(record, Some(circuit_name)))
    }

    /// Newest first. Runs of deleted circuits keep their id with no name.
    pub async fn list_runs(&self) -> Result<Vec<RunView>> {
        let records = self.db.list_run_records().await?;
        Ok(records
            .into_iter()
            .map(|(record, circuit_name)| RunView::new(record, circuit_name))
            .collect())
    }
}
