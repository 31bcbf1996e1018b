use std::collections::HashMap;

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, index_to_i64, parse_datetime, to_i64, to_index, to_u64},
    models::{NewRunRecord, RunRecord, RunRecordTask, TaskOutcome},
};

fn row_to_task(row: &Row) -> Result<(i64, RunRecordTask)> {
    let task_index: i64 = row.get("task_index")?;
    let duration: i64 = row.get("duration")?;
    let status: String = row.get("status")?;

    let task = RunRecordTask {
        index: to_index(task_index, "task_index")?,
        name: row.get("name")?,
        description: row.get("description")?,
        duration: to_u64(duration, "duration")?,
        status: TaskOutcome::parse(&status)
            .ok_or_else(|| anyhow!("unknown task status {status}"))?,
    };
    Ok((row.get("run_id")?, task))
}

/// Record plus the name of its circuit, if the circuit still exists.
fn row_to_record(row: &Row) -> Result<(RunRecord, Option<String>)> {
    let started_at: String = row.get("started_at")?;
    let ended_at: String = row.get("ended_at")?;
    let total: i64 = row.get("total_duration_seconds")?;
    let completed: i64 = row.get("completed_duration_seconds")?;

    let record = RunRecord {
        id: row.get("id")?,
        circuit_id: row.get("circuit_id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_datetime(&ended_at, "ended_at")?,
        total_duration_seconds: to_u64(total, "total_duration_seconds")?,
        completed_duration_seconds: to_u64(completed, "completed_duration_seconds")?,
        tasks: Vec::new(),
    };
    Ok((record, row.get("circuit_name")?))
}

/// Insert a run and one task row per circuit task. Callers own the transaction.
pub fn insert_run_record(conn: &Connection, record: &NewRunRecord) -> Result<RunRecord> {
    conn.execute(
        "INSERT INTO run_records (
            circuit_id, started_at, ended_at, total_duration_seconds, completed_duration_seconds
         ) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.circuit_id,
            format_datetime(&record.started_at),
            format_datetime(&record.ended_at),
            to_i64(record.total_duration_seconds)?,
            to_i64(record.completed_duration_seconds)?,
        ],
    )?;
    let run_id = conn.last_insert_rowid();

    let mut stmt = conn.prepare(
        "INSERT INTO run_record_tasks (run_id, task_index, name, description, duration, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for task in &record.tasks {
        stmt.execute(params![
            run_id,
            index_to_i64(task.index)?,
            task.name,
            task.description,
            to_i64(task.duration)?,
            task.status.as_str(),
        ])?;
    }

    Ok(RunRecord {
        id: run_id,
        circuit_id: record.circuit_id,
        started_at: record.started_at,
        ended_at: record.ended_at,
        total_duration_seconds: record.total_duration_seconds,
        completed_duration_seconds: record.completed_duration_seconds,
        tasks: record.tasks.clone(),
    })
}

impl Database {
    /// Every run, newest `started_at` first, with tasks ordered by index.
    pub async fn list_run_records(&self) -> Result<Vec<(RunRecord, Option<String>)>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.circuit_id, r.started_at, r.ended_at,
                        r.total_duration_seconds, r.completed_duration_seconds,
                        c.name AS circuit_name
                 FROM run_records r
                 LEFT JOIN circuits c ON c.id = r.circuit_id
                 ORDER BY r.started_at DESC, r.id DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }

            let mut stmt = conn.prepare(
                "SELECT run_id, task_index, name, description, duration, status
                 FROM run_record_tasks
                 ORDER BY run_id, task_index",
            )?;
            let mut rows = stmt.query([])?;
            let mut tasks_by_run: HashMap<i64, Vec<RunRecordTask>> = HashMap::new();
            while let Some(row) = rows.next()? {
                let (run_id, task) = row_to_task(row)?;
                tasks_by_run.entry(run_id).or_default().push(task);
            }

            for (record, _) in &mut records {
                record.tasks = tasks_by_run.remove(&record.id).unwrap_or_default();
            }

            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn new_record(circuit_id: i64, hour: u32) -> NewRunRecord {
        let started_at = Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap();
        NewRunRecord {
            circuit_id,
            started_at,
            ended_at: started_at + chrono::Duration::minutes(8),
            total_duration_seconds: 480,
            completed_duration_seconds: 180,
            tasks: vec![
                RunRecordTask {
                    index: 1,
                    name: "Meditate".into(),
                    description: String::new(),
                    duration: 300,
                    status: TaskOutcome::NotDone,
                },
                RunRecordTask {
                    index: 0,
                    name: "Stretch".into(),
                    description: String::new(),
                    duration: 180,
                    status: TaskOutcome::Completed,
                },
            ],
        }
    }

    #[tokio::test]
    async fn listing_orders_runs_and_tasks() {
        let db = Database::open_in_memory().unwrap();
        db.execute(|conn| {
            insert_run_record(conn, &new_record(7, 8))?;
            insert_run_record(conn, &new_record(7, 10))?;
            Ok(())
        })
        .await
        .unwrap();

        let runs = db.list_run_records().await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].0.started_at > runs[1].0.started_at);

        let indices: Vec<usize> = runs[0].0.tasks.iter().map(|task| task.index).collect();
        assert_eq!(indices, vec![0, 1]);
        // Circuit 7 was never created.
        assert_eq!(runs[0].1, None);
    }
}
