use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    db::{
        models::{RunView, SessionView},
        repositories::{circuits::require_circuit, run_sessions},
        Database,
    },
    error::ServiceError,
    history::recorder::{self, RunInput},
    log_debug, log_info,
};

use super::state::{self, FinishRequest};

const ENABLE_LOGS: bool = true;

/// Owns the lifecycle of live run sessions: at most one per circuit, created
/// on first upsert and removed when finished or abandoned.
///
/// Elapsed time is never ticked. Each read derives it from the stored base and
/// `last_started_at`, so a reloaded client simply reads the session again.
#[derive(Clone)]
pub struct SessionEngine {
    db: Database,
}

impl SessionEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_session(&self, circuit_id: i64) -> Result<SessionView> {
        self.get_session_at(circuit_id, Utc::now()).await
    }

    pub async fn get_session_at(&self, circuit_id: i64, now: DateTime<Utc>) -> Result<SessionView> {
        let session = self
            .db
            .execute(move |conn| {
                require_circuit(conn, circuit_id)?;
                run_sessions::find_session(conn, circuit_id)?
                    .ok_or_else(|| ServiceError::not_found("Circuit run session not found").into())
            })
            .await?;

        Ok(state::view_at(&session, now))
    }

    pub async fn upsert_session(&self, circuit_id: i64, payload: Value) -> Result<SessionView> {
        self.upsert_session_at(circuit_id, payload, Utc::now()).await
    }

    /// Validate `payload` against the circuit's current task count and store it
    /// as the circuit's session. Lookup, validation and write share one
    /// transaction; any error leaves the previous session untouched.
    pub async fn upsert_session_at(
        &self,
        circuit_id: i64,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<SessionView> {
        let session = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let circuit = require_circuit(&tx, circuit_id)?;
                let update = state::normalize_update(&payload, circuit.task_count(), now)?;
                let session = run_sessions::upsert_session(&tx, circuit_id, &update, now)?;
                tx.commit()?;
                Ok(session)
            })
            .await?;

        log_debug!(
            "Saved session for circuit {}: {} at task {}",
            circuit_id,
            session.status.as_str(),
            session.current_task_index
        );
        Ok(state::view_at(&session, now))
    }

    /// Abandon the circuit's session. Succeeds whether or not one existed;
    /// the returned flag tells which.
    pub async fn delete_session(&self, circuit_id: i64) -> Result<bool> {
        let removed = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                require_circuit(&tx, circuit_id)?;
                let removed = run_sessions::delete_session(&tx, circuit_id)?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;

        if removed {
            log_info!("Abandoned session for circuit {}", circuit_id);
        }
        Ok(removed)
    }

    pub async fn finish_session(&self, circuit_id: i64, payload: Value) -> Result<RunView> {
        self.finish_session_at(circuit_id, payload, Utc::now()).await
    }

    /// Turn the circuit's session into a run record and drop the session.
    ///
    /// Statuses come from the payload or, failing that, the stored session.
    /// `started_at` falls back to the session's `run_started_at`, then `now`;
    /// `ended_at` falls back to `now`. Recording and deleting commit together.
    pub async fn finish_session_at(
        &self,
        circuit_id: i64,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<RunView> {
        let (record, circuit_name, had_session) = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let circuit = require_circuit(&tx, circuit_id)?;
                let request = FinishRequest::parse(&payload)?;
                if circuit.tasks.is_empty() {
                    return Err(ServiceError::validation(
                        "Circuit must include tasks before recording a run.",
                    )
                    .into());
                }

                let session = run_sessions::find_session(&tx, circuit_id)?;
                let statuses = state::resolve_finish_statuses(
                    request.task_statuses.as_ref(),
                    session.as_ref().map(|session| session.task_statuses.as_deref()),
                    circuit.task_count(),
                )?;

                let input = RunInput {
                    outcomes: statuses
                        .into_iter()
                        .enumerate()
                        .map(|(index, status)| {
                            (index, state::outcome_for(status, request.skip_incomplete))
                        })
                        .collect(),
                    started_at: request
                        .started_at
                        .or_else(|| session.as_ref().and_then(|session| session.run_started_at))
                        .unwrap_or(now),
                    ended_at: request.ended_at.unwrap_or(now),
                };

                let record = recorder::record_run_tx(&tx, &circuit, &input)?;
                let had_session = run_sessions::delete_session(&tx, circuit_id)?;
                tx.commit()?;
                Ok((record, circuit.name, had_session))
            })
            .await?;

        log_info!(
            "Finished circuit {} as run {} ({}/{}s completed, session {})",
            circuit_id,
            record.id,
            record.completed_duration_seconds,
            record.total_duration_seconds,
            if had_session { "closed" } else { "absent" }
        );
        Ok(RunView::new(record, Some(circuit_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewCircuit, SessionStatus, SessionTaskStatus, Task, TaskOutcome};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 7, 0, 0).unwrap()
    }

    async fn setup() -> (Database, SessionEngine, i64) {
        let db = Database::open_in_memory().unwrap();
        let circuit = db
            .create_circuit(NewCircuit {
                name: "Morning Flow".into(),
                description: String::new(),
                tasks: vec![
                    Task {
                        name: "Stretch".into(),
                        description: "Full body stretch".into(),
                        duration: 180,
                    },
                    Task {
                        name: "Meditate".into(),
                        description: "Mindful breathing".into(),
                        duration: 300,
                    },
                ],
            })
            .await
            .unwrap();
        let engine = SessionEngine::new(db.clone());
        (db, engine, circuit.id)
    }

    fn is_validation(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<ServiceError>(), Some(ServiceError::Validation(_)))
    }

    fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<ServiceError>(), Some(ServiceError::NotFound(_)))
    }

    #[tokio::test]
    async fn resumed_session_derives_elapsed_time_on_read() {
        let (_db, engine, circuit_id) = setup().await;
        let payload = json!({
            "status": "in_progress",
            "current_index": 1,
            "elapsed_seconds": 180,
            "task_statuses": ["completed", "pending"],
        });

        let saved = engine.upsert_session_at(circuit_id, payload, t0()).await.unwrap();
        assert_eq!(saved.last_started_at, Some(t0()));
        assert_eq!(saved.elapsed_seconds, 180);

        let later = engine
            .get_session_at(circuit_id, t0() + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(later.elapsed_seconds, 190);
        assert_eq!(later.elapsed_seconds_base, 180);
        assert_eq!(later.current_index, 1);
    }

    #[tokio::test]
    async fn pausing_freezes_elapsed_time() {
        let (_db, engine, circuit_id) = setup().await;
        let payload = json!({
            "status": "paused",
            "elapsed_seconds": 75,
            "last_started_at": "2024-04-02T06:59:00Z",
            "task_statuses": ["pending", "pending"],
        });

        let saved = engine.upsert_session_at(circuit_id, payload, t0()).await.unwrap();
        assert_eq!(saved.status, SessionStatus::Paused);
        assert_eq!(saved.last_started_at, None);

        let later = engine
            .get_session_at(circuit_id, t0() + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(later.elapsed_seconds, 75);
    }

    #[tokio::test]
    async fn rejected_upsert_keeps_previous_session() {
        let (_db, engine, circuit_id) = setup().await;
        let valid = json!({"status": "paused", "current_index": 1, "task_statuses": ["completed", "pending"]});
        engine.upsert_session_at(circuit_id, valid, t0()).await.unwrap();

        let invalid = json!({"status": "paused", "current_index": 3, "task_statuses": ["completed", "pending"]});
        let err = engine.upsert_session_at(circuit_id, invalid, t0()).await.unwrap_err();
        assert!(is_validation(&err));

        let current = engine.get_session_at(circuit_id, t0()).await.unwrap();
        assert_eq!(current.current_index, 1);
    }

    #[tokio::test]
    async fn missing_circuit_or_session_is_not_found() {
        let (_db, engine, circuit_id) = setup().await;

        let err = engine.get_session_at(circuit_id, t0()).await.unwrap_err();
        assert_eq!(err.to_string(), "Circuit run session not found");
        let err = engine.get_session_at(404, t0()).await.unwrap_err();
        assert!(is_not_found(&err));
        let err = engine
            .upsert_session_at(404, json!({"task_statuses": []}), t0())
            .await
            .unwrap_err();
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_db, engine, circuit_id) = setup().await;
        engine
            .upsert_session_at(circuit_id, json!({"task_statuses": ["pending", "pending"]}), t0())
            .await
            .unwrap();

        assert!(engine.delete_session(circuit_id).await.unwrap());
        assert!(!engine.delete_session(circuit_id).await.unwrap());
    }

    #[tokio::test]
    async fn finish_uses_stored_statuses_and_closes_session() {
        let (db, engine, circuit_id) = setup().await;
        let started = "2024-04-02T06:50:00Z";
        engine
            .upsert_session_at(
                circuit_id,
                json!({
                    "status": "in_progress",
                    "current_index": 1,
                    "run_started_at": started,
                    "task_statuses": ["completed", "pending"],
                }),
                t0(),
            )
            .await
            .unwrap();

        let run = engine
            .finish_session_at(circuit_id, json!({"skip_incomplete": false}), t0())
            .await
            .unwrap();

        let outcomes: Vec<TaskOutcome> = run.tasks.iter().map(|task| task.status).collect();
        assert_eq!(outcomes, vec![TaskOutcome::Completed, TaskOutcome::NotDone]);
        assert_eq!(run.started_at, t0() - Duration::minutes(10));
        assert_eq!(run.ended_at, t0());
        assert_eq!(run.circuit.name.as_deref(), Some("Morning Flow"));

        let err = engine.get_session_at(circuit_id, t0()).await.unwrap_err();
        assert!(is_not_found(&err));
        assert_eq!(db.list_run_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skip_incomplete_marks_everything_else_skipped() {
        let (_db, engine, circuit_id) = setup().await;
        let run = engine
            .finish_session_at(
                circuit_id,
                json!({"task_statuses": ["not_done", "pending"], "skip_incomplete": true}),
                t0(),
            )
            .await
            .unwrap();

        assert!(run.tasks.iter().all(|task| task.status == TaskOutcome::Skipped));
        assert_eq!(run.completed_duration_seconds, 0);
        assert_eq!(run.completion_rate, 0.0);
    }

    #[tokio::test]
    async fn failed_finish_leaves_session_and_history_alone() {
        let (db, engine, circuit_id) = setup().await;
        engine
            .upsert_session_at(
                circuit_id,
                json!({"status": "paused", "task_statuses": ["completed", "pending"]}),
                t0(),
            )
            .await
            .unwrap();

        let err = engine
            .finish_session_at(
                circuit_id,
                json!({"started_at": "2024-04-02T08:00:00Z", "ended_at": "2024-04-02T07:00:00Z"}),
                t0(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ended_at cannot be before started_at.");

        let session = engine.get_session_at(circuit_id, t0()).await.unwrap();
        assert_eq!(
            session.task_statuses,
            vec![SessionTaskStatus::Completed, SessionTaskStatus::Pending]
        );
        assert!(db.list_run_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn finish_without_any_statuses_is_rejected() {
        let (_db, engine, circuit_id) = setup().await;
        let err = engine
            .finish_session_at(circuit_id, json!({}), t0())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "task_statuses are required to finish this circuit.");
    }

    #[tokio::test]
    async fn finishing_a_missing_circuit_is_not_found_before_payload_checks() {
        let (_db, engine, _circuit_id) = setup().await;
        for payload in [json!({"started_at": "noon"}), json!([1])] {
            let err = engine.finish_session_at(999, payload, t0()).await.unwrap_err();
            assert!(is_not_found(&err));
            assert_eq!(err.to_string(), "Circuit not found");
        }
    }

    #[tokio::test]
    async fn unreadable_stored_statuses_block_the_fallback() {
        let (db, engine, circuit_id) = setup().await;
        engine
            .upsert_session_at(
                circuit_id,
                json!({"status": "paused", "task_statuses": ["completed", "pending"]}),
                t0(),
            )
            .await
            .unwrap();
        db.execute(|conn| {
            conn.execute("UPDATE run_sessions SET task_statuses_json = 'oops'", [])?;
            Ok(())
        })
        .await
        .unwrap();

        let err = engine
            .finish_session_at(circuit_id, json!({}), t0())
            .await
            .unwrap_err();
        assert!(is_validation(&err));
        assert_eq!(err.to_string(), "Stored task statuses are invalid.");

        let view = engine.get_session_at(circuit_id, t0()).await.unwrap();
        assert!(view.task_statuses.is_empty());

        let run = engine
            .finish_session_at(circuit_id, json!({"task_statuses": ["completed", "skipped"]}), t0())
            .await
            .unwrap();
        assert_eq!(run.completed_duration_seconds, 180);
    }
}
