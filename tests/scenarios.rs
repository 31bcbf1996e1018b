use chrono::{Duration, TimeZone, Utc};
use circuits_lib::{
    catalog::commands as catalog_commands,
    db::{
        models::{NewCircuit, SessionTaskStatus, TaskOutcome},
        repositories::circuits::insert_circuit,
        Database,
    },
    history::commands as history_commands,
    session::commands as session_commands,
    AppState,
};
use serde_json::{json, Value};

fn app() -> AppState {
    AppState::new(Database::open_in_memory().expect("in-memory database"))
}

fn morning_flow() -> Value {
    json!({
        "name": "Morning Flow",
        "description": "A gentle warm-up routine.",
        "tasks": [
            {"name": "Stretch", "description": "Full body stretch", "duration": 180},
            {"name": "Meditate", "description": "Mindful breathing", "duration": 300},
        ],
    })
}

#[tokio::test]
async fn recording_a_run_totals_completed_time() {
    let app = app();
    let circuit = catalog_commands::create_circuit(&app, morning_flow()).await.unwrap();

    let run = history_commands::record_run(
        &app,
        circuit.id,
        json!({
            "tasks": [
                {"index": 0, "status": "completed"},
                {"index": 1, "status": "not_done"},
            ],
            "started_at": "2024-05-01T06:00:00Z",
            "ended_at": "2024-05-01T06:05:00Z",
        }),
    )
    .await
    .unwrap();

    assert_eq!(run.total_duration_seconds, 480);
    assert_eq!(run.completed_duration_seconds, 180);
    assert_eq!(run.completion_rate, 0.375);
    assert_eq!(run.completion_percentage, 37.5);
    assert_eq!(run.circuit.name.as_deref(), Some("Morning Flow"));

    let runs = history_commands::list_runs(&app).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].tasks[0].status, TaskOutcome::Completed);
}

#[tokio::test]
async fn resumed_session_reports_elapsed_time_since_last_start() {
    let app = app();
    let circuit = catalog_commands::create_circuit(&app, morning_flow()).await.unwrap();
    let started = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();

    let saved = app
        .sessions
        .upsert_session_at(
            circuit.id,
            json!({
                "status": "in_progress",
                "current_index": 1,
                "remaining_seconds": 300,
                "has_started": true,
                "running": true,
                "elapsed_seconds": 180,
                "task_statuses": ["completed", "pending"],
            }),
            started,
        )
        .await
        .unwrap();
    assert_eq!(saved.last_started_at, Some(started));
    assert_eq!(saved.elapsed_seconds, 180);

    let view = app
        .sessions
        .get_session_at(circuit.id, started + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(view.elapsed_seconds, 190);
    assert_eq!(view.elapsed_seconds_base, 180);

    let listed = catalog_commands::list_circuits(&app).await.unwrap();
    assert!(listed[0].active_run.is_some());
}

#[tokio::test]
async fn finishing_a_session_records_the_run_and_closes_it() {
    let app = app();
    let circuit = catalog_commands::create_circuit(&app, morning_flow()).await.unwrap();

    session_commands::upsert_session(
        &app,
        circuit.id,
        json!({
            "status": "paused",
            "current_index": 1,
            "has_started": true,
            "run_started_at": "2024-05-01T06:00:00Z",
            "task_statuses": ["completed", "pending"],
        }),
    )
    .await
    .unwrap();

    let run = session_commands::finish_session(&app, circuit.id, Value::Null)
        .await
        .unwrap();
    let statuses: Vec<TaskOutcome> = run.tasks.iter().map(|task| task.status).collect();
    assert_eq!(statuses, vec![TaskOutcome::Completed, TaskOutcome::NotDone]);
    assert_eq!(run.started_at, Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap());

    let err = session_commands::get_session(&app, circuit.id).await.unwrap_err();
    assert_eq!(err.status, 404);
    assert!(err.is_not_found());
}

#[tokio::test]
async fn circuit_without_tasks_cannot_record_a_run() {
    let app = app();
    let empty = app
        .db
        .execute(|conn| {
            let new = NewCircuit {
                name: "Empty".into(),
                description: String::new(),
                tasks: Vec::new(),
            };
            insert_circuit(conn, &new, Utc::now())
        })
        .await
        .unwrap();

    let err = history_commands::record_run(
        &app,
        empty.id,
        json!({
            "tasks": [],
            "started_at": "2024-05-01T06:00:00Z",
            "ended_at": "2024-05-01T06:05:00Z",
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 422);

    let err = session_commands::finish_session(&app, empty.id, Value::Null)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(history_commands::list_runs(&app).await.unwrap().is_empty());
}

#[tokio::test]
async fn session_index_is_bounded_by_task_count() {
    let app = app();
    let circuit = catalog_commands::create_circuit(&app, morning_flow()).await.unwrap();

    let err = session_commands::upsert_session(
        &app,
        circuit.id,
        json!({"current_index": 3, "task_statuses": ["pending", "pending"]}),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 422);
    assert_eq!(err.message, "current_index cannot exceed the number of tasks.");

    let view = session_commands::upsert_session(
        &app,
        circuit.id,
        json!({"current_index": 2, "task_statuses": ["completed", "completed"]}),
    )
    .await
    .unwrap();
    assert_eq!(view.current_index, 2);
    assert_eq!(
        view.task_statuses,
        vec![SessionTaskStatus::Completed, SessionTaskStatus::Completed]
    );
}

#[tokio::test]
async fn deleting_a_circuit_keeps_its_history() {
    let app = app();
    let circuit = catalog_commands::create_circuit(&app, morning_flow()).await.unwrap();
    session_commands::upsert_session(&app, circuit.id, json!({"task_statuses": ["completed", "skipped"]}))
        .await
        .unwrap();
    session_commands::finish_session(&app, circuit.id, json!({"skip_incomplete": true}))
        .await
        .unwrap();

    catalog_commands::delete_circuit(&app, circuit.id).await.unwrap();

    let err = catalog_commands::get_circuit(&app, circuit.id).await.unwrap_err();
    assert!(err.is_not_found());
    let runs = history_commands::list_runs(&app).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].circuit.id, circuit.id);
    assert_eq!(runs[0].circuit.name, None);
    assert_eq!(runs[0].tasks[1].status, TaskOutcome::Skipped);
}

#[tokio::test]
async fn out_of_range_years_are_rejected_and_history_stays_readable() {
    let app = app();
    let circuit = catalog_commands::create_circuit(&app, morning_flow()).await.unwrap();

    let err = history_commands::record_run(
        &app,
        circuit.id,
        json!({
            "tasks": [{"index": 0, "status": "completed"}],
            "started_at": "+10000-01-01T00:00:00",
            "ended_at": "+10000-01-01T00:00:10",
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 422);
    assert_eq!(err.message, "started_at must be an ISO 8601 string.");

    let err = session_commands::upsert_session(
        &app,
        circuit.id,
        json!({
            "run_started_at": "+10000-01-01T00:00:00",
            "task_statuses": ["pending", "pending"],
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 422);
    assert_eq!(err.message, "run_started_at must be an ISO 8601 string.");

    assert!(history_commands::list_runs(&app).await.unwrap().is_empty());
    assert!(session_commands::get_session(&app, circuit.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn finishing_an_unknown_circuit_is_not_found_whatever_the_body() {
    let app = app();
    for payload in [json!({"started_at": "noon"}), json!([1])] {
        let err = session_commands::finish_session(&app, 999, payload).await.unwrap_err();
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "Circuit not found");
    }
}
