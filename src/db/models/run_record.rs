//! Immutable history of finished runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome vocabulary stored in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Skipped,
    NotDone,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Skipped => "skipped",
            TaskOutcome::NotDone => "not_done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(TaskOutcome::Completed),
            "skipped" => Some(TaskOutcome::Skipped),
            "not_done" => Some(TaskOutcome::NotDone),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecordTask {
    pub index: usize,
    pub name: String,
    pub description: String,
    pub duration: u64,
    pub status: TaskOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub circuit_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_duration_seconds: u64,
    pub completed_duration_seconds: u64,
    /// Ordered by `index`.
    pub tasks: Vec<RunRecordTask>,
}

impl RunRecord {
    /// Share of scheduled time that was completed, in `[0, 1]`.
    pub fn completion_rate(&self) -> f64 {
        if self.total_duration_seconds == 0 {
            return 0.0;
        }
        let rate = self.completed_duration_seconds as f64 / self.total_duration_seconds as f64;
        rate.clamp(0.0, 1.0)
    }

    /// Completion rate as a percentage rounded to two decimals.
    pub fn completion_percentage(&self) -> f64 {
        (self.completion_rate() * 100.0 * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitRef {
    pub id: i64,
    /// `None` once the circuit has been deleted.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunView {
    pub id: i64,
    pub circuit: CircuitRef,
    pub circuit_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_duration_seconds: u64,
    pub completed_duration_seconds: u64,
    pub completion_rate: f64,
    pub completion_percentage: f64,
    pub tasks: Vec<RunRecordTask>,
}

impl RunView {
    pub fn new(record: RunRecord, circuit_name: Option<String>) -> Self {
        let completion_rate = record.completion_rate();
        let completion_percentage = record.completion_percentage();
        Self {
            id: record.id,
            circuit: CircuitRef {
                id: record.circuit_id,
                name: circuit_name,
            },
            circuit_id: record.circuit_id,
            started_at: record.started_at,
            ended_at: record.ended_at,
            total_duration_seconds: record.total_duration_seconds,
            completed_duration_seconds: record.completed_duration_seconds,
            completion_rate,
            completion_percentage,
            tasks: record.tasks,
        }
    }
}


/// A run ready to be inserted; totals are already computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRunRecord {
    pub circuit_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_duration_seconds: u64,
    pub completed_duration_seconds: u64,
    pub tasks: Vec<RunRecordTask>,
}
