//! Live, resumable state of one attempt at a circuit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Paused,
    InProgress,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Paused => "paused",
            SessionStatus::InProgress => "in_progress",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "paused" => Some(SessionStatus::Paused),
            "in_progress" => Some(SessionStatus::InProgress),
            _ => None,
        }
    }
}

/// Per-task progress while a run is live. `Pending` never reaches history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTaskStatus {
    Pending,
    Completed,
    Skipped,
    NotDone,
}

impl SessionTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionTaskStatus::Pending => "pending",
            SessionTaskStatus::Completed => "completed",
            SessionTaskStatus::Skipped => "skipped",
            SessionTaskStatus::NotDone => "not_done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SessionTaskStatus::Pending),
            "completed" => Some(SessionTaskStatus::Completed),
            "skipped" => Some(SessionTaskStatus::Skipped),
            "not_done" => Some(SessionTaskStatus::NotDone),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSession {
    pub id: i64,
    pub circuit_id: i64,
    pub status: SessionStatus,
    pub current_task_index: usize,
    pub remaining_seconds: u64,
    pub has_started: bool,
    pub running: bool,
    pub run_started_at: Option<DateTime<Utc>>,
    /// Start of the current running window; always `None` while paused.
    pub last_started_at: Option<DateTime<Utc>>,
    /// Seconds accumulated before `last_started_at`.
    pub elapsed_seconds_base: u64,
    /// `None` when the stored statuses could not be decoded.
    pub task_statuses: Option<Vec<SessionTaskStatus>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire form of a session, with `elapsed_seconds` derived at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub id: i64,
    pub status: SessionStatus,
    pub current_index: usize,
    pub remaining_seconds: u64,
    pub has_started: bool,
    pub running: bool,
    pub run_started_at: Option<DateTime<Utc>>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub elapsed_seconds_base: u64,
    pub task_statuses: Vec<SessionTaskStatus>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Validated and normalised session fields, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpdate {
    pub status: SessionStatus,
    pub current_task_index: usize,
    pub remaining_seconds: u64,
    pub has_started: bool,
    pub running: bool,
    pub run_started_at: Option<DateTime<Utc>>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds_base: u64,
    pub task_statuses: Vec<SessionTaskStatus>,
}
