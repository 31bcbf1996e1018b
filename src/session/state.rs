//! Pure session rules: payload validation, normalisation, derived elapsed time
//! and the mapping of live task statuses onto history outcomes.
//!
//! Nothing here touches storage or reads the clock; callers pass `now`.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    db::models::{RunSession, SessionStatus, SessionTaskStatus, SessionUpdate, SessionView, TaskOutcome},
    error::ServiceError,
    payload::{self, field, flag, non_negative_int, optional_str, strict_int},
    utils::time::parse_optional_iso_timestamp,
};

/// Elapsed run time as of `now`: the stored base, plus the current running
/// window while in progress. Sub-second remainders of the window are dropped.
pub fn elapsed_seconds_at(session: &RunSession, now: DateTime<Utc>) -> u64 {
    let base = session.elapsed_seconds_base;
    match (session.status, session.last_started_at) {
        (SessionStatus::InProgress, Some(last_started_at)) => {
            let window = (now - last_started_at).num_seconds();
            if window > 0 {
                base.saturating_add(window as u64)
            } else {
                base
            }
        }
        _ => base,
    }
}

pub fn view_at(session: &RunSession, now: DateTime<Utc>) -> SessionView {
    SessionView {
        id: session.id,
        status: session.status,
        current_index: session.current_task_index,
        remaining_seconds: session.remaining_seconds,
        has_started: session.has_started,
        running: session.running,
        run_started_at: session.run_started_at,
        last_started_at: session.last_started_at,
        elapsed_seconds: elapsed_seconds_at(session, now),
        elapsed_seconds_base: session.elapsed_seconds_base,
        task_statuses: session.task_statuses.clone().unwrap_or_default(),
        updated_at: session.updated_at,
        created_at: session.created_at,
    }
}

/// Validate a client-supplied `task_statuses` array against the circuit's task count.
/// Entries are trimmed and lower-cased before the vocabulary check.
pub fn parse_task_statuses(
    raw: Option<&Value>,
    expected_len: usize,
) -> Result<Vec<SessionTaskStatus>, ServiceError> {
    let items = raw
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::validation("task_statuses must be an array."))?;

    if items.len() != expected_len {
        return Err(ServiceError::validation(
            "task_statuses length must match the number of circuit tasks.",
        ));
    }

    items
        .iter()
        .map(|item| {
            let text = item
                .as_str()
                .ok_or_else(|| ServiceError::validation("Each task status must be a string."))?;
            SessionTaskStatus::parse(&text.trim().to_lowercase()).ok_or_else(|| {
                ServiceError::validation(
                    "Task status must be one of pending, completed, skipped, or not_done.",
                )
            })
        })
        .collect()
}

/// Turn an upsert payload into the fields to store.
///
/// Negative second counts are floored to 0. A paused session never keeps a
/// `last_started_at`; an in-progress one without it starts its window at `now`.
pub fn normalize_update(
    raw: &Value,
    task_count: usize,
    now: DateTime<Utc>,
) -> Result<SessionUpdate, ServiceError> {
    let object = payload::as_object(raw, "Session")?;

    let task_statuses = parse_task_statuses(field(object, "task_statuses"), task_count)?;

    let status = match field(object, "status") {
        None => SessionStatus::Paused,
        Some(value) => value
            .as_str()
            .and_then(SessionStatus::parse)
            .ok_or_else(|| ServiceError::validation("status must be either paused or in_progress."))?,
    };

    let current_index = match field(object, "current_index") {
        None => 0,
        Some(value) => strict_int(value)
            .filter(|index| *index >= 0)
            .ok_or_else(|| {
                ServiceError::validation("current_index must be a non-negative integer.")
            })? as u64,
    };
    if current_index > task_count as u64 {
        return Err(ServiceError::validation(
            "current_index cannot exceed the number of tasks.",
        ));
    }

    let remaining_seconds = non_negative_int(object, "remaining_seconds", 0)?;
    let elapsed_seconds_base = non_negative_int(object, "elapsed_seconds", 0)?;

    let run_started_at =
        parse_optional_iso_timestamp(optional_str(object, "run_started_at")?, "run_started_at")?;
    let last_started_at =
        parse_optional_iso_timestamp(optional_str(object, "last_started_at")?, "last_started_at")?;

    let last_started_at = match status {
        SessionStatus::Paused => None,
        SessionStatus::InProgress => Some(last_started_at.unwrap_or(now)),
    };

    Ok(SessionUpdate {
        status,
        current_task_index: (current_index as usize).min(task_count),
        remaining_seconds,
        has_started: flag(object, "has_started"),
        running: flag(object, "running"),
        run_started_at,
        last_started_at,
        elapsed_seconds_base,
        task_statuses,
    })
}

/// Parsed body of a finish request.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishRequest {
    pub task_statuses: Option<Value>,
    pub skip_incomplete: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl FinishRequest {
    /// `null` is accepted as an empty body.
    pub fn parse(raw: &Value) -> Result<Self, ServiceError> {
        if raw.is_null() {
            return Ok(Self {
                task_statuses: None,
                skip_incomplete: false,
                started_at: None,
                ended_at: None,
            });
        }
        let object = payload::as_object(raw, "Finish")?;

        Ok(Self {
            task_statuses: field(object, "task_statuses").cloned(),
            skip_incomplete: flag(object, "skip_incomplete"),
            started_at: parse_optional_iso_timestamp(optional_str(object, "started_at")?, "started_at")?,
            ended_at: parse_optional_iso_timestamp(optional_str(object, "ended_at")?, "ended_at")?,
        })
    }
}

/// Statuses to finish with: the request's own, else the stored session's.
/// `stored` is `None` without a session and `Some(None)` when the session's
/// statuses could not be decoded.
pub fn resolve_finish_statuses(
    requested: Option<&Value>,
    stored: Option<Option<&[SessionTaskStatus]>>,
    task_count: usize,
) -> Result<Vec<SessionTaskStatus>, ServiceError> {
    match (requested, stored) {
        (Some(raw), _) => parse_task_statuses(Some(raw), task_count),
        (None, Some(None)) => Err(ServiceError::validation("Stored task statuses are invalid.")),
        (None, Some(Some(stored))) => {
            if stored.len() != task_count {
                return Err(ServiceError::validation(
                    "task_statuses length must match the number of circuit tasks.",
                ));
            }
            Ok(stored.to_vec())
        }
        (None, None) => Err(ServiceError::validation(
            "task_statuses are required to finish this circuit.",
        )),
    }
}

/// History outcome for a live status. Anything short of completed is not done,
/// or skipped when the run is closed with `skip_incomplete`.
pub fn outcome_for(status: SessionTaskStatus, skip_incomplete: bool) -> TaskOutcome {
    match status {
        SessionTaskStatus::Completed => TaskOutcome::Completed,
        _ if skip_incomplete => TaskOutcome::Skipped,
        SessionTaskStatus::Skipped => TaskOutcome::Skipped,
        SessionTaskStatus::Pending | SessionTaskStatus::NotDone => TaskOutcome::NotDone,
    }
}
