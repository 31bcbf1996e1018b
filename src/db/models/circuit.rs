//! Circuit definitions: a named, ordered list of timed tasks.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::run_session::SessionView;
use crate::payload::coerce_int;

/// One step of a circuit. `duration` is in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub duration: u64,
}

impl Task {
    /// Decode a stored task list without failing: unreadable JSON yields no tasks,
    /// missing text fields become empty and durations are coerced and floored at 0.
    pub fn decode_list(tasks_json: &str) -> Vec<Task> {
        let raw: Vec<Value> = match serde_json::from_str::<Value>(tasks_json) {
            Ok(Value::Array(items)) => items,
            Ok(_) => return Vec::new(),
            Err(err) => {
                warn!("Ignoring unreadable task list: {err}");
                return Vec::new();
            }
        };

        raw.iter()
            .map(|item| {
                let text = |key: &str| {
                    item.get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                let duration = item
                    .get("duration")
                    .and_then(coerce_int)
                    .unwrap_or(0)
                    .max(0) as u64;
                Task {
                    name: text("name"),
                    description: text("description"),
                    duration,
                }
            })
            .collect()
    }

    pub fn encode_list(tasks: &[Task]) -> serde_json::Result<String> {
        serde_json::to_string(tasks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
}

impl Circuit {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Validated content for creating or replacing a circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCircuit {
    pub name: String,
    pub description: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitView {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    pub active_run: Option<SessionView>,
}

impl CircuitView {
    pub fn new(circuit: Circuit, active_run: Option<SessionView>) -> Self {
        Self {
            id: circuit.id,
            name: circuit.name,
            description: circuit.description,
            created_at: circuit.created_at,
            tasks: circuit.tasks,
            active_run,
        }
    }
}
