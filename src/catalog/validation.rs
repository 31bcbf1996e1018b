//! Circuit payload validation.

use serde_json::Value;

use crate::{
    db::models::{NewCircuit, Task},
    error::ServiceError,
    payload::{self, coerce_int, field},
};

fn optional_text(object: &payload::Object, key: &str, message: &str) -> Result<String, ServiceError> {
    match field(object, key) {
        None => Ok(String::new()),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(ServiceError::validation(message)),
    }
}

fn required_name(object: &payload::Object, message: &str) -> Result<String, ServiceError> {
    match field(object, "name") {
        Some(Value::String(text)) if !text.is_empty() => Ok(text.clone()),
        _ => Err(ServiceError::validation(message)),
    }
}

fn validate_task(raw: &Value) -> Result<Task, ServiceError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ServiceError::validation("Each task must be an object."))?;

    let name = required_name(object, "Task name is required.")?;
    let description = optional_text(object, "description", "Task description must be a string.")?;
    let duration = field(object, "duration")
        .and_then(coerce_int)
        .ok_or_else(|| ServiceError::validation("Task duration must be an integer."))?;
    if duration <= 0 {
        return Err(ServiceError::validation(
            "Task duration must be greater than zero.",
        ));
    }

    Ok(Task {
        name,
        description,
        duration: duration as u64,
    })
}

/// Check a create/update payload: non-empty name, string description
/// (default empty) and a non-empty task list of positive durations.
pub fn validate_circuit(raw: &Value) -> Result<NewCircuit, ServiceError> {
    let object = payload::as_object(raw, "Circuit")?;

    let name = required_name(object, "Circuit name is required.")?;
    let description =
        optional_text(object, "description", "Circuit description must be a string.")?;
    let tasks = match field(object, "tasks") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => {
            return Err(ServiceError::validation(
                "Circuit must include a non-empty list of tasks.",
            ))
        }
    };

    Ok(NewCircuit {
        name,
        description,
        tasks: tasks.iter().map(validate_task).collect::<Result<_, _>>()?,
    })
}
