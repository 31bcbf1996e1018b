use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::{
    catalog,
    error::{CommandError, ServiceError},
    history, session, AppState,
};

#[derive(Parser)]
#[command(name = "circuits", version, about = "Create, edit, and run timeboxed circuits")]
pub struct Cli {
    /// Settings file (JSON). Defaults to $CIRCUITS_CONFIG when set.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// SQLite database path; overrides settings and $CIRCUITS_DB.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Circuit definitions.
    #[command(subcommand)]
    Circuit(CircuitCommand),
    /// Run history.
    #[command(subcommand)]
    Run(RunCommand),
    /// The live run session of a circuit.
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Subcommand)]
pub enum CircuitCommand {
    List,
    Get { id: i64 },
    /// Payload is a JSON file, or `-` for stdin.
    Create { payload: PathBuf },
    Update { id: i64, payload: PathBuf },
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum RunCommand {
    List,
    Record { circuit_id: i64, payload: PathBuf },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    Get { circuit_id: i64 },
    Put { circuit_id: i64, payload: PathBuf },
    Delete { circuit_id: i64 },
    /// Without a payload, the stored task statuses are used.
    Finish {
        circuit_id: i64,
        payload: Option<PathBuf>,
    },
}

fn read_payload(source: &Path) -> Result<Value, CommandError> {
    let contents = if source == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|err| ServiceError::validation(format!("failed to read stdin: {err}")))?;
        buffer
    } else {
        fs::read_to_string(source).map_err(|err| {
            ServiceError::validation(format!("failed to read {}: {err}", source.display()))
        })?
    };
    Ok(serde_json::from_str(&contents)?)
}

fn to_json<T: Serialize>(value: T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|err| CommandError {
        status: 500,
        message: err.to_string(),
    })
}

/// Run one command; deletions yield `Value::Null`.
pub async fn dispatch(state: &AppState, command: Commands) -> Result<Value, CommandError> {
    match command {
        Commands::Circuit(command) => match command {
            CircuitCommand::List => to_json(catalog::commands::list_circuits(state).await?),
            CircuitCommand::Get { id } => to_json(catalog::commands::get_circuit(state, id).await?),
            CircuitCommand::Create { payload } => {
                let payload = read_payload(&payload)?;
                to_json(catalog::commands::create_circuit(state, payload).await?)
            }
            CircuitCommand::Update { id, payload } => {
                let payload = read_payload(&payload)?;
                to_json(catalog::commands::update_circuit(state, id, payload).await?)
            }
            CircuitCommand::Delete { id } => {
                catalog::commands::delete_circuit(state, id).await?;
                Ok(Value::Null)
            }
        },
        Commands::Run(command) => match command {
            RunCommand::List => to_json(history::commands::list_runs(state).await?),
            RunCommand::Record { circuit_id, payload } => {
                let payload = read_payload(&payload)?;
                to_json(history::commands::record_run(state, circuit_id, payload).await?)
            }
        },
        Commands::Session(command) => match command {
            SessionCommand::Get { circuit_id } => {
                to_json(session::commands::get_session(state, circuit_id).await?)
            }
            SessionCommand::Put { circuit_id, payload } => {
                let payload = read_payload(&payload)?;
                to_json(session::commands::upsert_session(state, circuit_id, payload).await?)
            }
            SessionCommand::Delete { circuit_id } => {
                session::commands::delete_session(state, circuit_id).await?;
                Ok(Value::Null)
            }
            SessionCommand::Finish { circuit_id, payload } => {
                let payload = match payload {
                    Some(path) => read_payload(&path)?,
                    None => Value::Null,
                };
                to_json(session::commands::finish_session(state, circuit_id, payload).await?)
            }
        },
    }
}
