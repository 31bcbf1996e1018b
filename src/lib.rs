pub mod catalog;
pub mod cli;
pub mod db;
pub mod error;
pub mod history;
pub mod payload;
pub mod session;
pub mod settings;
pub mod utils;

use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;

use catalog::Catalog;
use cli::Cli;
use db::Database;
use history::RunRecorder;
use session::SessionEngine;
use settings::Settings;

/// Services shared by every command, all backed by one [`Database`].
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub catalog: Catalog,
    pub sessions: SessionEngine,
    pub history: RunRecorder,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            catalog: Catalog::new(db.clone()),
            sessions: SessionEngine::new(db.clone()),
            history: RunRecorder::new(db.clone()),
            db,
        }
    }
}

pub fn run() -> ExitCode {
    match try_run() {
        Ok(code) => code,
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn try_run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::resolve(cli.config.as_deref(), cli.db.as_deref(), |key| {
        std::env::var(key).ok()
    })?;

    utils::logging::init(&settings.log_level);
    log::info!("Circuits starting up...");

    let state = AppState::new(Database::new(settings.database_path.clone())?);
    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(cli::dispatch(&state, cli.command)) {
        Ok(Value::Null) => Ok(ExitCode::SUCCESS),
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&err)?);
            Ok(ExitCode::FAILURE)
        }
    }
}
