pub mod circuits;
pub mod run_records;
pub mod run_sessions;
