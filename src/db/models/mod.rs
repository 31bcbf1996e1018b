pub mod circuit;
pub mod run_record;
pub mod run_session;

pub use circuit::{Circuit, CircuitView, NewCircuit, Task};
pub use run_record::{CircuitRef, NewRunRecord, RunRecord, RunRecordTask, RunView, TaskOutcome};
pub use run_session::{RunSession, SessionStatus, SessionTaskStatus, SessionUpdate, SessionView};
