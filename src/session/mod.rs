pub mod commands;
pub mod engine;
pub mod state;

pub use engine::SessionEngine;
