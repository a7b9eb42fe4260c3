//! Background task orchestration: a four-state lifecycle over a bounded pool.

pub mod model;
pub mod orchestrator;

pub use model::{Task, TaskKind, TaskState};
pub use orchestrator::{spawn_sweep_task, TaskOrchestrator};
