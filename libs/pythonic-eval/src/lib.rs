//! Code-evaluation engine for Mission: Pythonic.
//!
//! Submissions run in a sandboxed interpreter (engine.rs) behind a fault
//! containment boundary (executor.rs), are judged by the checker registry
//! (checker.rs) and aggregated into a verdict (evaluator.rs).

pub mod checker;
pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod sandbox;

#[cfg(test)]
mod testing;

pub use engine::{build_engine, DockerEngine, ProcessEngine, RawExecution, SandboxEngine};
pub use evaluator::{apply_code_modification, Evaluator};
pub use executor::Executor;
