//! Agent Services
//!
//! The execution core: safety scanning, context budgeting, state
//! verification, checkpointing, tool execution, and the orchestrator
//! control loop.

pub mod checkpoint;
pub mod context;
pub mod orchestrator;
pub mod safety;
pub mod tools;
pub mod verifier;
