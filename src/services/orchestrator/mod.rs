//! Orchestrator
//!
//! The control loop that drives plan, execute, verify, reflect, and
//! replan, plus the progress channel and failure classification it
//! depends on.

pub mod progress;
pub mod replan;
pub mod service;

pub use progress::{progress_channel, ExecutionPhase, ProgressEvent, ProgressSender};
pub use replan::{DefaultFailureClassifier, FailureClassifier};
pub use service::Orchestrator;
