//! Progress Events
//!
//! One-way event stream from the orchestrator to the embedding host.
//! Events are advisory; a closed or absent receiver never affects
//! execution.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::result::TaskStatus;

/// Phase the orchestrator is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Planning,
    Executing,
    Validating,
    ToolCalling,
    Verifying,
    Reflecting,
    Replanning,
    Completed,
}

/// One progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ProgressEvent {
    PlanCreated {
        total_steps: u32,
    },
    PhaseChanged {
        phase: ExecutionPhase,
    },
    StepStarted {
        step_number: u32,
        total_steps: u32,
        description: String,
    },
    StepCompleted {
        step_number: u32,
        success: bool,
    },
    Replanning {
        step_number: u32,
        attempt: u32,
        reason: String,
    },
    TaskFinished {
        status: TaskStatus,
    },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Build a progress channel pair.
pub fn progress_channel() -> (ProgressSender, mpsc::UnboundedReceiver<ProgressEvent>) {
    mpsc::unbounded_channel()
}

/// Send an event, ignoring a closed receiver.
pub fn emit(sender: &Option<ProgressSender>, event: ProgressEvent) {
    if let Some(sender) = sender {
        let _ = sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_survives_dropped_receiver() {
        let (tx, rx) = progress_channel();
        drop(rx);
        emit(
            &Some(tx),
            ProgressEvent::PhaseChanged {
                phase: ExecutionPhase::Planning,
            },
        );
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = ProgressEvent::StepCompleted {
            step_number: 2,
            success: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "step_completed");
        assert_eq!(json["step_number"], 2);
    }
}
