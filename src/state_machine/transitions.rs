//! Pure transition functions for the workflow and stage-task state machines.
//!
//! The tracker resolves the current state from the store, asks these functions
//! for the target state, and persists the result. Keeping the transition
//! tables free of I/O makes the legal state graph directly testable.

use super::errors::{StateMachineError, StateMachineResult};
use super::events::{StageTaskEvent, WorkflowEvent};
use super::states::{StageTaskState, WorkflowState};

/// Determine the target workflow state for an event.
pub fn workflow_target_state(
    current: WorkflowState,
    event: &WorkflowEvent,
) -> StateMachineResult<WorkflowState> {
    let target = match (current, event) {
        (WorkflowState::Pending, WorkflowEvent::Start) => WorkflowState::InProgress,

        (WorkflowState::InProgress, WorkflowEvent::Complete) => WorkflowState::Completed,
        (WorkflowState::InProgress, WorkflowEvent::CompleteWithWarnings) => {
            WorkflowState::CompletedWithErrors
        }

        // A workflow may fail before its first stage starts (e.g. storage
        // rejects the context) or while stages are running.
        (WorkflowState::Pending, WorkflowEvent::Fail(_)) => WorkflowState::Failed,
        (WorkflowState::InProgress, WorkflowEvent::Fail(_)) => WorkflowState::Failed,

        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            })
        }
    };

    Ok(target)
}

/// Determine the target stage task state for an event.
pub fn stage_task_target_state(
    current: StageTaskState,
    event: &StageTaskEvent,
) -> StateMachineResult<StageTaskState> {
    let target = match (current, event) {
        (StageTaskState::Pending, StageTaskEvent::Start) => StageTaskState::InProgress,
        (StageTaskState::InProgress, StageTaskEvent::Complete) => StageTaskState::Completed,
        (StageTaskState::InProgress, StageTaskEvent::Fail(_)) => StageTaskState::Failed,
        // A task that never got its collaborator call issued can still be
        // failed directly when workflow bookkeeping aborts.
        (StageTaskState::Pending, StageTaskEvent::Fail(_)) => StageTaskState::Failed,

        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            })
        }
    };

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_happy_path() {
        assert_eq!(
            workflow_target_state(WorkflowState::Pending, &WorkflowEvent::Start).unwrap(),
            WorkflowState::InProgress
        );
        assert_eq!(
            workflow_target_state(WorkflowState::InProgress, &WorkflowEvent::Complete).unwrap(),
            WorkflowState::Completed
        );
    }

    #[test]
    fn test_workflow_degraded_and_failed_paths() {
        assert_eq!(
            workflow_target_state(
                WorkflowState::InProgress,
                &WorkflowEvent::CompleteWithWarnings
            )
            .unwrap(),
            WorkflowState::CompletedWithErrors
        );
        assert_eq!(
            workflow_target_state(
                WorkflowState::InProgress,
                &WorkflowEvent::Fail("voice stage reported a hard error".to_string())
            )
            .unwrap(),
            WorkflowState::Failed
        );
    }

    #[test]
    fn test_workflow_terminal_states_are_final() {
        for terminal in [
            WorkflowState::Completed,
            WorkflowState::CompletedWithErrors,
            WorkflowState::Failed,
        ] {
            assert!(workflow_target_state(terminal, &WorkflowEvent::Start).is_err());
            assert!(workflow_target_state(terminal, &WorkflowEvent::Complete).is_err());
            assert!(
                workflow_target_state(terminal, &WorkflowEvent::Fail("x".to_string())).is_err()
            );
        }
    }

    #[test]
    fn test_workflow_cannot_complete_from_pending() {
        assert!(workflow_target_state(WorkflowState::Pending, &WorkflowEvent::Complete).is_err());
    }

    #[test]
    fn test_stage_task_transitions() {
        assert_eq!(
            stage_task_target_state(StageTaskState::Pending, &StageTaskEvent::Start).unwrap(),
            StageTaskState::InProgress
        );
        assert_eq!(
            stage_task_target_state(StageTaskState::InProgress, &StageTaskEvent::Complete)
                .unwrap(),
            StageTaskState::Completed
        );
        assert_eq!(
            stage_task_target_state(
                StageTaskState::InProgress,
                &StageTaskEvent::Fail("timeout".to_string())
            )
            .unwrap(),
            StageTaskState::Failed
        );
        assert!(
            stage_task_target_state(StageTaskState::Completed, &StageTaskEvent::Start).is_err()
        );
    }
}
