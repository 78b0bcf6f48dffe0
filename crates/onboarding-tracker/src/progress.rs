//! Progress recomputation.
//!
//! Everything here is a pure function of a step snapshot, so replaying the
//! same snapshot always produces the same workflow state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{StepStatus, Workflow, WorkflowStatus, WorkflowStep};

/// An item that counts toward a parent's completion.
pub trait Trackable {
    fn is_done(&self) -> bool;
}

impl Trackable for WorkflowStep {
    fn is_done(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

impl Trackable for StepStatus {
    fn is_done(&self) -> bool {
        *self == StepStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub completed_steps: u32,
    pub total_steps: u32,
    pub completion_percentage: u8,
    pub status: WorkflowStatus,
}

/// `round(100 * completed / total)` with halves rounded up.
pub fn completion_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = u64::from(completed.min(total));
    let total = u64::from(total);
    ((200 * completed + total) / (2 * total)).min(100) as u8
}

pub fn derive_status(completed: u32, percentage: u8) -> WorkflowStatus {
    if percentage == 100 {
        WorkflowStatus::Completed
    } else if completed == 0 {
        WorkflowStatus::NotStarted
    } else {
        WorkflowStatus::InProgress
    }
}

pub fn measure<T: Trackable>(items: &[T], total_steps: u32) -> Progress {
    let completed_steps = items.iter().filter(|item| item.is_done()).count() as u32;
    let completion_percentage = completion_percentage(completed_steps, total_steps);
    Progress {
        completed_steps,
        total_steps,
        completion_percentage,
        status: derive_status(completed_steps, completion_percentage),
    }
}

/// Apply a step completion to `workflow` using the workflow's full step
/// snapshot (which must already include the completed step).
///
/// `current_step` becomes `completed_step_number + 1` even when earlier steps
/// are still open or no such step exists.
pub fn recompute_workflow(
    workflow: &Workflow,
    steps: &[WorkflowStep],
    completed_step_number: u32,
    at: DateTime<Utc>,
) -> Workflow {
    let progress = measure(steps, workflow.total_steps);
    let actual_completion_date = if progress.status == WorkflowStatus::Completed {
        if workflow.status == WorkflowStatus::Completed {
            workflow.actual_completion_date.or(Some(at))
        } else {
            Some(at)
        }
    } else {
        None
    };

    Workflow {
        current_step: completed_step_number.saturating_add(1),
        completion_percentage: progress.completion_percentage,
        status: progress.status,
        actual_completion_date,
        updated_at: at,
        ..workflow.clone()
    }
}
