use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    Employee, StepCompletion, StepStart, StepStatus, Workflow, WorkflowFilter, WorkflowStep,
};

mod memory;
mod sqlite;

pub use memory::MemoryOnboardingStorage;
pub use sqlite::SqliteOnboardingStorage;

pub type StorageResult<T> = Result<T, StorageError>;

pub const DEFAULT_LIST_LIMIT: u32 = 500;
pub const MAX_LIST_LIMIT: u32 = 5_000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("time parse error: {0}")]
    Chrono(#[from] chrono::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task join error: {0}")]
    Task(String),

    #[error("invalid onboarding data: {0}")]
    InvalidData(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("step {step_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
    },
}

/// Row store for workflows, their steps and the employee table they join to.
///
/// Multi-row writes are atomic: a workflow is inserted together with all of
/// its steps, and a step completion updates the step and recomputes the
/// owning workflow as one read-modify-write.
#[async_trait]
pub trait OnboardingStorage: Send + Sync {
    async fn init(&self) -> StorageResult<()>;

    async fn upsert_employee(&self, employee: Employee) -> StorageResult<()>;

    async fn employee(&self, employee_id: &str) -> StorageResult<Option<Employee>>;

    async fn employees(&self, employee_ids: &[String]) -> StorageResult<HashMap<String, Employee>>;

    async fn insert_workflow(&self, workflow: Workflow, steps: Vec<WorkflowStep>)
        -> StorageResult<()>;

    async fn workflow(&self, workflow_id: &str) -> StorageResult<Option<Workflow>>;

    async fn workflows(&self, filter: WorkflowFilter) -> StorageResult<Vec<Workflow>>;

    async fn step(&self, step_id: &str) -> StorageResult<Option<WorkflowStep>>;

    /// Steps of one workflow ordered by step number.
    async fn steps_for_workflow(&self, workflow_id: &str) -> StorageResult<Vec<WorkflowStep>>;

    /// A workflow and its ordered steps read from one consistent snapshot.
    async fn workflow_with_steps(
        &self,
        workflow_id: &str,
    ) -> StorageResult<Option<(Workflow, Vec<WorkflowStep>)>>;

    /// Filtered workflows, each paired with its ordered steps, read from one
    /// consistent snapshot in listing order.
    async fn workflows_with_steps(
        &self,
        filter: WorkflowFilter,
    ) -> StorageResult<Vec<(Workflow, Vec<WorkflowStep>)>>;

    async fn start_step(
        &self,
        step_id: &str,
        started_at: DateTime<Utc>,
    ) -> StorageResult<StepStart>;

    async fn complete_step(
        &self,
        step_id: &str,
        completed_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> StorageResult<StepCompletion>;
}

pub(crate) fn effective_limit(filter: &WorkflowFilter) -> u32 {
    filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
}

pub(crate) fn validate_new_workflow(
    workflow: &Workflow,
    steps: &[WorkflowStep],
) -> StorageResult<()> {
    if steps.is_empty() {
        return Err(StorageError::InvalidData(format!(
            "workflow {} has no steps",
            workflow.id
        )));
    }
    if steps.len() as u32 != workflow.total_steps {
        return Err(StorageError::InvalidData(format!(
            "workflow {} declares {} steps but {} were supplied",
            workflow.id,
            workflow.total_steps,
            steps.len()
        )));
    }
    for (index, step) in steps.iter().enumerate() {
        if step.workflow_id != workflow.id {
            return Err(StorageError::InvalidData(format!(
                "step {} belongs to workflow {}, expected {}",
                step.id, step.workflow_id, workflow.id
            )));
        }
        if step.step_number != index as u32 + 1 {
            return Err(StorageError::InvalidData(format!(
                "step {} has number {}, expected {}",
                step.id,
                step.step_number,
                index + 1
            )));
        }
    }
    Ok(())
}

/// Returns `None` when the step is already in progress.
pub(crate) fn started_step(
    step: &WorkflowStep,
    started_at: DateTime<Utc>,
) -> StorageResult<Option<WorkflowStep>> {
    match step.status {
        StepStatus::Pending => Ok(Some(WorkflowStep {
            status: StepStatus::InProgress,
            started_at: Some(started_at),
            ..step.clone()
        })),
        StepStatus::InProgress => Ok(None),
        StepStatus::Completed => Err(StorageError::InvalidTransition {
            step_id: step.id.clone(),
            from: StepStatus::Completed,
            to: StepStatus::InProgress,
        }),
    }
}

pub(crate) fn completed_step(
    step: &WorkflowStep,
    completed_at: DateTime<Utc>,
    notes: Option<String>,
) -> WorkflowStep {
    WorkflowStep {
        status: StepStatus::Completed,
        completed_date: Some(completed_at),
        notes: notes.or_else(|| step.notes.clone()),
        ..step.clone()
    }
}
