use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::events::{EventMeta, OnboardingEvent};
use crate::storage::{OnboardingStorage, StorageError};
use crate::templates::{resolve_template, WorkflowTemplate};
use crate::types::{
    CreateWorkflowRequest, StepCompletion, StepStart, StepStatus, Workflow, WorkflowBoard,
    WorkflowFilter, WorkflowOverview, WorkflowStatus, WorkflowStep,
};

pub type OnboardingResult<T> = Result<T, OnboardingError>;

#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("step {step_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("template {0} has no steps")]
    EmptyTemplate(String),
}

impl From<StorageError> for OnboardingError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::WorkflowNotFound(id) => Self::WorkflowNotFound(id),
            StorageError::StepNotFound(id) => Self::StepNotFound(id),
            StorageError::InvalidTransition { step_id, from, to } => {
                Self::InvalidTransition { step_id, from, to }
            }
            other => Self::Storage(other),
        }
    }
}

fn logged(operation: &'static str) -> impl FnOnce(OnboardingError) -> OnboardingError {
    move |error| {
        log::warn!("onboarding {} failed: {}", operation, error);
        error
    }
}

/// Entry point for onboarding operations. Persists through an
/// [`OnboardingStorage`] backend and reports every state change on the
/// [`EventBus`].
#[derive(Clone)]
pub struct OnboardingService {
    storage: Arc<dyn OnboardingStorage>,
    bus: EventBus,
    default_assignee: Option<String>,
}

impl OnboardingService {
    pub fn new(storage: Arc<dyn OnboardingStorage>, bus: EventBus) -> Self {
        Self {
            storage,
            bus,
            default_assignee: None,
        }
    }

    pub fn with_default_assignee(mut self, default_assignee: Option<String>) -> Self {
        self.default_assignee = default_assignee;
        self
    }

    pub fn storage(&self) -> &Arc<dyn OnboardingStorage> {
        &self.storage
    }

    pub async fn create_workflow(
        &self,
        request: CreateWorkflowRequest,
    ) -> OnboardingResult<WorkflowOverview> {
        self.create_workflow_at(request, Utc::now()).await
    }

    pub async fn create_workflow_at(
        &self,
        request: CreateWorkflowRequest,
        now: DateTime<Utc>,
    ) -> OnboardingResult<WorkflowOverview> {
        self.insert_new_workflow(request, now)
            .await
            .map_err(logged("workflow creation"))
    }

    async fn insert_new_workflow(
        &self,
        request: CreateWorkflowRequest,
        now: DateTime<Utc>,
    ) -> OnboardingResult<WorkflowOverview> {
        let template = resolve_template(&request.template_name);
        let (workflow, steps) =
            build_workflow(&request, template, self.default_assignee.as_deref(), now)?;

        self.storage
            .insert_workflow(workflow.clone(), steps.clone())
            .await?;

        log::info!(
            "created onboarding workflow {} for employee {} from template {} ({} steps)",
            workflow.id,
            workflow.employee_id,
            workflow.template_name,
            workflow.total_steps
        );
        self.bus.emit(OnboardingEvent::WorkflowCreated {
            meta: EventMeta::at(now),
            workflow_id: workflow.id.clone(),
            employee_id: workflow.employee_id.clone(),
            template_name: workflow.template_name.clone(),
            total_steps: workflow.total_steps,
        });

        // The workflow is committed at this point, so a failed display join
        // must not turn the creation into an error.
        let employee = match self.storage.employee(&workflow.employee_id).await {
            Ok(employee) => employee,
            Err(error) => {
                log::warn!(
                    "created workflow {} but employee {} lookup failed: {}",
                    workflow.id,
                    workflow.employee_id,
                    error
                );
                None
            }
        };
        Ok(WorkflowOverview {
            workflow,
            employee,
            steps,
        })
    }

    pub async fn start_step(&self, step_id: &str) -> OnboardingResult<WorkflowStep> {
        self.start_step_at(step_id, Utc::now()).await
    }

    pub async fn start_step_at(
        &self,
        step_id: &str,
        now: DateTime<Utc>,
    ) -> OnboardingResult<WorkflowStep> {
        let StepStart { step, changed } = self
            .storage
            .start_step(step_id, now)
            .await
            .map_err(OnboardingError::from)
            .map_err(logged("step start"))?;

        if changed {
            log::info!(
                "started step {} of workflow {}",
                step.step_number,
                step.workflow_id
            );
            self.bus.emit(OnboardingEvent::StepStarted {
                meta: EventMeta::at(now),
                workflow_id: step.workflow_id.clone(),
                step_id: step.id.clone(),
                step_number: step.step_number,
            });
        }

        Ok(step)
    }

    pub async fn complete_step(
        &self,
        step_id: &str,
        notes: Option<String>,
    ) -> OnboardingResult<StepCompletion> {
        self.complete_step_at(step_id, notes, Utc::now()).await
    }

    pub async fn complete_step_at(
        &self,
        step_id: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> OnboardingResult<StepCompletion> {
        let completion = self
            .storage
            .complete_step(step_id, now, notes)
            .await
            .map_err(OnboardingError::from)
            .map_err(logged("step completion"))?;

        if completion.already_completed {
            log::debug!(
                "step {} of workflow {} was already completed",
                completion.step.step_number,
                completion.workflow.id
            );
            return Ok(completion);
        }

        let workflow = &completion.workflow;
        log::info!(
            "completed step {} of workflow {}: {}% ({})",
            completion.step.step_number,
            workflow.id,
            workflow.completion_percentage,
            workflow.status.as_str()
        );
        self.bus.emit(OnboardingEvent::StepCompleted {
            meta: EventMeta::at(now),
            workflow_id: workflow.id.clone(),
            step_id: completion.step.id.clone(),
            step_number: completion.step.step_number,
            completion_percentage: workflow.completion_percentage,
            status: workflow.status,
        });

        if completion.completed_workflow() {
            log::info!(
                "onboarding workflow {} for employee {} completed",
                workflow.id,
                workflow.employee_id
            );
            self.bus.emit(OnboardingEvent::WorkflowCompleted {
                meta: EventMeta::at(now),
                workflow_id: workflow.id.clone(),
                employee_id: workflow.employee_id.clone(),
            });
        }

        Ok(completion)
    }

    pub async fn workflow_overview(&self, workflow_id: &str) -> OnboardingResult<WorkflowOverview> {
        self.load_overview(workflow_id)
            .await
            .map_err(logged("workflow lookup"))
    }

    /// Workflows split into active and completed, each joined to its
    /// employee and steps.
    pub async fn board(&self, filter: WorkflowFilter) -> OnboardingResult<WorkflowBoard> {
        self.load_board(filter)
            .await
            .map_err(logged("workflow listing"))
    }

    async fn load_overview(&self, workflow_id: &str) -> OnboardingResult<WorkflowOverview> {
        let (workflow, steps) = self
            .storage
            .workflow_with_steps(workflow_id)
            .await?
            .ok_or_else(|| OnboardingError::WorkflowNotFound(workflow_id.to_string()))?;
        let employee = self.storage.employee(&workflow.employee_id).await?;
        Ok(WorkflowOverview {
            workflow,
            employee,
            steps,
        })
    }

    async fn load_board(&self, filter: WorkflowFilter) -> OnboardingResult<WorkflowBoard> {
        let rows = self.storage.workflows_with_steps(filter).await?;
        let employee_ids: Vec<String> = rows
            .iter()
            .map(|(workflow, _)| workflow.employee_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let employees = self.storage.employees(&employee_ids).await?;

        let overviews: Vec<WorkflowOverview> = rows
            .into_iter()
            .map(|(workflow, steps)| {
                let employee = employees.get(&workflow.employee_id).cloned();
                WorkflowOverview {
                    workflow,
                    employee,
                    steps,
                }
            })
            .collect();

        log::debug!("loaded {} onboarding workflows", overviews.len());
        Ok(partition(overviews))
    }
}

/// Instantiate a workflow and its steps from a template. Nothing is persisted.
pub fn build_workflow(
    request: &CreateWorkflowRequest,
    template: &WorkflowTemplate,
    default_assignee: Option<&str>,
    now: DateTime<Utc>,
) -> OnboardingResult<(Workflow, Vec<WorkflowStep>)> {
    let employee_id = request.employee_id.trim();
    if employee_id.is_empty() {
        return Err(OnboardingError::InvalidInput(
            "employee id is required".to_string(),
        ));
    }
    if template.steps.is_empty() {
        return Err(OnboardingError::EmptyTemplate(template.name.to_string()));
    }

    let started_date = request.started_date.unwrap_or_else(|| now.date_naive());
    if let Some(expected) = request.expected_completion_date {
        if expected < started_date {
            return Err(OnboardingError::InvalidInput(format!(
                "expected completion date {} is before start date {}",
                expected, started_date
            )));
        }
    }

    let assigned_to = non_blank(request.assigned_to.as_deref());
    let workflow = Workflow {
        id: Uuid::new_v4().to_string(),
        employee_id: employee_id.to_string(),
        template_name: template.name.to_string(),
        current_step: 1,
        total_steps: template.step_count(),
        completion_percentage: 0,
        status: WorkflowStatus::NotStarted,
        assigned_to: assigned_to.clone(),
        notes: non_blank(request.notes.as_deref()),
        started_date: Some(started_date),
        expected_completion_date: request.expected_completion_date,
        actual_completion_date: None,
        created_at: now,
        updated_at: now,
    };

    let steps = template
        .steps
        .iter()
        .enumerate()
        .map(|(index, definition)| WorkflowStep {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow.id.clone(),
            step_number: index as u32 + 1,
            title: definition.title.to_string(),
            description: definition.description.to_string(),
            step_type: definition.step_type,
            assigned_to: definition
                .assignee_role
                .map(str::to_string)
                .or_else(|| assigned_to.clone())
                .or_else(|| default_assignee.map(str::to_string)),
            status: StepStatus::Pending,
            estimated_duration_hours: definition.estimated_duration_hours,
            started_at: None,
            completed_date: None,
            notes: None,
        })
        .collect();

    Ok((workflow, steps))
}

pub fn partition(overviews: Vec<WorkflowOverview>) -> WorkflowBoard {
    let (active, completed): (Vec<_>, Vec<_>) = overviews
        .into_iter()
        .partition(|overview| overview.workflow.is_active());
    WorkflowBoard { active, completed }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
