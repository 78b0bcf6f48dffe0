use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Workflow status is never set directly; it is derived from step progress
/// by [`crate::progress::derive_status`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Document,
    Training,
    Meeting,
    Equipment,
    Task,
    Review,
}

impl StepType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Training => "training",
            Self::Meeting => "meeting",
            Self::Equipment => "equipment",
            Self::Task => "task",
            Self::Review => "review",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "document" => Some(Self::Document),
            "training" => Some(Self::Training),
            "meeting" => Some(Self::Meeting),
            "equipment" => Some(Self::Equipment),
            "task" => Some(Self::Task),
            "review" => Some(Self::Review),
            _ => None,
        }
    }
}

/// Employee record owned by the host application. This crate only reads it
/// for display joins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Employee {
    pub id: String,
    pub full_name: String,
    pub role: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: String,
    pub employee_id: String,
    pub template_name: String,
    /// 1-based marker: last completed step number + 1. Not a gate.
    pub current_step: u32,
    pub total_steps: u32,
    pub completion_percentage: u8,
    pub status: WorkflowStatus,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
    pub started_date: Option<NaiveDate>,
    pub expected_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn is_active(&self) -> bool {
        self.status != WorkflowStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    pub id: String,
    pub workflow_id: String,
    pub step_number: u32,
    pub title: String,
    pub description: String,
    pub step_type: StepType,
    pub assigned_to: Option<String>,
    pub status: StepStatus,
    pub estimated_duration_hours: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CreateWorkflowRequest {
    pub employee_id: String,
    pub template_name: String,
    pub expected_completion_date: Option<NaiveDate>,
    pub started_date: Option<NaiveDate>,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WorkflowFilter {
    pub employee_id: Option<String>,
    pub status: Option<WorkflowStatus>,
    pub limit: Option<u32>,
}

impl WorkflowFilter {
    pub fn matches(&self, workflow: &Workflow) -> bool {
        let employee_matches = self
            .employee_id
            .as_deref()
            .map_or(true, |employee_id| workflow.employee_id == employee_id);
        let status_matches = self.status.map_or(true, |status| workflow.status == status);
        employee_matches && status_matches
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepStart {
    pub step: WorkflowStep,
    /// False when the step was already in progress.
    pub changed: bool,
}

/// Result of a step completion, computed atomically with the step write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepCompletion {
    pub step: WorkflowStep,
    pub workflow: Workflow,
    pub previous_status: WorkflowStatus,
    /// True when the step was already completed and nothing was written.
    pub already_completed: bool,
}

impl StepCompletion {
    pub fn completed_workflow(&self) -> bool {
        self.previous_status != WorkflowStatus::Completed
            && self.workflow.status == WorkflowStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowOverview {
    pub workflow: Workflow,
    pub employee: Option<Employee>,
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkflowBoard {
    pub active: Vec<WorkflowOverview>,
    pub completed: Vec<WorkflowOverview>,
}
