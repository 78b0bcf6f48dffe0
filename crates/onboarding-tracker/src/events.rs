use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::WorkflowStatus;

/// Metadata attached to every onboarding event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    /// Unique event ID (UUID v4)
    pub event_id: String,
    pub occurred_at: DateTime<Utc>,
}

impl EventMeta {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            occurred_at,
        }
    }
}

impl Default for EventMeta {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OnboardingEvent {
    WorkflowCreated {
        meta: EventMeta,
        workflow_id: String,
        employee_id: String,
        template_name: String,
        total_steps: u32,
    },
    StepStarted {
        meta: EventMeta,
        workflow_id: String,
        step_id: String,
        step_number: u32,
    },
    StepCompleted {
        meta: EventMeta,
        workflow_id: String,
        step_id: String,
        step_number: u32,
        completion_percentage: u8,
        status: WorkflowStatus,
    },
    WorkflowCompleted {
        meta: EventMeta,
        workflow_id: String,
        employee_id: String,
    },
    /// Emitted by the bus itself after events had to be dropped
    EventsDropped { count: u64 },
}

impl OnboardingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowCreated { .. } => "workflow_created",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::EventsDropped { .. } => "events_dropped",
        }
    }

    pub fn workflow_id(&self) -> Option<&str> {
        match self {
            Self::WorkflowCreated { workflow_id, .. }
            | Self::StepStarted { workflow_id, .. }
            | Self::StepCompleted { workflow_id, .. }
            | Self::WorkflowCompleted { workflow_id, .. } => Some(workflow_id.as_str()),
            Self::EventsDropped { .. } => None,
        }
    }
}
