pub mod bus;
pub mod config;
pub mod events;
pub mod progress;
pub mod service;
pub mod storage;
pub mod templates;
pub mod types;

pub use bus::EventBus;
pub use config::OnboardingConfig;
pub use events::{EventMeta, OnboardingEvent};
pub use progress::{completion_percentage, derive_status, measure, Progress, Trackable};
pub use service::{build_workflow, OnboardingError, OnboardingResult, OnboardingService};
pub use storage::{
    MemoryOnboardingStorage, OnboardingStorage, SqliteOnboardingStorage, StorageError,
    StorageResult,
};
pub use templates::{all_templates, resolve_template, StepDefinition, WorkflowTemplate};
pub use types::{
    CreateWorkflowRequest, Employee, StepCompletion, StepStart, StepStatus, StepType, Workflow,
    WorkflowBoard, WorkflowFilter, WorkflowOverview, WorkflowStatus, WorkflowStep,
};
