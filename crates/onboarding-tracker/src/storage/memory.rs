use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    completed_step, effective_limit, started_step, validate_new_workflow, OnboardingStorage,
    StorageError, StorageResult,
};
use crate::progress::recompute_workflow;
use crate::types::{
    Employee, StepCompletion, StepStart, StepStatus, Workflow, WorkflowFilter, WorkflowStep,
};

#[derive(Debug, Default)]
struct Tables {
    employees: HashMap<String, Employee>,
    workflows: HashMap<String, Workflow>,
    steps: HashMap<String, WorkflowStep>,
}

impl Tables {
    fn steps_of(&self, workflow_id: &str) -> Vec<WorkflowStep> {
        let mut steps: Vec<WorkflowStep> = self
            .steps
            .values()
            .filter(|step| step.workflow_id == workflow_id)
            .cloned()
            .collect();
        steps.sort_by_key(|step| step.step_number);
        steps
    }

    fn filtered(&self, filter: &WorkflowFilter) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self
            .workflows
            .values()
            .filter(|workflow| filter.matches(workflow))
            .cloned()
            .collect();
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        workflows.truncate(effective_limit(filter) as usize);
        workflows
    }
}

/// In-process backend. All tables sit behind one lock, so every write is
/// atomic with respect to other callers.
#[derive(Debug, Default)]
pub struct MemoryOnboardingStorage {
    tables: RwLock<Tables>,
}

impl MemoryOnboardingStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OnboardingStorage for MemoryOnboardingStorage {
    async fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn upsert_employee(&self, employee: Employee) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.employees.insert(employee.id.clone(), employee);
        Ok(())
    }

    async fn employee(&self, employee_id: &str) -> StorageResult<Option<Employee>> {
        Ok(self.tables.read().await.employees.get(employee_id).cloned())
    }

    async fn employees(
        &self,
        employee_ids: &[String],
    ) -> StorageResult<HashMap<String, Employee>> {
        let tables = self.tables.read().await;
        Ok(employee_ids
            .iter()
            .filter_map(|id| tables.employees.get(id))
            .map(|employee| (employee.id.clone(), employee.clone()))
            .collect())
    }

    async fn insert_workflow(
        &self,
        workflow: Workflow,
        steps: Vec<WorkflowStep>,
    ) -> StorageResult<()> {
        validate_new_workflow(&workflow, &steps)?;

        let mut tables = self.tables.write().await;
        if tables.workflows.contains_key(&workflow.id) {
            return Err(StorageError::InvalidData(format!(
                "workflow {} already exists",
                workflow.id
            )));
        }
        if let Some(step) = steps.iter().find(|step| tables.steps.contains_key(&step.id)) {
            return Err(StorageError::InvalidData(format!(
                "step {} already exists",
                step.id
            )));
        }

        for step in steps {
            tables.steps.insert(step.id.clone(), step);
        }
        tables.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    async fn workflow(&self, workflow_id: &str) -> StorageResult<Option<Workflow>> {
        Ok(self.tables.read().await.workflows.get(workflow_id).cloned())
    }

    async fn workflows(&self, filter: WorkflowFilter) -> StorageResult<Vec<Workflow>> {
        Ok(self.tables.read().await.filtered(&filter))
    }

    async fn step(&self, step_id: &str) -> StorageResult<Option<WorkflowStep>> {
        Ok(self.tables.read().await.steps.get(step_id).cloned())
    }

    async fn steps_for_workflow(&self, workflow_id: &str) -> StorageResult<Vec<WorkflowStep>> {
        Ok(self.tables.read().await.steps_of(workflow_id))
    }

    async fn workflow_with_steps(
        &self,
        workflow_id: &str,
    ) -> StorageResult<Option<(Workflow, Vec<WorkflowStep>)>> {
        let tables = self.tables.read().await;
        Ok(tables
            .workflows
            .get(workflow_id)
            .map(|workflow| (workflow.clone(), tables.steps_of(workflow_id))))
    }

    async fn workflows_with_steps(
        &self,
        filter: WorkflowFilter,
    ) -> StorageResult<Vec<(Workflow, Vec<WorkflowStep>)>> {
        let tables = self.tables.read().await;
        let workflows = tables.filtered(&filter);

        let mut grouped: HashMap<&str, Vec<WorkflowStep>> = workflows
            .iter()
            .map(|workflow| (workflow.id.as_str(), Vec::new()))
            .collect();
        for step in tables.steps.values() {
            if let Some(steps) = grouped.get_mut(step.workflow_id.as_str()) {
                steps.push(step.clone());
            }
        }

        let mut rows = Vec::with_capacity(workflows.len());
        for workflow in &workflows {
            let mut steps = grouped.remove(workflow.id.as_str()).unwrap_or_default();
            steps.sort_by_key(|step| step.step_number);
            rows.push((workflow.clone(), steps));
        }
        Ok(rows)
    }

    async fn start_step(
        &self,
        step_id: &str,
        started_at: DateTime<Utc>,
    ) -> StorageResult<StepStart> {
        let mut tables = self.tables.write().await;
        let step = tables
            .steps
            .get(step_id)
            .cloned()
            .ok_or_else(|| StorageError::StepNotFound(step_id.to_string()))?;

        match started_step(&step, started_at)? {
            Some(started) => {
                tables.steps.insert(started.id.clone(), started.clone());
                Ok(StepStart {
                    step: started,
                    changed: true,
                })
            }
            None => Ok(StepStart {
                step,
                changed: false,
            }),
        }
    }

    async fn complete_step(
        &self,
        step_id: &str,
        completed_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> StorageResult<StepCompletion> {
        let mut tables = self.tables.write().await;
        let step = tables
            .steps
            .get(step_id)
            .cloned()
            .ok_or_else(|| StorageError::StepNotFound(step_id.to_string()))?;
        let workflow = tables
            .workflows
            .get(&step.workflow_id)
            .cloned()
            .ok_or_else(|| StorageError::WorkflowNotFound(step.workflow_id.clone()))?;

        if step.status == StepStatus::Completed {
            return Ok(StepCompletion {
                previous_status: workflow.status,
                step,
                workflow,
                already_completed: true,
            });
        }

        let completed = completed_step(&step, completed_at, notes);
        tables.steps.insert(completed.id.clone(), completed.clone());

        let steps = tables.steps_of(&workflow.id);
        let updated = recompute_workflow(&workflow, &steps, completed.step_number, completed_at);
        tables.workflows.insert(updated.id.clone(), updated.clone());

        Ok(StepCompletion {
            step: completed,
            workflow: updated,
            previous_status: workflow.status,
            already_completed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::types::{StepType, WorkflowStatus};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, minute, 0)
            .single()
            .expect("valid datetime")
    }

    fn seed(total_steps: u32) -> (Workflow, Vec<WorkflowStep>) {
        let workflow = Workflow {
            id: "wf".to_string(),
            employee_id: "emp".to_string(),
            template_name: "intern".to_string(),
            current_step: 1,
            total_steps,
            completion_percentage: 0,
            status: WorkflowStatus::NotStarted,
            assigned_to: None,
            notes: None,
            started_date: None,
            expected_completion_date: None,
            actual_completion_date: None,
            created_at: at(0),
            updated_at: at(0),
        };
        let steps = (1..=total_steps)
            .map(|number| WorkflowStep {
                id: format!("s{}", number),
                workflow_id: "wf".to_string(),
                step_number: number,
                title: format!("Step {}", number),
                description: String::new(),
                step_type: StepType::Training,
                assigned_to: None,
                status: StepStatus::Pending,
                estimated_duration_hours: 2,
                started_at: None,
                completed_date: None,
                notes: None,
            })
            .collect();
        (workflow, steps)
    }

    #[tokio::test]
    async fn duplicate_workflow_insert_is_rejected() {
        let storage = MemoryOnboardingStorage::new();
        let (workflow, steps) = seed(2);
        storage
            .insert_workflow(workflow.clone(), steps.clone())
            .await
            .expect("first insert");
        let error = storage
            .insert_workflow(workflow, steps)
            .await
            .expect_err("second insert");
        assert!(matches!(error, StorageError::InvalidData(_)));
    }

    #[tokio::test]
    async fn concurrent_completions_keep_workflow_consistent() {
        let storage = Arc::new(MemoryOnboardingStorage::new());
        let (workflow, steps) = seed(8);
        storage
            .insert_workflow(workflow, steps)
            .await
            .expect("insert workflow");

        let mut handles = Vec::new();
        for number in 1..=8u32 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage
                    .complete_step(&format!("s{}", number), at(number), None)
                    .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("completion");
        }

        let workflow = storage
            .workflow("wf")
            .await
            .expect("query")
            .expect("workflow exists");
        assert_eq!(workflow.completion_percentage, 100);
        assert_eq!(workflow.status, WorkflowStatus::Completed);
        assert!(workflow.actual_completion_date.is_some());
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_limited() {
        let storage = MemoryOnboardingStorage::new();
        for (index, id) in ["a", "b", "c"].into_iter().enumerate() {
            let (mut workflow, mut steps) = seed(2);
            workflow.id = id.to_string();
            workflow.created_at = at(index as u32);
            for step in &mut steps {
                step.id = format!("{}-{}", id, step.id);
                step.workflow_id = id.to_string();
            }
            storage
                .insert_workflow(workflow, steps)
                .await
                .expect("insert workflow");
        }

        let limited = storage
            .workflows_with_steps(WorkflowFilter {
                limit: Some(2),
                ..WorkflowFilter::default()
            })
            .await
            .expect("listing");
        let ids: Vec<&str> = limited
            .iter()
            .map(|(workflow, _)| workflow.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert!(limited.iter().all(|(workflow, steps)| {
            steps.len() == 2 && steps.iter().all(|step| step.workflow_id == workflow.id)
        }));
        assert_eq!(limited[0].1[0].step_number, 1);

        let all = storage
            .workflows(WorkflowFilter::default())
            .await
            .expect("listing");
        assert_eq!(all.len(), 3);
    }
}
