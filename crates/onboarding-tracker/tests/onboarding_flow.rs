//! End-to-end onboarding flows against both storage backends.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use onboarding_tracker::{
    completion_percentage, CreateWorkflowRequest, Employee, EventBus, MemoryOnboardingStorage,
    OnboardingService, OnboardingStorage, SqliteOnboardingStorage, StepStatus, WorkflowFilter,
    WorkflowStatus,
};
use tempfile::{tempdir, TempDir};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0)
        .single()
        .expect("valid datetime")
}

fn new_hire(employee_id: &str) -> CreateWorkflowRequest {
    CreateWorkflowRequest {
        employee_id: employee_id.to_string(),
        template_name: "new_hire".to_string(),
        assigned_to: Some("Site Lead".to_string()),
        ..CreateWorkflowRequest::default()
    }
}

async fn sqlite_service() -> (OnboardingService, TempDir) {
    let dir = tempdir().expect("temp dir");
    let storage = SqliteOnboardingStorage::new(dir.path().join("onboarding.db"));
    storage.init().await.expect("init storage");
    (OnboardingService::new(Arc::new(storage), EventBus::detached()), dir)
}

fn memory_service() -> OnboardingService {
    OnboardingService::new(Arc::new(MemoryOnboardingStorage::new()), EventBus::detached())
}

async fn assert_invariants(service: &OnboardingService, workflow_id: &str) {
    let overview = service
        .workflow_overview(workflow_id)
        .await
        .expect("workflow overview");
    let workflow = &overview.workflow;
    let completed = overview
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::Completed)
        .count() as u32;

    assert_eq!(workflow.total_steps as usize, overview.steps.len());
    assert_eq!(
        workflow.completion_percentage,
        completion_percentage(completed, workflow.total_steps)
    );
    match workflow.status {
        WorkflowStatus::Completed => assert_eq!(workflow.completion_percentage, 100),
        WorkflowStatus::NotStarted => assert_eq!(completed, 0),
        WorkflowStatus::InProgress => {
            assert!(completed > 0);
            assert!(workflow.completion_percentage < 100);
        }
    }
    assert_eq!(
        workflow.actual_completion_date.is_some(),
        workflow.status == WorkflowStatus::Completed
    );
    for step in &overview.steps {
        assert_eq!(
            step.completed_date.is_some(),
            step.status == StepStatus::Completed
        );
    }
}

async fn run_in_order_flow(service: &OnboardingService) {
    let created = service
        .create_workflow_at(new_hire("emp-1"), base_time())
        .await
        .expect("create workflow");
    let workflow = &created.workflow;
    assert_eq!(workflow.total_steps, 5);
    assert_eq!(workflow.current_step, 1);
    assert_eq!(workflow.completion_percentage, 0);
    assert_eq!(workflow.status, WorkflowStatus::NotStarted);
    assert_invariants(service, &workflow.id).await;

    let first = service
        .complete_step_at(&created.steps[0].id, None, base_time() + Duration::hours(1))
        .await
        .expect("complete step 1");
    assert_eq!(first.workflow.completion_percentage, 20);
    assert_eq!(first.workflow.status, WorkflowStatus::InProgress);
    assert_eq!(first.workflow.current_step, 2);
    assert_invariants(service, &workflow.id).await;

    let mut last = first;
    for (offset, step) in created.steps.iter().enumerate().skip(1) {
        last = service
            .complete_step_at(
                &step.id,
                None,
                base_time() + Duration::hours(offset as i64 + 1),
            )
            .await
            .expect("complete step");
        assert_invariants(service, &workflow.id).await;
    }

    assert_eq!(last.workflow.completion_percentage, 100);
    assert_eq!(last.workflow.status, WorkflowStatus::Completed);
    assert_eq!(last.workflow.current_step, 6);
    assert_eq!(
        last.workflow.actual_completion_date,
        Some(base_time() + Duration::hours(5))
    );

    // Completion is one-way and replays change nothing.
    let replay = service
        .complete_step_at(&created.steps[0].id, None, base_time() + Duration::hours(9))
        .await
        .expect("replay completion");
    assert!(replay.already_completed);
    assert_eq!(replay.workflow, last.workflow);
    assert_eq!(
        replay.step.completed_date,
        Some(base_time() + Duration::hours(1))
    );
    assert!(service
        .start_step_at(&created.steps[0].id, base_time() + Duration::hours(9))
        .await
        .is_err());
}

async fn run_out_of_order_flow(service: &OnboardingService) {
    let created = service
        .create_workflow_at(new_hire("emp-2"), base_time())
        .await
        .expect("create workflow");

    let third = service
        .complete_step_at(&created.steps[2].id, None, base_time() + Duration::hours(1))
        .await
        .expect("complete step 3");
    let completed = service
        .workflow_overview(&created.workflow.id)
        .await
        .expect("overview")
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::Completed)
        .count();

    assert_eq!(completed, 1);
    assert_eq!(third.workflow.completion_percentage, 20);
    assert_eq!(third.workflow.current_step, 4);
    assert_eq!(third.workflow.status, WorkflowStatus::InProgress);

    // Completing an earlier step moves the marker back to that step + 1.
    let first = service
        .complete_step_at(&created.steps[0].id, None, base_time() + Duration::hours(2))
        .await
        .expect("complete step 1");
    assert_eq!(first.workflow.current_step, 2);
    assert_eq!(first.workflow.completion_percentage, 40);
    assert_invariants(service, &created.workflow.id).await;
}

async fn run_concurrent_flow(service: &OnboardingService) {
    let created = service
        .create_workflow_at(new_hire("emp-3"), base_time())
        .await
        .expect("create workflow");

    let mut handles = Vec::new();
    for step in created.steps.clone() {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .complete_step_at(&step.id, None, base_time() + Duration::minutes(5))
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("completion");
    }

    let overview = service
        .workflow_overview(&created.workflow.id)
        .await
        .expect("overview");
    assert_eq!(overview.workflow.completion_percentage, 100);
    assert_eq!(overview.workflow.status, WorkflowStatus::Completed);
    assert_invariants(service, &created.workflow.id).await;
}

async fn run_board_flow(service: &OnboardingService) {
    service
        .storage()
        .upsert_employee(Employee {
            id: "emp-10".to_string(),
            full_name: "Maria Lopez".to_string(),
            role: Some("Carpenter".to_string()),
            email: Some("maria@example.com".to_string()),
        })
        .await
        .expect("seed employee");

    let active = service
        .create_workflow_at(new_hire("emp-10"), base_time())
        .await
        .expect("create active");
    let done = service
        .create_workflow_at(
            CreateWorkflowRequest {
                employee_id: "emp-11".to_string(),
                template_name: "contractor".to_string(),
                ..CreateWorkflowRequest::default()
            },
            base_time() + Duration::minutes(1),
        )
        .await
        .expect("create contractor");
    for step in &done.steps {
        service
            .complete_step_at(&step.id, None, base_time() + Duration::hours(2))
            .await
            .expect("complete contractor step");
    }

    let board = service
        .board(WorkflowFilter::default())
        .await
        .expect("board");
    assert_eq!(board.active.len(), 1);
    assert_eq!(board.completed.len(), 1);
    assert_eq!(board.active[0].workflow.id, active.workflow.id);
    assert_eq!(
        board.active[0]
            .employee
            .as_ref()
            .map(|employee| employee.full_name.as_str()),
        Some("Maria Lopez")
    );
    assert_eq!(board.active[0].steps.len(), 5);
    assert_eq!(board.completed[0].workflow.id, done.workflow.id);
    assert!(board.completed[0].employee.is_none());

    let filtered = service
        .board(WorkflowFilter {
            employee_id: Some("emp-11".to_string()),
            status: Some(WorkflowStatus::Completed),
            limit: None,
        })
        .await
        .expect("filtered board");
    assert!(filtered.active.is_empty());
    assert_eq!(filtered.completed.len(), 1);
}

async fn run_limit_flow(service: &OnboardingService) {
    let mut created = Vec::new();
    for minute in 0..4 {
        let overview = service
            .create_workflow_at(
                new_hire(&format!("emp-limit-{}", minute)),
                base_time() + Duration::minutes(minute),
            )
            .await
            .expect("create workflow");
        created.push(overview.workflow.id);
    }

    let board = service
        .board(WorkflowFilter {
            limit: Some(3),
            ..WorkflowFilter::default()
        })
        .await
        .expect("limited board");
    let ids: Vec<&str> = board
        .active
        .iter()
        .map(|overview| overview.workflow.id.as_str())
        .collect();
    assert_eq!(ids, vec![created[3].as_str(), created[2].as_str(), created[1].as_str()]);
    assert!(board.active.iter().all(|overview| overview.steps.len() == 5));

    let board = service
        .board(WorkflowFilter {
            limit: Some(u32::MAX),
            ..WorkflowFilter::default()
        })
        .await
        .expect("capped board");
    assert_eq!(board.active.len(), 4);
}

#[tokio::test]
async fn sqlite_in_order_completion() {
    let (service, _dir) = sqlite_service().await;
    run_in_order_flow(&service).await;
}

#[tokio::test]
async fn memory_in_order_completion() {
    run_in_order_flow(&memory_service()).await;
}

#[tokio::test]
async fn sqlite_out_of_order_completion() {
    let (service, _dir) = sqlite_service().await;
    run_out_of_order_flow(&service).await;
}

#[tokio::test]
async fn memory_out_of_order_completion() {
    run_out_of_order_flow(&memory_service()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_concurrent_completions() {
    let (service, _dir) = sqlite_service().await;
    run_concurrent_flow(&service).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_concurrent_completions() {
    run_concurrent_flow(&memory_service()).await;
}

#[tokio::test]
async fn sqlite_board_partitions_and_joins() {
    let (service, _dir) = sqlite_service().await;
    run_board_flow(&service).await;
}

#[tokio::test]
async fn memory_board_partitions_and_joins() {
    run_board_flow(&memory_service()).await;
}

#[tokio::test]
async fn sqlite_board_limit() {
    let (service, _dir) = sqlite_service().await;
    run_limit_flow(&service).await;
}

#[tokio::test]
async fn memory_board_limit() {
    run_limit_flow(&memory_service()).await;
}
