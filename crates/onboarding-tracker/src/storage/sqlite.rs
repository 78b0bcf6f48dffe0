use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{
    completed_step, effective_limit, started_step, validate_new_workflow, OnboardingStorage,
    StorageError, StorageResult,
};
use crate::progress::recompute_workflow;
use crate::types::{
    Employee, StepCompletion, StepStart, StepStatus, StepType, Workflow, WorkflowFilter,
    WorkflowStatus, WorkflowStep,
};

const WORKFLOW_COLUMNS: &str = "id, employee_id, template_name, current_step, total_steps, completion_percentage, status, assigned_to, notes, started_date, expected_completion_date, actual_completion_date, created_at, updated_at";

const STEP_COLUMNS: &str = "id, workflow_id, step_number, title, description, step_type, assigned_to, status, estimated_duration_hours, started_at, completed_date, notes";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SqliteOnboardingStorage {
    db_path: PathBuf,
}

impl SqliteOnboardingStorage {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_connection<T, F>(&self, func: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&db_path)?;
            func(&mut connection)
        })
        .await
        .map_err(|error| StorageError::Task(error.to_string()))?
    }
}

#[async_trait]
impl OnboardingStorage for SqliteOnboardingStorage {
    async fn init(&self) -> StorageResult<()> {
        self.with_connection(|connection| {
            connection.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS employees (
                    id TEXT PRIMARY KEY,
                    full_name TEXT NOT NULL,
                    role TEXT,
                    email TEXT
                );

                CREATE TABLE IF NOT EXISTS onboarding_workflows (
                    id TEXT PRIMARY KEY,
                    employee_id TEXT NOT NULL,
                    template_name TEXT NOT NULL,
                    current_step INTEGER NOT NULL DEFAULT 1,
                    total_steps INTEGER NOT NULL CHECK (total_steps > 0),
                    completion_percentage INTEGER NOT NULL DEFAULT 0
                        CHECK (completion_percentage BETWEEN 0 AND 100),
                    status TEXT NOT NULL DEFAULT 'not_started',
                    assigned_to TEXT,
                    notes TEXT,
                    started_date TEXT,
                    expected_completion_date TEXT,
                    actual_completion_date TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS onboarding_steps (
                    id TEXT PRIMARY KEY,
                    workflow_id TEXT NOT NULL,
                    step_number INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    step_type TEXT NOT NULL,
                    assigned_to TEXT,
                    status TEXT NOT NULL DEFAULT 'pending',
                    estimated_duration_hours INTEGER NOT NULL DEFAULT 0,
                    started_at TEXT,
                    completed_date TEXT,
                    notes TEXT,
                    UNIQUE(workflow_id, step_number),
                    FOREIGN KEY(workflow_id) REFERENCES onboarding_workflows(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_workflow_employee ON onboarding_workflows(employee_id);
                CREATE INDEX IF NOT EXISTS idx_workflow_status ON onboarding_workflows(status);
                CREATE INDEX IF NOT EXISTS idx_step_workflow ON onboarding_steps(workflow_id);
                "#,
            )?;
            Ok(())
        })
        .await
    }

    async fn upsert_employee(&self, employee: Employee) -> StorageResult<()> {
        self.with_connection(move |connection| {
            connection.execute(
                r#"
                INSERT INTO employees (id, full_name, role, email)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    full_name = excluded.full_name,
                    role = excluded.role,
                    email = excluded.email
                "#,
                params![employee.id, employee.full_name, employee.role, employee.email],
            )?;
            Ok(())
        })
        .await
    }

    async fn employee(&self, employee_id: &str) -> StorageResult<Option<Employee>> {
        let employee_id = employee_id.to_string();
        self.with_connection(move |connection| {
            let employee = connection
                .query_row(
                    "SELECT id, full_name, role, email FROM employees WHERE id = ?1",
                    params![employee_id],
                    |row| {
                        Ok(Employee {
                            id: row.get(0)?,
                            full_name: row.get(1)?,
                            role: row.get(2)?,
                            email: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(employee)
        })
        .await
    }

    async fn employees(
        &self,
        employee_ids: &[String],
    ) -> StorageResult<HashMap<String, Employee>> {
        if employee_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let employee_ids = employee_ids.to_vec();

        self.with_connection(move |connection| {
            let placeholders = vec!["?"; employee_ids.len()].join(", ");
            let sql = format!(
                "SELECT id, full_name, role, email FROM employees WHERE id IN ({})",
                placeholders
            );
            let mut stmt = connection.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(employee_ids.iter()))?;
            let mut employees = HashMap::new();

            while let Some(row) = rows.next()? {
                let employee = Employee {
                    id: row.get(0)?,
                    full_name: row.get(1)?,
                    role: row.get(2)?,
                    email: row.get(3)?,
                };
                employees.insert(employee.id.clone(), employee);
            }

            Ok(employees)
        })
        .await
    }

    async fn insert_workflow(
        &self,
        workflow: Workflow,
        steps: Vec<WorkflowStep>,
    ) -> StorageResult<()> {
        validate_new_workflow(&workflow, &steps)?;

        self.with_connection(move |connection| {
            let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                &format!(
                    "INSERT INTO onboarding_workflows ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    WORKFLOW_COLUMNS
                ),
                params![
                    workflow.id,
                    workflow.employee_id,
                    workflow.template_name,
                    i64::from(workflow.current_step),
                    i64::from(workflow.total_steps),
                    i64::from(workflow.completion_percentage),
                    workflow.status.as_str(),
                    workflow.assigned_to,
                    workflow.notes,
                    workflow.started_date.map(format_date),
                    workflow.expected_completion_date.map(format_date),
                    workflow.actual_completion_date.map(format_timestamp),
                    format_timestamp(workflow.created_at),
                    format_timestamp(workflow.updated_at),
                ],
            )?;

            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO onboarding_steps ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    STEP_COLUMNS
                ))?;
                for step in &steps {
                    stmt.execute(params![
                        step.id,
                        step.workflow_id,
                        i64::from(step.step_number),
                        step.title,
                        step.description,
                        step.step_type.as_str(),
                        step.assigned_to,
                        step.status.as_str(),
                        i64::from(step.estimated_duration_hours),
                        step.started_at.map(format_timestamp),
                        step.completed_date.map(format_timestamp),
                        step.notes,
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn workflow(&self, workflow_id: &str) -> StorageResult<Option<Workflow>> {
        let workflow_id = workflow_id.to_string();
        self.with_connection(move |connection| load_workflow(connection, &workflow_id))
            .await
    }

    async fn workflows(&self, filter: WorkflowFilter) -> StorageResult<Vec<Workflow>> {
        self.with_connection(move |connection| load_workflows(connection, &filter))
            .await
    }

    async fn step(&self, step_id: &str) -> StorageResult<Option<WorkflowStep>> {
        let step_id = step_id.to_string();
        self.with_connection(move |connection| load_step(connection, &step_id))
            .await
    }

    async fn steps_for_workflow(&self, workflow_id: &str) -> StorageResult<Vec<WorkflowStep>> {
        let workflow_id = workflow_id.to_string();
        self.with_connection(move |connection| load_steps(connection, &workflow_id))
            .await
    }

    async fn workflow_with_steps(
        &self,
        workflow_id: &str,
    ) -> StorageResult<Option<(Workflow, Vec<WorkflowStep>)>> {
        let workflow_id = workflow_id.to_string();

        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            let Some(workflow) = load_workflow(&tx, &workflow_id)? else {
                return Ok(None);
            };
            let steps = load_steps(&tx, &workflow_id)?;
            tx.commit()?;
            Ok(Some((workflow, steps)))
        })
        .await
    }

    async fn workflows_with_steps(
        &self,
        filter: WorkflowFilter,
    ) -> StorageResult<Vec<(Workflow, Vec<WorkflowStep>)>> {
        self.with_connection(move |connection| {
            let tx = connection.transaction()?;
            let workflows = load_workflows(&tx, &filter)?;
            let mut grouped = load_steps_for_filter(&tx, &filter)?;
            tx.commit()?;

            Ok(workflows
                .into_iter()
                .map(|workflow| {
                    let steps = grouped.remove(&workflow.id).unwrap_or_default();
                    (workflow, steps)
                })
                .collect())
        })
        .await
    }

    async fn start_step(
        &self,
        step_id: &str,
        started_at: DateTime<Utc>,
    ) -> StorageResult<StepStart> {
        let step_id = step_id.to_string();

        self.with_connection(move |connection| {
            let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let step = load_step(&tx, &step_id)?
                .ok_or_else(|| StorageError::StepNotFound(step_id.clone()))?;

            let Some(started) = started_step(&step, started_at)? else {
                return Ok(StepStart {
                    step,
                    changed: false,
                });
            };

            tx.execute(
                "UPDATE onboarding_steps SET status = ?1, started_at = ?2 WHERE id = ?3",
                params![
                    started.status.as_str(),
                    started.started_at.map(format_timestamp),
                    started.id
                ],
            )?;
            tx.commit()?;
            Ok(StepStart {
                step: started,
                changed: true,
            })
        })
        .await
    }

    async fn complete_step(
        &self,
        step_id: &str,
        completed_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> StorageResult<StepCompletion> {
        let step_id = step_id.to_string();

        self.with_connection(move |connection| {
            let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let step = load_step(&tx, &step_id)?
                .ok_or_else(|| StorageError::StepNotFound(step_id.clone()))?;
            let workflow = load_workflow(&tx, &step.workflow_id)?
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
            tx.execute(
                "UPDATE onboarding_steps SET status = ?1, completed_date = ?2, notes = ?3 WHERE id = ?4",
                params![
                    completed.status.as_str(),
                    completed.completed_date.map(format_timestamp),
                    completed.notes,
                    completed.id
                ],
            )?;

            let steps = load_steps(&tx, &workflow.id)?;
            let updated = recompute_workflow(&workflow, &steps, completed.step_number, completed_at);
            tx.execute(
                r#"
                UPDATE onboarding_workflows
                SET current_step = ?1,
                    completion_percentage = ?2,
                    status = ?3,
                    actual_completion_date = ?4,
                    updated_at = ?5
                WHERE id = ?6
                "#,
                params![
                    i64::from(updated.current_step),
                    i64::from(updated.completion_percentage),
                    updated.status.as_str(),
                    updated.actual_completion_date.map(format_timestamp),
                    format_timestamp(updated.updated_at),
                    updated.id,
                ],
            )?;
            tx.commit()?;

            Ok(StepCompletion {
                step: completed,
                workflow: updated,
                previous_status: workflow.status,
                already_completed: false,
            })
        })
        .await
    }
}

fn open_connection(path: &Path) -> StorageResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

fn parse_timestamp(raw: String) -> StorageResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
}

fn parse_optional_timestamp(raw: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    raw.map(parse_timestamp).transpose()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_optional_date(raw: Option<String>) -> StorageResult<Option<NaiveDate>> {
    raw.map(|value| NaiveDate::parse_from_str(&value, "%Y-%m-%d"))
        .transpose()
        .map_err(StorageError::from)
}

fn load_workflow(connection: &Connection, workflow_id: &str) -> StorageResult<Option<Workflow>> {
    let sql = format!(
        "SELECT {} FROM onboarding_workflows WHERE id = ?1",
        WORKFLOW_COLUMNS
    );
    let mut stmt = connection.prepare(&sql)?;
    let mut rows = stmt.query(params![workflow_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_workflow(row)?)),
        None => Ok(None),
    }
}

/// WHERE clause and bound values selecting the workflows a filter matches.
fn filter_clause(filter: &WorkflowFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(employee_id) = &filter.employee_id {
        conditions.push("employee_id = ?");
        values.push(employee_id.clone());
    }
    if let Some(status) = filter.status {
        conditions.push("status = ?");
        values.push(status.as_str().to_string());
    }

    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (where_sql, values)
}

fn filtered_ids_sql(where_sql: &str, filter: &WorkflowFilter) -> String {
    format!(
        "SELECT id FROM onboarding_workflows {} ORDER BY created_at DESC, id ASC LIMIT {}",
        where_sql,
        effective_limit(filter)
    )
}

fn load_workflows(
    connection: &Connection,
    filter: &WorkflowFilter,
) -> StorageResult<Vec<Workflow>> {
    let (where_sql, values) = filter_clause(filter);
    let sql = format!(
        "SELECT {} FROM onboarding_workflows {} ORDER BY created_at DESC, id ASC LIMIT {}",
        WORKFLOW_COLUMNS,
        where_sql,
        effective_limit(filter)
    );

    let mut stmt = connection.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut workflows = Vec::new();

    while let Some(row) = rows.next()? {
        workflows.push(read_workflow(row)?);
    }

    Ok(workflows)
}

/// Steps of every workflow the filter selects, keyed by workflow id.
fn load_steps_for_filter(
    connection: &Connection,
    filter: &WorkflowFilter,
) -> StorageResult<HashMap<String, Vec<WorkflowStep>>> {
    let (where_sql, values) = filter_clause(filter);
    let sql = format!(
        "SELECT {} FROM onboarding_steps WHERE workflow_id IN ({}) ORDER BY workflow_id, step_number ASC",
        STEP_COLUMNS,
        filtered_ids_sql(&where_sql, filter)
    );

    let mut stmt = connection.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut grouped: HashMap<String, Vec<WorkflowStep>> = HashMap::new();

    while let Some(row) = rows.next()? {
        let step = read_step(row)?;
        grouped.entry(step.workflow_id.clone()).or_default().push(step);
    }

    Ok(grouped)
}

fn load_step(connection: &Connection, step_id: &str) -> StorageResult<Option<WorkflowStep>> {
    let sql = format!("SELECT {} FROM onboarding_steps WHERE id = ?1", STEP_COLUMNS);
    let mut stmt = connection.prepare(&sql)?;
    let mut rows = stmt.query(params![step_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_step(row)?)),
        None => Ok(None),
    }
}

fn load_steps(connection: &Connection, workflow_id: &str) -> StorageResult<Vec<WorkflowStep>> {
    let sql = format!(
        "SELECT {} FROM onboarding_steps WHERE workflow_id = ?1 ORDER BY step_number ASC",
        STEP_COLUMNS
    );
    let mut stmt = connection.prepare(&sql)?;
    let mut rows = stmt.query(params![workflow_id])?;
    let mut steps = Vec::new();

    while let Some(row) = rows.next()? {
        steps.push(read_step(row)?);
    }

    Ok(steps)
}

fn read_count(row: &Row<'_>, index: usize, column: &str) -> StorageResult<u32> {
    let raw: i64 = row.get(index)?;
    u32::try_from(raw)
        .map_err(|_| StorageError::InvalidData(format!("{} out of range: {}", column, raw)))
}

fn read_percentage(row: &Row<'_>, index: usize) -> StorageResult<u8> {
    let raw: i64 = row.get(index)?;
    u8::try_from(raw)
        .ok()
        .filter(|percentage| *percentage <= 100)
        .ok_or_else(|| {
            StorageError::InvalidData(format!("completion_percentage out of range: {}", raw))
        })
}

fn read_workflow(row: &Row<'_>) -> StorageResult<Workflow> {
    let status_raw: String = row.get(6)?;
    let status = WorkflowStatus::from_db(&status_raw).ok_or_else(|| {
        StorageError::InvalidData(format!("unknown workflow status: {}", status_raw))
    })?;

    Ok(Workflow {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        template_name: row.get(2)?,
        current_step: read_count(row, 3, "current_step")?,
        total_steps: read_count(row, 4, "total_steps")?,
        completion_percentage: read_percentage(row, 5)?,
        status,
        assigned_to: row.get(7)?,
        notes: row.get(8)?,
        started_date: parse_optional_date(row.get(9)?)?,
        expected_completion_date: parse_optional_date(row.get(10)?)?,
        actual_completion_date: parse_optional_timestamp(row.get(11)?)?,
        created_at: parse_timestamp(row.get(12)?)?,
        updated_at: parse_timestamp(row.get(13)?)?,
    })
}

fn read_step(row: &Row<'_>) -> StorageResult<WorkflowStep> {
    let step_type_raw: String = row.get(5)?;
    let step_type = StepType::from_db(&step_type_raw).ok_or_else(|| {
        StorageError::InvalidData(format!("unknown step type: {}", step_type_raw))
    })?;
    let status_raw: String = row.get(7)?;
    let status = StepStatus::from_db(&status_raw).ok_or_else(|| {
        StorageError::InvalidData(format!("unknown step status: {}", status_raw))
    })?;

    Ok(WorkflowStep {
        id: row.get(0)?,
        workflow_id: row.get(1)?,
        step_number: read_count(row, 2, "step_number")?,
        title: row.get(3)?,
        description: row.get(4)?,
        step_type,
        assigned_to: row.get(6)?,
        status,
        estimated_duration_hours: read_count(row, 8, "estimated_duration_hours")?,
        started_at: parse_optional_timestamp(row.get(9)?)?,
        completed_date: parse_optional_timestamp(row.get(10)?)?,
        notes: row.get(11)?,
    })
}
