use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use onboarding_tracker::{
    all_templates, CreateWorkflowRequest, Employee, EventBus, OnboardingConfig, OnboardingEvent,
    OnboardingService, OnboardingStorage, SqliteOnboardingStorage, WorkflowFilter, WorkflowStatus,
};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod output;

#[derive(Parser)]
#[command(name = "onboarding-cli")]
#[command(about = "Manage employee onboarding workflows")]
#[command(version)]
struct Cli {
    /// SQLite database file (overrides config and ONBOARDING_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true, default_value = "false")]
    debug: bool,

    /// Print JSON instead of text
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in onboarding templates
    Templates,
    /// Manage employee records used for display joins
    Employee {
        #[command(subcommand)]
        action: EmployeeCommands,
    },
    /// Start an onboarding workflow for an employee
    Create {
        #[arg(long)]
        employee: String,
        #[arg(long, default_value = "new_hire")]
        template: String,
        /// Expected completion date (YYYY-MM-DD)
        #[arg(long)]
        expected: Option<NaiveDate>,
        /// Start date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Mark a step as in progress
    StartStep { step_id: String },
    /// Mark a step as completed and recompute its workflow
    CompleteStep {
        step_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show one workflow with its steps
    Show { workflow_id: String },
    /// List workflows split into active and completed
    List {
        #[arg(long)]
        employee: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<WorkflowStatus>,
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[derive(Subcommand)]
enum EmployeeCommands {
    /// Add or update an employee record
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
}

fn parse_status(value: &str) -> Result<WorkflowStatus, String> {
    WorkflowStatus::from_db(value).ok_or_else(|| {
        format!(
            "unknown status '{}', expected not_started, in_progress or completed",
            value
        )
    })
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = OnboardingConfig::load();
    if let Some(db) = cli.db.clone() {
        config.database_path = db;
    }
    tracing::debug!("using onboarding database {}", config.database_path.display());

    let storage = SqliteOnboardingStorage::new(&config.database_path);
    storage.init().await.with_context(|| {
        format!(
            "failed to initialize database {}",
            config.database_path.display()
        )
    })?;

    let (bus, events) = EventBus::new(config.event_capacity);
    let drain = tokio::spawn(drain_events(events));

    let service = OnboardingService::new(Arc::new(storage), bus.clone())
        .with_default_assignee(config.default_assignee.clone());

    let result = run(cli.command, &service, cli.json).await;

    // The drain task ends once every sender is gone.
    drop(service);
    if bus.dropped_count() > 0 {
        tracing::warn!("{} onboarding events were dropped", bus.dropped_count());
    }
    bus.emit_dropped_notification();
    drop(bus);
    match drain.await {
        Ok(count) => tracing::debug!("drained {} onboarding events", count),
        Err(error) => tracing::warn!("onboarding event drain failed: {}", error),
    }

    result
}

/// Log every event until the bus closes. Returns how many were received.
async fn drain_events(mut events: mpsc::Receiver<OnboardingEvent>) -> usize {
    let mut received = 0;
    while let Some(event) = events.recv().await {
        received += 1;
        match &event {
            OnboardingEvent::EventsDropped { count } => {
                tracing::warn!(dropped = *count, "onboarding event bus overflowed");
            }
            _ => tracing::debug!(
                event = event.name(),
                workflow_id = event.workflow_id().unwrap_or("-"),
                "onboarding event"
            ),
        }
    }
    received
}

async fn run(command: Commands, service: &OnboardingService, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Templates => {
            let templates = all_templates();
            if json {
                println!("{}", serde_json::to_string_pretty(templates)?);
            } else {
                output::print_templates(templates);
            }
        }
        Commands::Employee {
            action:
                EmployeeCommands::Add {
                    id,
                    name,
                    role,
                    email,
                },
        } => {
            let employee = Employee {
                id,
                full_name: name,
                role,
                email,
            };
            service
                .storage()
                .upsert_employee(employee.clone())
                .await
                .context("failed to save employee")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&employee)?);
            } else {
                println!("Saved employee {} ({})", employee.full_name, employee.id);
            }
        }
        Commands::Create {
            employee,
            template,
            expected,
            start,
            assignee,
            notes,
        } => {
            let overview = service
                .create_workflow(CreateWorkflowRequest {
                    employee_id: employee,
                    template_name: template,
                    expected_completion_date: expected,
                    started_date: start,
                    assigned_to: assignee,
                    notes,
                })
                .await
                .context("failed to create workflow")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
            } else {
                output::print_overview(&overview);
            }
        }
        Commands::StartStep { step_id } => {
            let step = service
                .start_step(&step_id)
                .await
                .context("failed to start step")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&step)?);
            } else {
                println!(
                    "Step {} '{}' is {}",
                    step.step_number,
                    step.title,
                    output::step_status_label(step.status)
                );
            }
        }
        Commands::CompleteStep { step_id, notes } => {
            let completion = service
                .complete_step(&step_id, notes)
                .await
                .context("failed to complete step")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&completion)?);
            } else {
                output::print_completion(&completion);
            }
        }
        Commands::Show { workflow_id } => {
            let overview = service
                .workflow_overview(&workflow_id)
                .await
                .context("failed to load workflow")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
            } else {
                output::print_overview(&overview);
            }
        }
        Commands::List {
            employee,
            status,
            limit,
        } => {
            let board = service
                .board(WorkflowFilter {
                    employee_id: employee,
                    status,
                    limit,
                })
                .await
                .context("failed to list workflows")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&board)?);
            } else {
                output::print_board(&board);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use onboarding_tracker::EventMeta;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn list_parses_status_and_rejects_unknown_values() {
        let cli = Cli::try_parse_from(["onboarding-cli", "list", "--status", "in_progress"])
            .expect("valid args");
        match cli.command {
            Commands::List { status, .. } => assert_eq!(status, Some(WorkflowStatus::InProgress)),
            _ => panic!("expected list command"),
        }

        assert!(Cli::try_parse_from(["onboarding-cli", "list", "--status", "done"]).is_err());
    }

    #[tokio::test]
    async fn drain_receives_queued_events_and_drop_notice() {
        let (bus, mut events) = EventBus::new(2);
        for step_number in 1..=3 {
            bus.emit(OnboardingEvent::StepStarted {
                meta: EventMeta::new(),
                workflow_id: "wf".to_string(),
                step_id: format!("s{}", step_number),
                step_number,
            });
        }
        assert_eq!(bus.dropped_count(), 1);

        events.recv().await.expect("first queued event");
        bus.emit_dropped_notification();
        drop(bus);

        // One queued event and the drop notice remain after every sender is gone.
        assert_eq!(drain_events(events).await, 2);
    }

    #[test]
    fn employee_add_is_nested() {
        let cli = Cli::try_parse_from([
            "onboarding-cli",
            "employee",
            "add",
            "--id",
            "emp-9",
            "--name",
            "Lee Park",
        ])
        .expect("valid args");
        match cli.command {
            Commands::Employee {
                action: EmployeeCommands::Add { id, name, role, .. },
            } => {
                assert_eq!(id, "emp-9");
                assert_eq!(name, "Lee Park");
                assert_eq!(role, None);
            }
            _ => panic!("expected employee add command"),
        }
    }

    #[test]
    fn create_parses_dates() {
        let cli = Cli::try_parse_from([
            "onboarding-cli",
            "--json",
            "create",
            "--employee",
            "emp-1",
            "--expected",
            "2026-07-01",
        ])
        .expect("valid args");
        assert!(cli.json);
        match cli.command {
            Commands::Create {
                employee,
                template,
                expected,
                ..
            } => {
                assert_eq!(employee, "emp-1");
                assert_eq!(template, "new_hire");
                assert_eq!(expected, NaiveDate::from_ymd_opt(2026, 7, 1));
            }
            _ => panic!("expected create command"),
        }
    }
}
