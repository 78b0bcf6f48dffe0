use colored::Colorize;
use onboarding_tracker::{
    StepCompletion, StepStatus, WorkflowBoard, WorkflowOverview, WorkflowStatus, WorkflowTemplate,
};

pub fn step_status_label(status: StepStatus) -> String {
    match status {
        StepStatus::Pending => status.as_str().dimmed().to_string(),
        StepStatus::InProgress => status.as_str().yellow().to_string(),
        StepStatus::Completed => status.as_str().green().to_string(),
    }
}

fn workflow_status_label(status: WorkflowStatus) -> String {
    match status {
        WorkflowStatus::NotStarted => status.as_str().dimmed().to_string(),
        WorkflowStatus::InProgress => status.as_str().yellow().to_string(),
        WorkflowStatus::Completed => status.as_str().green().to_string(),
    }
}

fn progress_bar(percentage: u8) -> String {
    let filled = usize::from(percentage.min(100)) / 5;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(20 - filled))
}

pub fn print_templates(templates: &[WorkflowTemplate]) {
    for template in templates {
        println!(
            "{} {} ({} steps, ~{}h)",
            template.name.cyan().bold(),
            template.label,
            template.step_count(),
            template.estimated_total_hours()
        );
        for (index, step) in template.steps.iter().enumerate() {
            println!(
                "  {}. {} [{}] {}",
                index + 1,
                step.title,
                step.step_type.as_str(),
                step.assignee_role.unwrap_or("workflow assignee").dimmed()
            );
        }
    }
}

fn print_header(overview: &WorkflowOverview) {
    let workflow = &overview.workflow;
    let employee = overview
        .employee
        .as_ref()
        .map(|employee| format!("{} ({})", employee.full_name, employee.id))
        .unwrap_or_else(|| workflow.employee_id.clone());

    println!(
        "{} {} {}",
        "Workflow".bold(),
        workflow.id.cyan(),
        workflow.template_name.dimmed()
    );
    println!("  Employee: {}", employee);
    println!(
        "  Progress: {} {}% {}",
        progress_bar(workflow.completion_percentage),
        workflow.completion_percentage,
        workflow_status_label(workflow.status)
    );
    if let Some(assignee) = &workflow.assigned_to {
        println!("  Assigned: {}", assignee);
    }
    if let Some(expected) = workflow.expected_completion_date {
        println!("  Expected: {}", expected);
    }
    if let Some(done) = workflow.actual_completion_date {
        println!("  Finished: {}", done.format("%Y-%m-%d %H:%M"));
    }
}

pub fn print_overview(overview: &WorkflowOverview) {
    print_header(overview);
    println!("{}", "─".repeat(50).dimmed());
    for step in &overview.steps {
        let marker = if step.step_number == overview.workflow.current_step {
            ">".cyan().bold().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {}. {} [{}] {}",
            marker,
            step.step_number,
            step.title,
            step_status_label(step.status),
            step.id.dimmed()
        );
    }
}

pub fn print_completion(completion: &StepCompletion) {
    if completion.already_completed {
        println!(
            "{}",
            format!(
                "Step {} '{}' was already completed",
                completion.step.step_number, completion.step.title
            )
            .yellow()
        );
    } else {
        println!(
            "{}",
            format!(
                "Completed step {} '{}'",
                completion.step.step_number, completion.step.title
            )
            .green()
        );
    }
    println!(
        "Workflow {} {} {}%",
        completion.workflow.id.cyan(),
        workflow_status_label(completion.workflow.status),
        completion.workflow.completion_percentage
    );
    if completion.completed_workflow() {
        println!("{}", "Onboarding finished".green().bold());
    }
}

pub fn print_board(board: &WorkflowBoard) {
    println!("{} ({})", "Active".bold(), board.active.len());
    for overview in &board.active {
        print_row(overview);
    }
    println!("{} ({})", "Completed".bold(), board.completed.len());
    for overview in &board.completed {
        print_row(overview);
    }
}

fn print_row(overview: &WorkflowOverview) {
    let workflow = &overview.workflow;
    let name = overview
        .employee
        .as_ref()
        .map(|employee| employee.full_name.as_str())
        .unwrap_or(workflow.employee_id.as_str());
    println!(
        "  {} {:<24} {:>3}% step {}/{} {}",
        workflow.id.cyan(),
        name,
        workflow.completion_percentage,
        workflow.current_step.min(workflow.total_steps),
        workflow.total_steps,
        workflow.template_name.dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::progress_bar;

    #[test]
    fn progress_bar_scales_to_twenty_cells() {
        assert_eq!(progress_bar(0), format!("[{}]", "-".repeat(20)));
        assert_eq!(progress_bar(50), format!("[{}{}]", "#".repeat(10), "-".repeat(10)));
        assert_eq!(progress_bar(100), format!("[{}]", "#".repeat(20)));
    }
}
