//! Built-in onboarding templates.
//!
//! Templates are static. A workflow copies the step definitions when it is
//! created, so editing this catalog never changes existing workflows.

use serde::Serialize;

use crate::types::StepType;

pub const DEFAULT_TEMPLATE: &str = "new_hire";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StepDefinition {
    pub title: &'static str,
    pub description: &'static str,
    pub step_type: StepType,
    /// Role responsible for the step. `None` means the workflow assignee.
    pub assignee_role: Option<&'static str>,
    pub estimated_duration_hours: u32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct WorkflowTemplate {
    pub name: &'static str,
    pub label: &'static str,
    pub steps: &'static [StepDefinition],
}

impl WorkflowTemplate {
    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn estimated_total_hours(&self) -> u32 {
        self.steps
            .iter()
            .map(|step| step.estimated_duration_hours)
            .sum()
    }
}

const NEW_HIRE_STEPS: &[StepDefinition] = &[
    StepDefinition {
        title: "Complete employment paperwork",
        description: "W-4, I-9, direct deposit and emergency contact forms",
        step_type: StepType::Document,
        assignee_role: Some("HR"),
        estimated_duration_hours: 2,
    },
    StepDefinition {
        title: "Safety orientation",
        description: "Company safety program, OSHA 10 verification and site rules",
        step_type: StepType::Training,
        assignee_role: Some("Safety Manager"),
        estimated_duration_hours: 4,
    },
    StepDefinition {
        title: "Issue PPE and equipment",
        description: "Hard hat, vest, glasses, gloves and assigned tools",
        step_type: StepType::Equipment,
        assignee_role: Some("Equipment Manager"),
        estimated_duration_hours: 1,
    },
    StepDefinition {
        title: "Jobsite walkthrough",
        description: "Tour of the active site, muster points and crew introductions",
        step_type: StepType::Meeting,
        assignee_role: None,
        estimated_duration_hours: 2,
    },
    StepDefinition {
        title: "30-day check-in",
        description: "Supervisor review of progress, questions and training gaps",
        step_type: StepType::Review,
        assignee_role: Some("Supervisor"),
        estimated_duration_hours: 1,
    },
];

const CONTRACTOR_STEPS: &[StepDefinition] = &[
    StepDefinition {
        title: "Verify insurance and license",
        description: "Certificate of insurance, trade license and W-9 on file",
        step_type: StepType::Document,
        assignee_role: Some("Project Manager"),
        estimated_duration_hours: 1,
    },
    StepDefinition {
        title: "Sign subcontract agreement",
        description: "Scope, schedule and payment terms signed by both parties",
        step_type: StepType::Document,
        assignee_role: Some("Project Manager"),
        estimated_duration_hours: 1,
    },
    StepDefinition {
        title: "Site safety orientation",
        description: "Site-specific hazards, JSA process and emergency procedures",
        step_type: StepType::Training,
        assignee_role: Some("Safety Manager"),
        estimated_duration_hours: 2,
    },
    StepDefinition {
        title: "Badge and site access",
        description: "Issue site badge and gate access for the contract period",
        step_type: StepType::Task,
        assignee_role: None,
        estimated_duration_hours: 1,
    },
];

const INTERN_STEPS: &[StepDefinition] = &[
    StepDefinition {
        title: "Intern paperwork",
        description: "Offer letter, school agreement and payroll forms",
        step_type: StepType::Document,
        assignee_role: Some("HR"),
        estimated_duration_hours: 1,
    },
    StepDefinition {
        title: "Safety basics",
        description: "Introductory safety training and PPE fitting",
        step_type: StepType::Training,
        assignee_role: Some("Safety Manager"),
        estimated_duration_hours: 3,
    },
    StepDefinition {
        title: "Meet your mentor",
        description: "Kickoff meeting with the assigned mentor",
        step_type: StepType::Meeting,
        assignee_role: None,
        estimated_duration_hours: 1,
    },
    StepDefinition {
        title: "Shadowing plan",
        description: "Agree on the projects and crews the intern will shadow",
        step_type: StepType::Task,
        assignee_role: None,
        estimated_duration_hours: 2,
    },
];

const TEMPLATES: &[WorkflowTemplate] = &[
    WorkflowTemplate {
        name: "new_hire",
        label: "New hire",
        steps: NEW_HIRE_STEPS,
    },
    WorkflowTemplate {
        name: "contractor",
        label: "Contractor",
        steps: CONTRACTOR_STEPS,
    },
    WorkflowTemplate {
        name: "intern",
        label: "Intern",
        steps: INTERN_STEPS,
    },
];

pub fn all_templates() -> &'static [WorkflowTemplate] {
    TEMPLATES
}

/// Look up a template by key. Unknown keys resolve to `new_hire`.
pub fn resolve_template(name: &str) -> &'static WorkflowTemplate {
    find_template(name).unwrap_or_else(|| {
        log::debug!(
            "unknown onboarding template '{}', falling back to {}",
            name,
            DEFAULT_TEMPLATE
        );
        &TEMPLATES[0]
    })
}

pub fn find_template(name: &str) -> Option<&'static WorkflowTemplate> {
    TEMPLATES.iter().find(|template| template.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_hire_has_five_steps() {
        let template = resolve_template("new_hire");
        assert_eq!(template.name, "new_hire");
        assert_eq!(template.step_count(), 5);
        assert_eq!(template.estimated_total_hours(), 10);
    }

    #[test]
    fn unknown_name_falls_back_to_new_hire() {
        for name in ["", "NEW_HIRE", "seasonal", "new-hire"] {
            let template = resolve_template(name);
            assert_eq!(template.name, DEFAULT_TEMPLATE, "name {name:?}");
            assert_eq!(template.steps, NEW_HIRE_STEPS);
        }
    }

    #[test]
    fn catalog_keys_are_unique_and_non_empty() {
        let names: Vec<&str> = all_templates().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["new_hire", "contractor", "intern"]);
        for template in all_templates() {
            assert!(!template.steps.is_empty(), "{} has no steps", template.name);
            assert_eq!(resolve_template(template.name).name, template.name);
        }
    }
}
