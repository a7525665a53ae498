//! `PromptBuilder`: a pure function from phase context to the text the
//! Agent receives.
//!
//! Builds prompt strings through plain `format!` composition rather than a
//! template engine, since every prompt here is generated from live workflow
//! state rather than loaded from a template file.

use crate::state::{Phase, Plan, PrMetrics, WorkflowType};

#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub phase: Phase,
    pub workflow_type: WorkflowType,
    pub description: &'a str,
    pub plan: Option<&'a Plan>,
    pub metrics: Option<&'a PrMetrics>,
    pub commits: &'a [String],
    pub ci_failures: &'a [String],
    pub attempt: u32,
    pub simplified: bool,
}

/// Builds the prompt text for one Agent invocation. Pure: same input always
/// yields the same string.
pub fn build_prompt(ctx: &PromptContext) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "You are working on a {} workflow: {}\n\n",
        ctx.workflow_type, ctx.description
    ));
    out.push_str(&format!("Current phase: {}\n", ctx.phase));
    if ctx.attempt > 1 {
        out.push_str(&format!("This is attempt {}.\n", ctx.attempt));
    }

    if let Some(plan) = ctx.plan {
        out.push_str("\n## Plan\n");
        out.push_str(&format!("{}\n", plan.summary));
        out.push_str(&format!("Overview: {}\n", plan.architecture.overview));

        let phases: Vec<_> = if ctx.simplified {
            plan.phases.iter().rev().take(3).rev().collect()
        } else {
            plan.phases.iter().collect()
        };
        for phase in phases {
            out.push_str(&format!("- {}: {}\n", phase.name, phase.description));
        }

        for stream in &plan.work_streams {
            out.push_str(&format!("\nWork stream: {}\n", stream.name));
            let tasks: Vec<&String> = if ctx.simplified {
                stream.tasks.iter().rev().take(4).rev().collect()
            } else {
                stream.tasks.iter().collect()
            };
            for task in tasks {
                out.push_str(&format!("  - {task}\n"));
            }
        }
    }

    if !ctx.commits.is_empty() {
        out.push_str("\n## Recent commits\n");
        let commits: Vec<&String> = if ctx.simplified {
            ctx.commits.iter().rev().take(10).rev().collect()
        } else {
            ctx.commits.iter().collect()
        };
        for commit in commits {
            out.push_str(&format!("- {commit}\n"));
        }
    }

    if let Some(metrics) = ctx.metrics {
        out.push_str(&format!(
            "\n## Current PR metrics\n{} commits, {} files changed, +{}/-{} lines\n",
            metrics.commits, metrics.files_changed, metrics.lines_added, metrics.lines_removed
        ));
    }

    if !ctx.ci_failures.is_empty() {
        out.push_str("\n## CI failures to fix\n");
        for failure in ctx.ci_failures {
            out.push_str(&format!("- {failure}\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Plan, PlanArchitecture, PlanPhase, WorkStream};

    fn plan_with(work_streams: Vec<WorkStream>) -> Plan {
        Plan {
            summary: "Add widgets".to_string(),
            context_type: "feature".to_string(),
            architecture: PlanArchitecture {
                overview: "widget module".to_string(),
                components: vec![],
            },
            phases: (1..=6)
                .map(|n| PlanPhase {
                    name: format!("phase-{n}"),
                    description: "do work".to_string(),
                    estimated_files: 2,
                    estimated_lines: 50,
                })
                .collect(),
            work_streams,
            risks: vec![],
            complexity: "medium".to_string(),
            estimated_total_lines: 300,
            estimated_total_files: 12,
        }
    }

    #[test]
    fn simplified_prompt_truncates_tasks_and_commits_to_tail() {
        let tasks: Vec<String> = (1..=10).map(|n| format!("task-{n}")).collect();
        let plan = plan_with(vec![WorkStream {
            name: "core".to_string(),
            tasks,
            depends_on: vec![],
        }]);
        let commits: Vec<String> = (1..=20).map(|n| format!("commit-{n}")).collect();

        let ctx = PromptContext {
            phase: Phase::Implementation,
            workflow_type: WorkflowType::Feature,
            description: "add widgets",
            plan: Some(&plan),
            metrics: None,
            commits: &commits,
            ci_failures: &[],
            attempt: 3,
            simplified: true,
        };
        let prompt = build_prompt(&ctx);

        assert!(prompt.contains("task-10"));
        assert!(!prompt.contains("task-1\n"));
        assert!(prompt.contains("commit-20"));
        assert!(!prompt.contains("commit-10\n"));
    }

    #[test]
    fn full_prompt_includes_every_task_and_commit() {
        let tasks = vec!["only-task".to_string()];
        let plan = plan_with(vec![WorkStream {
            name: "core".to_string(),
            tasks,
            depends_on: vec![],
        }]);
        let commits = vec!["only-commit".to_string()];

        let ctx = PromptContext {
            phase: Phase::Implementation,
            workflow_type: WorkflowType::Fix,
            description: "fix bug",
            plan: Some(&plan),
            metrics: None,
            commits: &commits,
            ci_failures: &[],
            attempt: 1,
            simplified: false,
        };
        let prompt = build_prompt(&ctx);
        assert!(prompt.contains("only-task"));
        assert!(prompt.contains("only-commit"));
    }

    #[test]
    fn is_pure_over_identical_input() {
        let ctx = PromptContext {
            phase: Phase::Planning,
            workflow_type: WorkflowType::Refactor,
            description: "clean up",
            plan: None,
            metrics: None,
            commits: &[],
            ci_failures: &[],
            attempt: 1,
            simplified: false,
        };
        assert_eq!(build_prompt(&ctx), build_prompt(&ctx));
    }
}
