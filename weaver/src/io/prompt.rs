//! Prompt builder for the language-model agents.
//!
//! Each agent has one minijinja template. Rendered output is split on
//! `<!-- section:KEY required|droppable -->` markers so less critical sections
//! can be dropped to fit the configured byte budget.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::types::{CaseResult, Feedback, ProblemInput, RejectedPlan, TestReport};

const ANALYZER_TEMPLATE: &str = include_str!("prompts/analyzer.md");
const CODER_TEMPLATE: &str = include_str!("prompts/coder.md");
const DEBUGGER_TEMPLATE: &str = include_str!("prompts/debugger.md");
const OPTIMIZER_TEMPLATE: &str = include_str!("prompts/optimizer.md");
const TESTER_TEMPLATE: &str = include_str!("prompts/tester.md");

/// Sections dropped first when a prompt exceeds its budget.
const DROP_ORDER: [&str; 5] = [
    "rejected",
    "constraints",
    "starting_code",
    "prior_code",
    "plan",
];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex should compile")
});

/// Failing case pre-formatted for the debugger template.
#[derive(Debug, Clone, Serialize)]
struct CaseView {
    id: String,
    input: String,
    expected: String,
    actual: String,
    error: Option<String>,
    stdout: Option<String>,
}

impl CaseView {
    fn from_result(case: &CaseResult) -> Self {
        let input = case
            .input
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            id: case.id.clone(),
            input,
            expected: case.expected.to_string(),
            actual: case
                .actual
                .as_ref()
                .map_or_else(|| "none".to_string(), Value::to_string),
            error: case.error.clone(),
            stdout: Some(case.stdout.trim().to_string()).filter(|s| !s.is_empty()),
        }
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::new();

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let required = kind.as_str() == "required";
        let content = rendered[whole.end()..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Rendered length, counting the blank-line separators between sections.
fn total_len(sections: &[ParsedSection]) -> usize {
    let separators = 2 * sections.len().saturating_sub(1);
    sections.iter().map(|s| s.content.len()).sum::<usize>() + separators
}

/// Drop droppable sections in `DROP_ORDER`, then truncate the last section.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped = sections.remove(idx);
            debug!(
                section = key,
                bytes_dropped = dropped.content.len(),
                "dropped section for budget"
            );
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let last_len = sections.last().map_or(0, |s| s.content.len());
    let other_len = total_len(sections) - last_len;
    let allowed = budget.saturating_sub(other_len);
    if let Some(last) = sections.last_mut() {
        let before_len = last.content.len();
        if allowed > 12 {
            truncate_at_boundary(&mut last.content, allowed - 12);
            last.content.push_str("\n[truncated]");
        } else {
            truncate_at_boundary(&mut last.content, allowed);
        }
        debug!(
            section = %last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn truncate_at_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds agent prompts within a byte budget.
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("analyzer", ANALYZER_TEMPLATE),
            ("coder", CODER_TEMPLATE),
            ("debugger", DEBUGGER_TEMPLATE),
            ("optimizer", OPTIMIZER_TEMPLATE),
            ("tester", TESTER_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env, budget_bytes }
    }

    fn build(&self, name: &str, ctx: minijinja::Value) -> Result<String, minijinja::Error> {
        let rendered = self.env.get_template(name)?.render(ctx)?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }

    pub fn analyzer(
        &self,
        problem: &ProblemInput,
        rejected: Option<&RejectedPlan>,
    ) -> Result<String, minijinja::Error> {
        self.build("analyzer", context! { problem, rejected })
    }

    pub fn coder(
        &self,
        problem: &ProblemInput,
        plan: &str,
        constraints: &[String],
        prior_code: Option<&str>,
        feedback: Option<&Feedback>,
    ) -> Result<String, minijinja::Error> {
        self.build(
            "coder",
            context! {
                problem,
                plan => plan.trim(),
                constraints,
                starting_code => problem.starting_code.as_deref().map(str::trim),
                prior_code => prior_code.map(str::trim),
                feedback,
            },
        )
    }

    pub fn debugger(
        &self,
        problem: &ProblemInput,
        plan: &str,
        code: &str,
        report: &TestReport,
    ) -> Result<String, minijinja::Error> {
        let failing: Vec<CaseView> = report.failing().map(CaseView::from_result).collect();
        self.build(
            "debugger",
            context! {
                problem,
                plan => plan.trim(),
                code => code.trim(),
                failing,
                passed => report.passed_count(),
                total => report.cases.len(),
            },
        )
    }

    pub fn optimizer(
        &self,
        problem: &ProblemInput,
        constraints: &[String],
        code: &str,
    ) -> Result<String, minijinja::Error> {
        self.build(
            "optimizer",
            context! { problem, constraints, code => code.trim() },
        )
    }

    pub fn tester(
        &self,
        problem: &ProblemInput,
        constraints: &[String],
    ) -> Result<String, minijinja::Error> {
        self.build("tester", context! { problem, constraints })
    }
}
