use super::auditor::AuditVerdict;
use super::constraints::ConstraintSet;
use super::idea::IdeaUnit;
use crate::config::DelimiterConfig;
use crate::error::PromptError;
use tera::{Context, Tera};

const GENERATOR_SYSTEM: &str = "generator_system";
const AUDITOR_SYSTEM: &str = "auditor_system";
const AUDITOR_REQUEST: &str = "auditor_request";
const INTERVENTION: &str = "intervention";

const GENERATOR_SYSTEM_TEMPLATE: &str = r#"You are a careful reasoning engine. Every reasoning step you write is checked by an independent auditor before it is trusted.

PROTOCOL:
1. Write your reasoning as MICRO-IDEAS: one atomic step per {{ idea_open }}...{{ idea_close }} block, one or two sentences each.
2. Never put your whole thought process inside a single block.
3. If you are interrupted with a correction, abandon the rejected step and continue from the corrected understanding.
4. When every step is done, write the polished answer once inside {{ answer_open }}...{{ answer_close }}. Do not put idea blocks inside it.

HARD CONSTRAINTS:
{% if constraints -%}
{% for rule in constraints -%}
{{ loop.index }}. {{ rule }}
{% endfor -%}
{% else -%}
(none beyond correct logic and facts)
{% endif %}
EXAMPLE:
{{ idea_open }}Constraint: write without the letter 'a'.{{ idea_close }}
{{ idea_open }}Trying 'lovely': l-o-v-e-l-y. No 'a'. Valid.{{ idea_close }}
{{ answer_open }}The lovely sunset glowed over the horizon.{{ answer_close }}"#;

const AUDITOR_SYSTEM_TEMPLATE: &str = r#"You are an independent logic auditor. You judge ONE reasoning step written by another model.

RULES:
- Distinguish planning from executing. "I must avoid words with 'e'" is valid planning; actually using such a word in the proposed answer is a violation.
- Check the hard constraints, logical consistency and factual accuracy.
- Judge only the step under review; earlier steps were already accepted.

OUTPUT FORMAT:
If the step is valid:
<status>PASS</status>

If the step violates a constraint or is wrong:
<status>FAIL</status>
<reason>Which rule was broken and how, citing the rule.</reason>
<span>the exact offending words, copied from the step</span>
<fix>A corrected version of the step.</fix>

A FAIL without a <reason> is invalid."#;

const AUDITOR_REQUEST_TEMPLATE: &str = r#"TASK:
{{ task }}

HARD CONSTRAINTS:
{{ constraints }}
{% if history %}
ACCEPTED STEPS SO FAR:
{% for step in history -%}
{{ step }}
{% endfor %}{% endif %}
STEP UNDER REVIEW:
{{ idea_open }}{{ idea }}{{ idea_close }}"#;

const INTERVENTION_TEMPLATE: &str = r#"[INTERVENTION] Your last reasoning step was rejected by the auditor and has been discarded.

Rejected step:
{{ idea_open }}{{ idea }}{{ idea_close }}

Auditor's reason:
{{ reason }}
{% if fix %}
Suggested correction:
{{ fix }}
{% endif %}
Continue from the last accepted step. Do not repeat the rejected step.

[ORIGINAL TASK]
{{ task }}

[HARD CONSTRAINTS]
{{ constraints }}

Resume with a new {{ idea_open }} block."#;

/// Prompt templates for both sides of the loop.
pub struct PromptTemplates {
    tera: Tera,
}

impl PromptTemplates {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (GENERATOR_SYSTEM, GENERATOR_SYSTEM_TEMPLATE),
            (AUDITOR_SYSTEM, AUDITOR_SYSTEM_TEMPLATE),
            (AUDITOR_REQUEST, AUDITOR_REQUEST_TEMPLATE),
            (INTERVENTION, INTERVENTION_TEMPLATE),
        ])
        .map_err(|e| PromptError::Render(e.to_string()))?;
        Ok(Self { tera })
    }

    pub fn generator_system(
        &self,
        constraints: &ConstraintSet,
        delimiters: &DelimiterConfig,
    ) -> Result<String, PromptError> {
        let mut context = delimiter_context(delimiters);
        context.insert("constraints", constraints.rules());
        self.render(GENERATOR_SYSTEM, &context)
    }

    pub fn auditor_system(&self) -> Result<String, PromptError> {
        self.render(AUDITOR_SYSTEM, &Context::new())
    }

    pub fn auditor_request(
        &self,
        task: &str,
        constraints: &ConstraintSet,
        history: &[&str],
        idea: &IdeaUnit,
        delimiters: &DelimiterConfig,
    ) -> Result<String, PromptError> {
        let mut context = delimiter_context(delimiters);
        context.insert("task", task);
        context.insert("constraints", &constraints.render_numbered());
        context.insert("history", history);
        context.insert("idea", idea.text());
        self.render(AUDITOR_REQUEST, &context)
    }

    /// Correction message for a rejected idea. The auditor's reason is
    /// inserted verbatim, followed by the re-anchoring directive.
    pub fn intervention(
        &self,
        idea: &IdeaUnit,
        verdict: &AuditVerdict,
        task: &str,
        constraints: &ConstraintSet,
        delimiters: &DelimiterConfig,
    ) -> Result<String, PromptError> {
        let mut context = delimiter_context(delimiters);
        context.insert("idea", idea.text());
        context.insert("reason", verdict.reason_text());
        context.insert("fix", &verdict.suggestion);
        context.insert("task", task);
        context.insert("constraints", &constraints.render_numbered());
        self.render(INTERVENTION, &context)
    }

    fn render(&self, name: &str, context: &Context) -> Result<String, PromptError> {
        self.tera.render(name, context).map_err(|e| match e.kind {
            tera::ErrorKind::TemplateNotFound(_) => PromptError::NotFound(name.to_string()),
            _ => PromptError::Render(format!("{name}: {e}")),
        })
    }
}

fn delimiter_context(delimiters: &DelimiterConfig) -> Context {
    let mut context = Context::new();
    context.insert("idea_open", &delimiters.idea_open);
    context.insert("idea_close", &delimiters.idea_close);
    context.insert("answer_open", &delimiters.answer_open);
    context.insert("answer_close", &delimiters.answer_close);
    context
}
