//! Structural and cross-reference checks on raw flow declarations.
//!
//! Every problem in a flow is collected and reported together; a flow with
//! any problem is never constructed.

use std::collections::HashSet;

use serde_json::{Map, Value};

use flowline_core::error::{FlowlineError, Result};

use crate::definition::{FlowDefinition, StepKind};
use crate::steps::action::ActionOperation;
use crate::steps::plan::KNOWN_PROVIDERS;

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug"];

pub(crate) fn dangling_route(step: &str, label: &str, target: &str) -> String {
    format!(
        "step '{}' routes '{}' to unknown step '{}'",
        step, label, target
    )
}

/// Validate a raw flow declaration and parse it into a [`FlowDefinition`].
pub fn validate(raw: &Value) -> Result<FlowDefinition> {
    let Some(obj) = raw.as_object() else {
        return Err(invalid("<unnamed>", vec!["flow definition must be a JSON object".into()]));
    };

    let flow_id = obj
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let flow_label = if flow_id.is_empty() { "<unnamed>" } else { flow_id.as_str() };

    let mut problems = Vec::new();
    if flow_id.is_empty() {
        problems.push("flow is missing a non-empty 'id'".to_string());
    }
    for key in ["name", "description"] {
        if obj.get(key).is_some_and(|v| !v.is_string()) {
            problems.push(format!("'{}' must be a string", key));
        }
    }

    let steps = match obj.get("steps") {
        Some(Value::Array(steps)) => steps,
        Some(_) => {
            problems.push("'steps' must be an array".into());
            return Err(invalid(flow_label, problems));
        }
        None => {
            problems.push("flow is missing 'steps'".into());
            return Err(invalid(flow_label, problems));
        }
    };

    if steps.is_empty() {
        if problems.is_empty() {
            return Err(FlowlineError::EmptyFlow(flow_id));
        }
        return Err(invalid(flow_label, problems));
    }

    let mut declared: HashSet<&str> = HashSet::new();
    let mut routes: Vec<(String, &str, &str)> = Vec::new();
    for (pos, step) in steps.iter().enumerate() {
        check_step(pos, step, &mut declared, &mut routes, &mut problems);
    }

    for (step, label, target) in &routes {
        if !declared.contains(target) {
            problems.push(dangling_route(step, label, target));
        }
    }

    match obj.get("initialStepId") {
        None | Some(Value::Null) => {}
        Some(Value::String(initial)) if declared.contains(initial.as_str()) => {}
        Some(Value::String(initial)) => {
            problems.push(format!("initialStepId '{}' is not a declared step", initial))
        }
        Some(_) => problems.push("'initialStepId' must be a string".into()),
    }

    if !problems.is_empty() {
        return Err(invalid(flow_label, problems));
    }

    serde_json::from_value(raw.clone()).map_err(|e| invalid(flow_label, vec![e.to_string()]))
}

fn invalid(flow: &str, problems: Vec<String>) -> FlowlineError {
    FlowlineError::InvalidFlow {
        flow: flow.to_string(),
        problems,
    }
}

fn check_step<'a>(
    pos: usize,
    step: &'a Value,
    declared: &mut HashSet<&'a str>,
    routes: &mut Vec<(String, &'a str, &'a str)>,
    problems: &mut Vec<String>,
) {
    let Some(fields) = step.as_object() else {
        problems.push(format!("steps[{}] must be an object", pos));
        return;
    };

    let id = match fields.get("id").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => {
            if !declared.insert(id) {
                problems.push(format!("duplicate step id '{}'", id));
            }
            id.to_string()
        }
        _ => {
            problems.push(format!("steps[{}] is missing a non-empty 'id'", pos));
            format!("steps[{}]", pos)
        }
    };

    match fields.get("nextStepId") {
        None => {}
        Some(Value::String(target)) if !target.is_empty() => {
            routes.push((id.clone(), "default", target.as_str()));
        }
        Some(Value::Object(table)) => {
            for (label, target) in table {
                match target.as_str() {
                    Some(t) if !t.is_empty() => routes.push((id.clone(), label.as_str(), t)),
                    _ => problems.push(format!(
                        "step '{}': route '{}' must name a step id",
                        id, label
                    )),
                }
            }
        }
        Some(_) => problems.push(format!("step '{}': 'nextStepId' must be an object", id)),
    }

    let step_type = match fields.get("type").and_then(Value::as_str) {
        Some(t) if !t.trim().is_empty() => t,
        _ => {
            problems.push(format!("step '{}' is missing a 'type'", id));
            return;
        }
    };

    let mut check = FieldCheck {
        step: &id,
        fields,
        problems,
    };

    // Unknown types are left for the step factory to reject with the full payload.
    let Some(kind) = StepKind::parse(step_type) else {
        return;
    };

    match kind {
        StepKind::Action => check_action(&mut check),
        StepKind::Decision => check_decision(&mut check),
        StepKind::Log => check_log(&mut check),
        StepKind::ReadGithubIssue => check_read_issue(&mut check),
        StepKind::PlanGeneration => check_plan(&mut check),
    }
}

struct FieldCheck<'a> {
    step: &'a str,
    fields: &'a Map<String, Value>,
    problems: &'a mut Vec<String>,
}

impl<'a> FieldCheck<'a> {
    fn problem(&mut self, message: String) {
        self.problems.push(format!("step '{}': {}", self.step, message));
    }

    fn required_str(&mut self, key: &str) -> Option<&'a str> {
        let fields = self.fields;
        match fields.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                self.problem(format!("missing required field '{}'", key));
                None
            }
            Some(_) => {
                self.problem(format!("'{}' must be a string", key));
                None
            }
        }
    }

    fn optional_str(&mut self, key: &str) -> Option<&'a str> {
        let fields = self.fields;
        match fields.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.as_str()),
            Some(_) => {
                self.problem(format!("'{}' must be a string", key));
                None
            }
        }
    }

    fn optional_bool(&mut self, key: &str) {
        let fields = self.fields;
        if fields.get(key).is_some_and(|v| !v.is_boolean() && !v.is_null()) {
            self.problem(format!("'{}' must be a boolean", key));
        }
    }
}

fn check_action(check: &mut FieldCheck<'_>) {
    let fields = check.fields;
    let operation = check.required_str("operation").map(|op| (op, ActionOperation::parse(op)));
    check.required_str("key");

    let value = fields.get("value").filter(|v| !v.is_null());
    if let Some(v) = value {
        if !(v.is_string() || v.is_number() || v.is_boolean()) {
            check.problem("'value' must be a string, number or boolean".into());
        }
    }

    match operation {
        Some((_, Some(op))) if op.requires_value() && value.is_none() => {
            check.problem(format!("'value' is required for {}", op.as_str()));
        }
        Some((raw, None)) => {
            check.problem(format!(
                "invalid operation '{}' (expected setContext, updateContext or removeContext)",
                raw
            ));
        }
        _ => {}
    }
}

fn check_decision(check: &mut FieldCheck<'_>) {
    check.required_str("condition");
    check.required_str("contextKey");
    check.optional_str("trueValue");
    check.optional_str("falseValue");
}

fn check_log(check: &mut FieldCheck<'_>) {
    check.required_str("message");
    if let Some(level) = check.optional_str("level") {
        if !LOG_LEVELS.contains(&level) {
            check.problem(format!(
                "invalid level '{}' (expected error, warn, info or debug)",
                level
            ));
        }
    }
}

fn check_read_issue(check: &mut FieldCheck<'_>) {
    check.required_str("issueUrl");
    check.optional_bool("includeComments");
    check.optional_str("authToken");
    check.optional_str("githubToken");
}

fn check_plan(check: &mut FieldCheck<'_>) {
    if let Some(provider) = check.required_str("llm_provider") {
        let provider = provider.to_ascii_lowercase();
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            check.problem(format!(
                "unknown llm_provider '{}' (expected {})",
                provider,
                KNOWN_PROVIDERS.join(", ")
            ));
        }
    }
    check.optional_str("model");
    check.optional_str("prompt_template");
    check.optional_str("output_key");
    check.optional_str("outputKey");

    let fields = check.fields;
    if let Some(t) = fields.get("temperature").filter(|v| !v.is_null()) {
        if !t.is_number() {
            check.problem("'temperature' must be a number".into());
        }
    }
    if let Some(m) = fields.get("max_tokens").filter(|v| !v.is_null()) {
        let valid = m.as_u64().is_some_and(|n| n > 0 && n <= u64::from(u32::MAX));
        if !valid {
            check.problem("'max_tokens' must be a positive integer".into());
        }
    }
}
