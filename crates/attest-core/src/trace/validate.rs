use std::collections::HashSet;

use super::schema::{StepType, Trace};
use super::tree;

/// Outcome of structural validation; `depth` is the maximum nesting depth
/// with the root at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub depth: u32,
}

/// Enforce the structural invariants of a trace tree.
///
/// Checked per trace: non-empty `trace_id` and `agent_id`, `sub_trace` only
/// on `agent_call` steps, and `parent_trace_id` consistency between a child
/// and its containing trace. Trees arrive from the network as JSON, so a
/// repeated `trace_id` is treated as a cycle and fails validation rather
/// than looping the walker.
pub fn validate(trace: &Trace) -> TraceValidation {
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for t in tree::walk_preorder(trace) {
        if t.trace_id.is_empty() {
            errors.push(format!("trace under agent '{}' has empty trace_id", t.agent_id));
        } else if !seen.insert(t.trace_id.as_str()) {
            errors.push(format!(
                "cycle detected: trace_id '{}' appears more than once",
                t.trace_id
            ));
        }
        if t.agent_id.is_empty() {
            errors.push(format!("trace '{}' has empty agent_id", t.trace_id));
        }

        for (idx, step) in t.steps.iter().enumerate() {
            if let Some(sub) = &step.sub_trace {
                if step.step_type != StepType::AgentCall {
                    errors.push(format!(
                        "trace '{}' step {} ('{}') carries a sub_trace but is not an agent_call",
                        t.trace_id, idx, step.name
                    ));
                }
                if let Some(parent_id) = &sub.parent_trace_id {
                    if parent_id != &t.trace_id {
                        errors.push(format!(
                            "sub_trace '{}' names parent '{}' but is nested under '{}'",
                            sub.trace_id, parent_id, t.trace_id
                        ));
                    }
                }
            }
        }
    }

    TraceValidation {
        valid: errors.is_empty(),
        depth: tree::depth(trace),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::schema::Step;

    #[test]
    fn well_formed_tree_validates() {
        let mut child = Trace::new("c", "worker");
        child.parent_trace_id = Some("r".into());
        let mut root = Trace::new("r", "planner");
        root.steps.push(Step::agent_call("delegate", child));

        let report = validate(&root);
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.depth, 1);
    }

    #[test]
    fn empty_ids_are_reported() {
        let report = validate(&Trace::new("", ""));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn sub_trace_on_non_agent_call_is_invalid() {
        let mut root = Trace::new("r", "a");
        let mut step = Step::tool_call("search");
        step.sub_trace = Some(Box::new(Trace::new("c", "b")));
        root.steps.push(step);

        let report = validate(&root);
        assert!(!report.valid);
        assert!(report.errors[0].contains("not an agent_call"));
    }

    #[test]
    fn mismatched_parent_id_is_invalid() {
        let mut child = Trace::new("c", "worker");
        child.parent_trace_id = Some("someone-else".into());
        let mut root = Trace::new("r", "planner");
        root.steps.push(Step::agent_call("delegate", child));

        let report = validate(&root);
        assert!(!report.valid);
        assert!(report.errors[0].contains("names parent 'someone-else'"));
    }

    #[test]
    fn missing_parent_id_on_child_is_tolerated() {
        let mut root = Trace::new("r", "planner");
        root.steps
            .push(Step::agent_call("delegate", Trace::new("c", "worker")));
        assert!(validate(&root).valid);
    }

    #[test]
    fn repeated_trace_id_fails_as_cycle() {
        let mut root = Trace::new("r", "a");
        root.steps.push(Step::agent_call("x", Trace::new("r", "b")));

        let report = validate(&root);
        assert!(!report.valid);
        assert!(report.errors[0].contains("cycle detected"));
    }
}
