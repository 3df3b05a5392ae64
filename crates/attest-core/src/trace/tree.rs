use std::collections::HashSet;

use super::schema::Trace;

/// Derived tree-wide metrics; see [`aggregate_metadata`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateMetadata {
    pub tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub agent_count: u32,
}

/// Post-order sum of per-trace metrics across the tree.
///
/// Missing metadata fields contribute zero. `agent_count` counts the number
/// of distinct `agent_id`s reachable from the root (the root included).
pub fn aggregate_metadata(trace: &Trace) -> AggregateMetadata {
    let mut agg = AggregateMetadata::default();
    let mut agents = HashSet::new();
    for t in walk_preorder(trace) {
        if let Some(meta) = &t.metadata {
            agg.tokens += meta.total_tokens.unwrap_or(0);
            agg.cost_usd += meta.cost_usd.unwrap_or(0.0);
            agg.latency_ms += meta.latency_ms.unwrap_or(0);
        }
        agents.insert(t.agent_id.as_str());
    }
    agg.agent_count = agents.len() as u32;
    agg
}

/// Lazy preorder walk: root first, then each step's `sub_trace` in
/// declaration order, recursively.
pub fn walk_preorder(trace: &Trace) -> PreorderWalk<'_> {
    PreorderWalk { stack: vec![trace] }
}

pub struct PreorderWalk<'a> {
    stack: Vec<&'a Trace>,
}

impl<'a> Iterator for PreorderWalk<'a> {
    type Item = &'a Trace;

    fn next(&mut self) -> Option<&'a Trace> {
        let trace = self.stack.pop()?;
        // Reverse push so the first declared sub_trace is visited first.
        for step in trace.steps.iter().rev() {
            if let Some(sub) = &step.sub_trace {
                self.stack.push(sub);
            }
        }
        Some(trace)
    }
}

/// All traces in the tree carrying the given agent id, preorder.
pub fn find_by_agent<'a>(trace: &'a Trace, agent_id: &str) -> Vec<&'a Trace> {
    walk_preorder(trace)
        .filter(|t| t.agent_id == agent_id)
        .collect()
}

/// `(parent_agent_id, child_agent_id)` pairs, one per `agent_call` step with
/// a `sub_trace`, in preorder.
pub fn delegations(trace: &Trace) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for t in walk_preorder(trace) {
        for step in &t.steps {
            if let Some(sub) = &step.sub_trace {
                pairs.push((t.agent_id.clone(), sub.agent_id.clone()));
            }
        }
    }
    pairs
}

/// Maximum nesting depth of the tree; a leaf root is depth 0.
pub fn depth(trace: &Trace) -> u32 {
    trace
        .steps
        .iter()
        .filter_map(|s| s.sub_trace.as_deref())
        .map(|sub| 1 + depth(sub))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::schema::{Step, TraceMetadata};

    fn metadata(tokens: u64, cost: f64, latency: u64) -> TraceMetadata {
        TraceMetadata {
            total_tokens: Some(tokens),
            cost_usd: Some(cost),
            latency_ms: Some(latency),
            ..Default::default()
        }
    }

    fn parent_child_tree() -> Trace {
        let mut child = Trace::new("t-child", "worker");
        child.parent_trace_id = Some("t-root".into());
        child.metadata = Some(metadata(500, 0.05, 200));

        let mut root = Trace::new("t-root", "planner");
        root.metadata = Some(metadata(300, 0.03, 100));
        root.steps.push(Step::agent_call("delegate", child));
        root
    }

    #[test]
    fn aggregation_sums_parent_and_child() {
        let agg = aggregate_metadata(&parent_child_tree());
        assert_eq!(agg.tokens, 800);
        assert!((agg.cost_usd - 0.08).abs() < 1e-9);
        assert_eq!(agg.latency_ms, 300);
        assert_eq!(agg.agent_count, 2);
    }

    #[test]
    fn aggregation_treats_missing_metadata_as_zero() {
        let mut root = parent_child_tree();
        root.metadata = None;
        let agg = aggregate_metadata(&root);
        assert_eq!(agg.tokens, 500);
        assert_eq!(agg.latency_ms, 200);
    }

    #[test]
    fn agent_count_deduplicates_agent_ids() {
        let mut root = parent_child_tree();
        // Second delegation to the same worker agent.
        root.steps
            .push(Step::agent_call("delegate-again", Trace::new("t-child-2", "worker")));
        assert_eq!(aggregate_metadata(&root).agent_count, 2);
    }

    #[test]
    fn preorder_visits_root_then_children_in_declaration_order() {
        let mut root = Trace::new("r", "a");
        root.steps.push(Step::agent_call("first", Trace::new("c1", "b")));
        root.steps.push(Step::agent_call("second", Trace::new("c2", "c")));
        let ids: Vec<_> = walk_preorder(&root).map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["r", "c1", "c2"]);
    }

    #[test]
    fn preorder_descends_before_moving_to_siblings() {
        let mut inner = Trace::new("c1", "b");
        inner.steps.push(Step::agent_call("deep", Trace::new("g1", "d")));
        let mut root = Trace::new("r", "a");
        root.steps.push(Step::agent_call("first", inner));
        root.steps.push(Step::agent_call("second", Trace::new("c2", "c")));
        let ids: Vec<_> = walk_preorder(&root).map(|t| t.trace_id.as_str()).collect();
        assert_eq!(ids, vec!["r", "c1", "g1", "c2"]);
    }

    #[test]
    fn delegations_follow_preorder() {
        let mut inner = Trace::new("c1", "researcher");
        inner
            .steps
            .push(Step::agent_call("deep", Trace::new("g1", "summarizer")));
        let mut root = Trace::new("r", "planner");
        root.steps.push(Step::agent_call("first", inner));
        root.steps
            .push(Step::agent_call("second", Trace::new("c2", "critic")));

        let pairs = delegations(&root);
        assert_eq!(
            pairs,
            vec![
                ("planner".to_string(), "researcher".to_string()),
                ("researcher".to_string(), "summarizer".to_string()),
                ("planner".to_string(), "critic".to_string()),
            ]
        );
    }

    #[test]
    fn find_by_agent_collects_all_matches() {
        let mut root = Trace::new("r", "a");
        root.steps.push(Step::agent_call("x", Trace::new("c1", "b")));
        root.steps.push(Step::agent_call("y", Trace::new("c2", "b")));
        assert_eq!(find_by_agent(&root, "b").len(), 2);
        assert!(find_by_agent(&root, "missing").is_empty());
    }

    #[test]
    fn depth_counts_nesting_levels() {
        assert_eq!(depth(&Trace::new("r", "a")), 0);
        assert_eq!(depth(&parent_child_tree()), 1);

        let mut grandchild = Trace::new("g", "c");
        grandchild.steps.push(Step::agent_call("x", Trace::new("gg", "d")));
        let mut child = Trace::new("c", "b");
        child.steps.push(Step::agent_call("x", grandchild));
        let mut root = Trace::new("r", "a");
        root.steps.push(Step::agent_call("x", child));
        assert_eq!(depth(&root), 3);
    }
}
