use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::constraint::{compare, Operator};
use super::{soft_flag, verdict, EvalContext, EvalOutcome, Evaluator};
use crate::trace::{aggregate_metadata, delegations, tree, walk_preorder, StepType, Trace};

#[derive(Debug, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
enum TreeCheck {
    AgentCalled {
        agent_id: String,
    },
    DelegationDepth {
        max_depth: u32,
    },
    AggregateCost {
        operator: Operator,
        #[serde(default)]
        value: Option<f64>,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    AggregateTokens {
        operator: Operator,
        #[serde(default)]
        value: Option<f64>,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    AggregateLatency {
        operator: Operator,
        #[serde(default)]
        value: Option<f64>,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    FollowsTransitions {
        transitions: Vec<(String, String)>,
    },
    AgentOrderedBefore {
        agent_a: String,
        agent_b: String,
    },
    AgentsOverlap {
        agent_a: String,
        agent_b: String,
    },
    AgentWallTimeUnder {
        agent_id: String,
        max_ms: u64,
    },
    OrderedAgents {
        groups: Vec<Vec<String>>,
    },
    AllToolsCalled {
        tools: Vec<String>,
    },
}

/// Whole-tree checks: delegation structure, aggregates, and wall-clock
/// relationships between agents.
pub struct TraceTreeEvaluator;

/// Wall-clock intervals `[timestamp, timestamp + latency]` for every trace
/// of the given agent that carries both fields.
fn agent_intervals(root: &Trace, agent_id: &str) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    walk_preorder(root)
        .filter(|t| t.agent_id == agent_id)
        .filter_map(|t| {
            let meta = t.metadata.as_ref()?;
            let start = meta.timestamp?;
            let end = start + chrono::Duration::milliseconds(meta.latency_ms? as i64);
            Some((start, end))
        })
        .collect()
}

fn first_occurrence(root: &Trace, agent_id: &str) -> Option<usize> {
    walk_preorder(root).position(|t| t.agent_id == agent_id)
}

#[async_trait]
impl Evaluator for TraceTreeEvaluator {
    async fn evaluate(
        &self,
        cx: &EvalContext<'_>,
        spec: &serde_json::Value,
    ) -> anyhow::Result<EvalOutcome> {
        let soft = soft_flag(spec);
        let check: TreeCheck = serde_json::from_value(spec.clone())
            .map_err(|e| anyhow::anyhow!("malformed trace_tree spec: {e}"))?;

        let root = cx.trace;
        let (passed, explanation) = match &check {
            TreeCheck::AgentCalled { agent_id } => {
                let found = walk_preorder(root).any(|t| &t.agent_id == agent_id);
                (
                    found,
                    format!(
                        "agent '{agent_id}' {} in the trace tree",
                        if found { "appears" } else { "does not appear" }
                    ),
                )
            }
            TreeCheck::DelegationDepth { max_depth } => {
                let depth = tree::depth(root);
                (
                    depth <= *max_depth,
                    format!("tree depth {depth} vs allowed {max_depth}"),
                )
            }
            TreeCheck::AggregateCost {
                operator,
                value,
                min,
                max,
            } => {
                let actual = aggregate_metadata(root).cost_usd;
                (
                    compare(*operator, actual, *value, *min, *max)?,
                    format!("aggregate cost {actual} ({operator})"),
                )
            }
            TreeCheck::AggregateTokens {
                operator,
                value,
                min,
                max,
            } => {
                let actual = aggregate_metadata(root).tokens as f64;
                (
                    compare(*operator, actual, *value, *min, *max)?,
                    format!("aggregate tokens {actual} ({operator})"),
                )
            }
            TreeCheck::AggregateLatency {
                operator,
                value,
                min,
                max,
            } => {
                let actual = aggregate_metadata(root).latency_ms as f64;
                (
                    compare(*operator, actual, *value, *min, *max)?,
                    format!("aggregate latency {actual} ms ({operator})"),
                )
            }
            TreeCheck::FollowsTransitions { transitions } => {
                let seen = delegations(root);
                let missing: Vec<&(String, String)> = transitions
                    .iter()
                    .filter(|pair| !seen.contains(pair))
                    .collect();
                (
                    missing.is_empty(),
                    if missing.is_empty() {
                        "all listed delegations occurred".to_string()
                    } else {
                        format!("delegations never observed: {missing:?}")
                    },
                )
            }
            TreeCheck::AgentOrderedBefore { agent_a, agent_b } => {
                match (first_occurrence(root, agent_a), first_occurrence(root, agent_b)) {
                    (Some(a), Some(b)) => (
                        a < b,
                        format!(
                            "'{agent_a}' first at position {a}, '{agent_b}' first at position {b}"
                        ),
                    ),
                    (None, _) => (false, format!("agent '{agent_a}' not present")),
                    (_, None) => (false, format!("agent '{agent_b}' not present")),
                }
            }
            TreeCheck::AgentsOverlap { agent_a, agent_b } => {
                let intervals_a = agent_intervals(root, agent_a);
                let intervals_b = agent_intervals(root, agent_b);
                if intervals_a.is_empty() {
                    anyhow::bail!("no timing data for agent '{agent_a}'");
                }
                if intervals_b.is_empty() {
                    anyhow::bail!("no timing data for agent '{agent_b}'");
                }
                let overlap = intervals_a.iter().any(|(a_start, a_end)| {
                    intervals_b
                        .iter()
                        .any(|(b_start, b_end)| a_start <= b_end && b_start <= a_end)
                });
                (
                    overlap,
                    format!(
                        "wall-clock intervals of '{agent_a}' and '{agent_b}' {}",
                        if overlap { "intersect" } else { "do not intersect" }
                    ),
                )
            }
            TreeCheck::AgentWallTimeUnder { agent_id, max_ms } => {
                let total: u64 = walk_preorder(root)
                    .filter(|t| &t.agent_id == agent_id)
                    .filter_map(|t| t.metadata.as_ref().and_then(|m| m.latency_ms))
                    .sum();
                (
                    total < *max_ms,
                    format!("agent '{agent_id}' spent {total} ms vs budget {max_ms} ms"),
                )
            }
            TreeCheck::OrderedAgents { groups } => {
                let sequence: Vec<&str> =
                    walk_preorder(root).map(|t| t.agent_id.as_str()).collect();
                let mut passed = true;
                let mut explanation = "agent groups appear in order".to_string();
                let mut previous_last: Option<usize> = None;
                'groups: for group in groups {
                    let mut first = usize::MAX;
                    let mut last = 0usize;
                    for agent in group {
                        let positions: Vec<usize> = sequence
                            .iter()
                            .enumerate()
                            .filter(|(_, id)| *id == agent)
                            .map(|(i, _)| i)
                            .collect();
                        if positions.is_empty() {
                            passed = false;
                            explanation = format!("agent '{agent}' not present");
                            break 'groups;
                        }
                        first = first.min(positions[0]);
                        last = last.max(*positions.last().unwrap());
                    }
                    if let Some(prev) = previous_last {
                        if first <= prev {
                            passed = false;
                            explanation = format!(
                                "group {group:?} starts before the previous group finished"
                            );
                            break;
                        }
                    }
                    previous_last = Some(last);
                }
                (passed, explanation)
            }
            TreeCheck::AllToolsCalled { tools } => {
                let called: Vec<&str> = walk_preorder(root)
                    .flat_map(|t| t.steps.iter())
                    .filter(|s| s.step_type == StepType::ToolCall)
                    .map(|s| s.name.as_str())
                    .collect();
                let missing: Vec<&String> = tools
                    .iter()
                    .filter(|t| !called.contains(&t.as_str()))
                    .collect();
                (
                    missing.is_empty(),
                    if missing.is_empty() {
                        "every listed tool was called somewhere in the tree".to_string()
                    } else {
                        format!("tools never called anywhere in the tree: {missing:?}")
                    },
                )
            }
        };

        Ok(verdict(soft, passed, if passed { 1.0 } else { 0.0 }, explanation))
    }
}
