use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::BatchResult;

pub const SCHEMA_VERSION: u32 = 1;

/// Machine-readable counterpart of the Markdown summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub schema_version: u32,
    pub title: String,
    pub run_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub soft_failed: usize,
    pub hard_failed: usize,
    pub total_cost_usd: f64,
    pub total_duration_ms: u64,
}

impl BatchSummary {
    pub fn from_batch(batch: &BatchResult, title: &str, run_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            title: title.to_string(),
            run_at,
            total: batch.results.len(),
            passed: batch.passed(),
            soft_failed: batch.soft_failed(),
            hard_failed: batch.hard_failed(),
            total_cost_usd: batch.total_cost,
            total_duration_ms: batch.total_duration_ms,
        }
    }
}
