use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::{AssertionStatus, BatchResult};

const MAX_EXPLANATION_CHARS: usize = 100;

fn status_cell(status: AssertionStatus) -> &'static str {
    match status {
        AssertionStatus::Pass => "✅ pass",
        AssertionStatus::SoftFail => "⚠️ soft_fail",
        AssertionStatus::HardFail => "❌ hard_fail",
        AssertionStatus::Pending => "⏳ pending",
    }
}

/// Escape pipes and truncate to keep table cells on one row.
fn table_cell(text: &str) -> String {
    let truncated: String = if text.chars().count() > MAX_EXPLANATION_CHARS {
        let head: String = text.chars().take(MAX_EXPLANATION_CHARS).collect();
        format!("{head}…")
    } else {
        text.to_string()
    };
    truncated.replace('\n', " ").replace('|', "\\|")
}

/// Render an aggregated Markdown summary of a batch result.
pub fn render_markdown(batch: &BatchResult, title: &str, run_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(&format!("## {title}\n\n"));
    out.push_str(&format!(
        "Run at: {}\n\n",
        run_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(&format!(
        "- Assertions: {} total, {} passed, {} soft_failed, {} hard_failed\n",
        batch.results.len(),
        batch.passed(),
        batch.soft_failed(),
        batch.hard_failed()
    ));
    out.push_str(&format!("- Total cost: ${:.6}\n", batch.total_cost));
    out.push_str(&format!("- Duration: {} ms\n\n", batch.total_duration_ms));

    out.push_str("| Assertion | Status | Score | Explanation |\n");
    out.push_str("|-----------|--------|-------|-------------|\n");
    for result in &batch.results {
        out.push_str(&format!(
            "| {} | {} | {:.2} | {} |\n",
            table_cell(&result.assertion_id),
            status_cell(result.status),
            result.score,
            table_cell(&result.explanation)
        ));
    }
    out
}
