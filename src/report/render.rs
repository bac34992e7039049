// src/report/render.rs

use std::fmt::Write as _;

use crate::errors::Result;
use crate::report::JobResult;

/// Human-readable summary, one line per task.
pub fn render_text(result: &JobResult) -> String {
    let summary = result.summary();
    let width = summary
        .tasks
        .iter()
        .map(|t| t.id.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "job {}: {} in {}ms (peak concurrency {})",
        summary.job_id, summary.status, summary.duration_ms, summary.peak_concurrency
    );

    for task in &summary.tasks {
        let _ = write!(
            out,
            "  {:<width$}  {:<9}  attempts={}  {}ms",
            task.id, task.status, task.attempts, task.duration_ms
        );
        if let Some(err) = &task.error {
            let _ = write!(out, "  error: {err}");
        } else if let Some(output) = &task.output {
            let _ = write!(out, "  output: {output}");
        }
        out.push('\n');
    }
    out
}

/// Pretty-printed JSON summary.
pub fn render_json(result: &JobResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&result.summary())?)
}
