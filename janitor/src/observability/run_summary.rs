use crate::pipeline::{
    recorder::ItemRecord,
    types::{RunStatus, RunSummary},
};

use super::common::{format_elapsed_secs, format_table_with_title};

const SUBJECT_WIDTH: usize = 40;

pub fn render_summary(summary: &RunSummary) -> String {
    let elapsed = (summary.finished_at - summary.started_at)
        .num_seconds()
        .max(0) as u64;

    let mut rows = vec![
        vec!["Status".to_string(), summary.status.to_string()],
        vec!["Collected".to_string(), summary.emails_collected.to_string()],
        vec!["Classified".to_string(), summary.emails_classified.to_string()],
        vec!["Labelled".to_string(), summary.emails_labelled.to_string()],
        vec!["Errors".to_string(), summary.errors_count.to_string()],
        vec!["ACTIONABLE".to_string(), summary.counts.actionable.to_string()],
        vec![
            "INFORMATIONAL".to_string(),
            summary.counts.informational.to_string(),
        ],
        vec!["PROMOTIONAL".to_string(), summary.counts.promotional.to_string()],
        vec!["NOISE".to_string(), summary.counts.noise.to_string()],
        vec!["Elapsed".to_string(), format_elapsed_secs(elapsed)],
    ];
    if let Some(error) = &summary.error {
        rows.push(vec!["Note".to_string(), error.clone()]);
    }

    format_table_with_title(
        &format!("Run {}", summary.run_id),
        &["Metric", "Value"],
        &rows,
    )
}

/// Per-item table; empty when nothing was collected
pub fn render_items(status: RunStatus, records: &[ItemRecord]) -> String {
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.email_id.clone(),
                crate::util::truncate_chars(&r.subject, SUBJECT_WIDTH),
                r.category.clone(),
                r.confidence
                    .map(|c| format!("{:.2}", c))
                    .unwrap_or_else(|| "-".to_string()),
                r.source.clone().unwrap_or_else(|| "-".to_string()),
                r.label_status.clone(),
            ]
        })
        .collect::<Vec<_>>();

    format_table_with_title(
        &format!("Items ({})", status),
        &["Email", "Subject", "Category", "Conf", "Source", "Labels"],
        &rows,
    )
}
