use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};

use crate::{
    db_core::prelude::*,
    email::EmailItem,
    error::{AppError, AppResult},
    model::{
        classification::ClassificationCtrl, correction::CorrectionCtrl, run::RunCtrl,
        EmailCategory,
    },
};

use super::types::{ApplyOutcome, ItemOutcome, RunSummary, FAILED_CATEGORY};

/// One persisted classification row, before it reaches the database
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub email_id: String,
    pub sender: String,
    pub subject: String,
    pub category: String,
    pub source: Option<String>,
    pub reasoning: Option<String>,
    pub confidence: Option<f32>,
    pub refinement_count: u32,
    pub action: Option<String>,
    pub label_status: String,
    pub error: Option<String>,
}

impl ItemRecord {
    pub fn new(item: &EmailItem, outcome: &ItemOutcome, disposal: &ApplyOutcome) -> Self {
        let (category, source, reasoning, confidence, refinement_count, classify_error) =
            match outcome {
                ItemOutcome::Classified(result) => (
                    result.category.to_string(),
                    Some(result.source.to_string()),
                    Some(result.reasoning.clone()),
                    Some(result.confidence),
                    result.refinement_count,
                    None,
                ),
                ItemOutcome::Failed { error } => (
                    FAILED_CATEGORY.to_string(),
                    None,
                    None,
                    None,
                    0,
                    Some(error.clone()),
                ),
            };

        Self {
            email_id: item.id.clone(),
            sender: item.sender.clone(),
            subject: item.subject.clone(),
            category,
            source,
            reasoning,
            confidence,
            refinement_count,
            action: disposal.action_text(),
            label_status: disposal.status().to_string(),
            error: classify_error.or_else(|| disposal.error().map(str::to_string)),
        }
    }

    fn into_active_model(self, run_id: &str) -> classification::ActiveModel {
        classification::ActiveModel {
            id: NotSet,
            run_id: Set(run_id.to_string()),
            email_id: Set(self.email_id),
            sender: Set(Some(self.sender)),
            subject: Set(Some(self.subject)),
            category: Set(self.category),
            source: Set(self.source),
            reasoning: Set(self.reasoning),
            confidence: Set(self.confidence),
            refinement_count: Set(self.refinement_count as i32),
            action: Set(self.action),
            label_status: Set(self.label_status),
            error: Set(self.error),
            classified_at: Set(Utc::now()),
        }
    }
}

fn run_active_model(summary: &RunSummary) -> run::ActiveModel {
    run::ActiveModel {
        run_id: Set(summary.run_id.clone()),
        started_at: Set(summary.started_at),
        finished_at: Set(summary.finished_at),
        emails_collected: Set(summary.emails_collected as i32),
        emails_classified: Set(summary.emails_classified as i32),
        emails_labelled: Set(summary.emails_labelled as i32),
        errors_count: Set(summary.errors_count as i32),
        actionable_count: Set(summary.counts.actionable as i32),
        informational_count: Set(summary.counts.informational as i32),
        promotional_count: Set(summary.counts.promotional as i32),
        noise_count: Set(summary.counts.noise as i32),
        status: Set(summary.status.to_string()),
        error: Set(summary.error.clone()),
    }
}

#[derive(Clone)]
pub struct RunRecorder {
    conn: DatabaseConnection,
}

impl RunRecorder {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Write the run row and every item row in one transaction
    pub async fn record_run(&self, summary: &RunSummary, rows: Vec<ItemRecord>) -> AppResult<()> {
        if rows.len() != summary.emails_collected {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Run {} has {} rows for {} collected emails",
                summary.run_id,
                rows.len(),
                summary.emails_collected
            )));
        }

        let row_count = rows.len();
        let txn = self.conn.begin().await?;
        RunCtrl::insert(&txn, run_active_model(summary)).await?;
        ClassificationCtrl::insert_many(
            &txn,
            rows.into_iter()
                .map(|r| r.into_active_model(&summary.run_id))
                .collect(),
        )
        .await?;
        txn.commit().await?;

        tracing::info!(
            "Recorded run {} ({}) with {} classifications",
            summary.run_id,
            summary.status,
            row_count
        );
        Ok(())
    }

    /// Append a correction for an earlier classification
    pub async fn record_correction(
        &self,
        classification_id: i32,
        corrected_category: EmailCategory,
        corrected_by: &str,
        notes: Option<String>,
    ) -> AppResult<correction::Model> {
        let original = ClassificationCtrl::get_by_id(&self.conn, classification_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Classification {} does not exist",
                    classification_id
                ))
            })?;

        CorrectionCtrl::insert(
            &self.conn,
            correction::ActiveModel {
                id: NotSet,
                classification_id: Set(original.id),
                run_id: Set(original.run_id),
                email_id: Set(original.email_id),
                original_category: Set(original.category),
                corrected_category: Set(corrected_category.to_string()),
                corrected_by: Set(corrected_by.to_string()),
                corrected_at: Set(Utc::now()),
                notes: Set(notes),
            },
        )
        .await
    }

    pub async fn count_classifications(&self, run_id: &str) -> AppResult<u64> {
        ClassificationCtrl::count_by_run(&self.conn, run_id).await
    }

    pub async fn get_run(&self, run_id: &str) -> AppResult<Option<run::Model>> {
        RunCtrl::get(&self.conn, run_id).await
    }

    pub async fn get_classifications(&self, run_id: &str) -> AppResult<Vec<classification::Model>> {
        ClassificationCtrl::get_by_run(&self.conn, run_id).await
    }

    pub async fn recent_runs(&self, limit: u64) -> AppResult<Vec<run::Model>> {
        RunCtrl::list_recent(&self.conn, limit).await
    }
}
