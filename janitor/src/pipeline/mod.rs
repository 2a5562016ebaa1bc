use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{error::AppResult, observability};

pub mod batch_loop;
pub mod collector;
pub mod coordinator;
pub mod labeler;
pub mod recorder;
pub mod types;

use batch_loop::BatchLoop;
use collector::Collector;
use coordinator::ClassificationCoordinator;
use labeler::Labeler;
use recorder::{ItemRecord, RunRecorder};
use types::{RunContext, RunSummary};

/// Collect, classify, dispose, record. One call is one run.
pub struct Pipeline {
    collector: Collector,
    coordinator: ClassificationCoordinator,
    labeler: Labeler,
    recorder: RunRecorder,
}

impl Pipeline {
    pub fn new(
        collector: Collector,
        coordinator: ClassificationCoordinator,
        labeler: Labeler,
        recorder: RunRecorder,
    ) -> Self {
        Self {
            collector,
            coordinator,
            labeler,
            recorder,
        }
    }

    pub fn recorder(&self) -> &RunRecorder {
        &self.recorder
    }

    pub async fn run_once(&self, cancel: &CancellationToken) -> AppResult<RunSummary> {
        let ctx = RunContext::new();
        let span = tracing::info_span!("run", run_id = %ctx.run_id);
        self.execute(ctx, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        mut ctx: RunContext,
        cancel: &CancellationToken,
    ) -> AppResult<RunSummary> {
        tracing::info!("Starting run");

        match self.collector.collect().await {
            Ok(items) => ctx.items = items,
            Err(e) => {
                tracing::error!("Collection failed: {}", e);
                ctx.collection_error = Some(e.to_string());
            }
        }

        if ctx.collection_error.is_none() {
            let outcomes = BatchLoop::new(&ctx.items)
                .run(&self.coordinator, cancel)
                .await;
            if outcomes.len() < ctx.items.len() {
                ctx.deferred = ctx.items.len() - outcomes.len();
                ctx.items.truncate(outcomes.len());
            }
            ctx.outcomes = outcomes;
            ctx.disposals = self.labeler.apply_all(&ctx.items, &ctx.outcomes).await;
        }

        let summary = RunSummary::from_context(&ctx, Utc::now());
        let records = ctx
            .items
            .iter()
            .zip(&ctx.outcomes)
            .zip(&ctx.disposals)
            .map(|((item, outcome), disposal)| ItemRecord::new(item, outcome, disposal))
            .collect::<Vec<_>>();

        let items_table = observability::render_items(summary.status, &records);
        if !items_table.is_empty() {
            tracing::info!("\n{}", items_table);
        }
        tracing::info!("\n{}", observability::render_summary(&summary));

        if let Err(e) = self.recorder.record_run(&summary, records).await {
            tracing::error!("Failed to record run {}: {}", summary.run_id, e);
            return Err(e);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        email::MailStore,
        error::AppError,
        model::EmailCategory,
        pipeline::types::{ClassificationSource, RunStatus, FAILED_CATEGORY},
        testing::common::{
            setup_db, test_item, test_label_names, test_policy, verdict, FakeMailStore,
            ScriptedClassifier,
        },
    };

    const INBOX_QUERY: &str = "in:inbox is:unread -in:sent";

    /// Primary answers by subject: the subject names the category and confidence
    fn subject_classifier() -> ScriptedClassifier {
        ScriptedClassifier::new(|request| match request.subject.as_str() {
            "invoice" => Ok(verdict(EmailCategory::Actionable, 0.98)),
            "spam" => Ok(verdict(EmailCategory::Noise, 0.99)),
            "sale" => Ok(verdict(EmailCategory::Promotional, 0.97)),
            "garbled" => Err(AppError::Validation("Unknown category \"URGENT\"".to_string())),
            other => {
                let confidence = if other == "digest" { 0.96 } else { 0.5 };
                Ok(verdict(EmailCategory::Informational, confidence))
            }
        })
    }

    async fn pipeline(store: Arc<FakeMailStore>) -> Pipeline {
        let labels = test_label_names();
        let store_dyn: Arc<dyn MailStore> = store;
        Pipeline::new(
            Collector::new(store_dyn.clone(), INBOX_QUERY, &labels.processed),
            ClassificationCoordinator::new(
                Arc::new(subject_classifier()),
                Arc::new(ScriptedClassifier::constant(verdict(
                    EmailCategory::Informational,
                    0.5,
                ))),
                test_policy(),
            ),
            Labeler::new(store_dyn, labels),
            RunRecorder::new(setup_db().await),
        )
    }

    fn three_items() -> Vec<crate::email::EmailItem> {
        vec![
            test_item("m1", "billing@example.com", "invoice"),
            test_item("m2", "x@spam.example", "spam"),
            test_item("m3", "deals@shop.example", "sale"),
        ]
    }

    #[tokio::test]
    async fn test_three_items_success() {
        let store = Arc::new(FakeMailStore::with_items(three_items()));
        let pipeline = pipeline(store.clone()).await;

        let summary = pipeline.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.emails_collected, 3);
        assert_eq!(summary.emails_labelled, 3);
        assert_eq!(summary.counts.actionable, 1);
        assert_eq!(summary.counts.noise, 1);
        assert_eq!(summary.counts.promotional, 1);

        // actionable stays in the inbox with only the marker
        assert_eq!(store.labels_of("m1"), vec!["INBOX", "UNREAD", "janitor/done"]);
        assert_eq!(
            store.labels_of("m2"),
            vec!["UNREAD", "janitor/noise", "janitor/done"]
        );
        assert_eq!(
            store.labels_of("m3"),
            vec!["UNREAD", "janitor/promotions", "janitor/done"]
        );

        let recorder = pipeline.recorder();
        let run = recorder.get_run(&summary.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, "success");
        assert_eq!(run.emails_collected, 3);
        assert_eq!(
            recorder.count_classifications(&summary.run_id).await.unwrap(),
            3
        );
        let rows = recorder.get_classifications(&summary.run_id).await.unwrap();
        assert!(rows
            .iter()
            .all(|r| r.source.as_deref() == Some(ClassificationSource::ClassifierOnly.as_ref())));
    }

    #[tokio::test]
    async fn test_label_failure_is_partial() {
        let store = Arc::new(FakeMailStore::with_items(three_items()));
        store.fail_modify("m2", "503 Service Unavailable");
        let pipeline = pipeline(store.clone()).await;

        let summary = pipeline.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.emails_labelled, 2);
        assert_eq!(summary.errors_count, 1);
        assert!(!store.labels_of("m2").contains(&"janitor/done".to_string()));
        assert!(store.labels_of("m1").contains(&"janitor/done".to_string()));
        assert!(store.labels_of("m3").contains(&"janitor/done".to_string()));

        let rows = pipeline
            .recorder()
            .get_classifications(&summary.run_id)
            .await
            .unwrap();
        let failed = rows.iter().find(|r| r.email_id == "m2").unwrap();
        assert_eq!(failed.label_status, "failed");
        assert!(failed.error.as_deref().unwrap().contains("503"));
        assert_eq!(failed.category, "NOISE");
    }

    #[tokio::test]
    async fn test_second_run_without_new_mail_is_empty() {
        let store = Arc::new(FakeMailStore::with_items(three_items()));
        let pipeline = pipeline(store.clone()).await;
        let cancel = CancellationToken::new();

        let first = pipeline.run_once(&cancel).await.unwrap();
        assert_eq!(first.emails_collected, 3);

        let second = pipeline.run_once(&cancel).await.unwrap();
        assert_eq!(second.emails_collected, 0);
        assert_eq!(second.status, RunStatus::Success);
        assert_eq!(
            pipeline
                .recorder()
                .count_classifications(&second.run_id)
                .await
                .unwrap(),
            0
        );

        // new mail is picked up, old mail is not
        store.push_item(test_item("m4", "news@example.com", "digest"));
        let third = pipeline.run_once(&cancel).await.unwrap();
        assert_eq!(third.emails_collected, 1);
        assert_eq!(third.counts.informational, 1);
    }

    #[tokio::test]
    async fn test_failed_item_is_retried_next_run() {
        let store = Arc::new(FakeMailStore::with_items(vec![
            test_item("m1", "billing@example.com", "invoice"),
            test_item("m2", "unknown@example.com", "garbled"),
        ]));
        let pipeline = pipeline(store.clone()).await;
        let cancel = CancellationToken::new();

        let first = pipeline.run_once(&cancel).await.unwrap();
        assert_eq!(first.status, RunStatus::Partial);
        assert_eq!(first.emails_classified, 1);
        assert_eq!(store.labels_of("m2"), vec!["INBOX", "UNREAD"]);

        let rows = pipeline
            .recorder()
            .get_classifications(&first.run_id)
            .await
            .unwrap();
        assert_eq!(rows[1].category, FAILED_CATEGORY);
        assert_eq!(rows[1].label_status, "skipped");

        let second = pipeline.run_once(&cancel).await.unwrap();
        assert_eq!(second.emails_collected, 1);
    }

    #[tokio::test]
    async fn test_marker_write_failure_is_collected_again() {
        let store = Arc::new(FakeMailStore::with_items(vec![test_item(
            "m1",
            "x@spam.example",
            "spam",
        )]));
        store.fail_label("janitor/done", "500 Backend Error");
        let pipeline = pipeline(store.clone()).await;
        let cancel = CancellationToken::new();

        let first = pipeline.run_once(&cancel).await.unwrap();
        assert_eq!(first.status, RunStatus::Partial);
        assert_eq!(first.emails_labelled, 0);
        assert_eq!(store.labels_of("m1"), vec!["INBOX", "UNREAD"]);

        store.clear_failures();
        let second = pipeline.run_once(&cancel).await.unwrap();
        assert_eq!(second.emails_collected, 1);
        assert_eq!(second.status, RunStatus::Success);
        assert_eq!(
            store.labels_of("m1"),
            vec!["UNREAD", "janitor/noise", "janitor/done"]
        );

        let third = pipeline.run_once(&cancel).await.unwrap();
        assert_eq!(third.emails_collected, 0);
    }

    #[tokio::test]
    async fn test_collection_failure_records_failed_run() {
        let store = Arc::new(FakeMailStore::with_items(three_items()));
        store.fail_listing("401 Unauthorized: invalid credentials");
        let pipeline = pipeline(store.clone()).await;

        let summary = pipeline.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.status, RunStatus::Failure);
        assert_eq!(summary.emails_collected, 0);

        let run = pipeline
            .recorder()
            .get_run(&summary.run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, "failure");
        assert!(run.error.unwrap().contains("401"));
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_escalated_item_is_recorded() {
        let store = Arc::new(FakeMailStore::with_items(vec![test_item(
            "m1",
            "someone@example.com",
            "hello",
        )]));
        let pipeline = pipeline(store.clone()).await;

        let summary = pipeline.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.counts.actionable, 1);

        let rows = pipeline
            .recorder()
            .get_classifications(&summary.run_id)
            .await
            .unwrap();
        assert_eq!(rows[0].source.as_deref(), Some("EscalatedDefault"));
        assert_eq!(rows[0].refinement_count, 1);
        assert!(store.labels_of("m1").contains(&"INBOX".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_defers_everything() {
        let store = Arc::new(FakeMailStore::with_items(three_items()));
        let pipeline = pipeline(store.clone()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = pipeline.run_once(&cancel).await.unwrap();
        assert_eq!(summary.emails_collected, 0);
        assert_eq!(summary.error.as_deref(), Some("cancelled; 3 items deferred"));
        assert!(store.mutations().is_empty());
        assert_eq!(
            pipeline
                .recorder()
                .count_classifications(&summary.run_id)
                .await
                .unwrap(),
            0
        );
    }
}
