use std::sync::Arc;

use crate::{
    app_config::GmailConfig,
    email::{EmailItem, MailStore, INBOX_LABEL},
    error::AppResult,
    model::EmailCategory,
};

use super::types::{ApplyOutcome, ItemOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelNames {
    pub processed: String,
    pub noise: String,
    pub promotional: String,
    pub informational: String,
}

impl LabelNames {
    pub fn from_config(config: &GmailConfig) -> Self {
        Self {
            processed: config.processed_label.clone(),
            noise: config.noise_label.clone(),
            promotional: config.promotional_label.clone(),
            informational: config.informational_label.clone(),
        }
    }

    /// Every label a disposal may reference
    pub fn all(&self) -> [&str; 4] {
        [
            self.noise.as_str(),
            self.promotional.as_str(),
            self.informational.as_str(),
            self.processed.as_str(),
        ]
    }

    /// Category label and whether the item leaves the inbox
    pub fn disposition(&self, category: EmailCategory) -> (Option<&str>, bool) {
        match category {
            EmailCategory::Noise => (Some(self.noise.as_str()), true),
            EmailCategory::Promotional => (Some(self.promotional.as_str()), true),
            EmailCategory::Informational => (Some(self.informational.as_str()), true),
            EmailCategory::Actionable => (None, false),
        }
    }
}

/// Applies the label/archive action for each classified item. Each disposal is one
/// mailbox mutation, so an item that fails keeps its inbox state and is collected again.
pub struct Labeler {
    store: Arc<dyn MailStore>,
    labels: LabelNames,
}

impl Labeler {
    pub fn new(store: Arc<dyn MailStore>, labels: LabelNames) -> Self {
        Self { store, labels }
    }

    pub async fn prepare(&self) -> AppResult<()> {
        for label in self.labels.all() {
            self.store.ensure_label_exists(label).await?;
        }
        Ok(())
    }

    async fn dispose(&self, item: &EmailItem, category: EmailCategory) -> AppResult<ApplyOutcome> {
        let (category_label, archive) = self.labels.disposition(category);
        let add = category_label
            .into_iter()
            .chain([self.labels.processed.as_str()])
            .collect::<Vec<_>>();
        let remove: &[&str] = if archive { &[INBOX_LABEL] } else { &[] };

        self.store.modify_labels(&item.id, &add, remove).await?;

        Ok(ApplyOutcome::Applied {
            labels_added: add.into_iter().map(String::from).collect(),
            archived: archive,
        })
    }

    pub async fn apply(&self, item: &EmailItem, outcome: &ItemOutcome) -> ApplyOutcome {
        let Some(result) = outcome.result() else {
            return ApplyOutcome::Skipped;
        };

        match self.dispose(item, result.category).await {
            Ok(applied) => {
                tracing::debug!("Disposed {} as {}", item.id, result.category);
                applied
            }
            Err(e) => {
                tracing::error!("Failed to dispose {}: {}", item.id, e);
                ApplyOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Dispose every item, in order. Label setup happens once, before the first disposal.
    pub async fn apply_all(
        &self,
        items: &[EmailItem],
        outcomes: &[ItemOutcome],
    ) -> Vec<ApplyOutcome> {
        if outcomes.iter().all(ItemOutcome::is_failed) {
            return outcomes.iter().map(|_| ApplyOutcome::Skipped).collect();
        }

        if let Err(e) = self.prepare().await {
            tracing::error!("Could not set up labels: {}", e);
            let error = e.to_string();
            return outcomes
                .iter()
                .map(|o| match o {
                    ItemOutcome::Classified(_) => ApplyOutcome::Failed {
                        error: error.clone(),
                    },
                    ItemOutcome::Failed { .. } => ApplyOutcome::Skipped,
                })
                .collect();
        }

        let mut disposals = Vec::with_capacity(outcomes.len());
        for (item, outcome) in items.iter().zip(outcomes) {
            disposals.push(self.apply(item, outcome).await);
        }
        disposals
    }
}
