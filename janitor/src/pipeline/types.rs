use chrono::{DateTime, Utc};

use crate::{email::EmailItem, model::EmailCategory};

/// Category text persisted for items whose classification failed
pub const FAILED_CATEGORY: &str = "FAILED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub enum ClassificationSource {
    /// Primary classifier was confident enough on its own
    ClassifierOnly,
    Consensus,
    /// Refinements exhausted without reaching the threshold
    EscalatedDefault,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub category: EmailCategory,
    /// Normalized to [0, 1]
    pub confidence: f32,
    pub reasoning: String,
    pub refinement_count: u32,
    pub source: ClassificationSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Classified(ClassificationResult),
    Failed { error: String },
}

impl ItemOutcome {
    pub fn result(&self) -> Option<&ClassificationResult> {
        match self {
            ItemOutcome::Classified(result) => Some(result),
            ItemOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        labels_added: Vec<String>,
        archived: bool,
    },
    Failed {
        error: String,
    },
    /// Classification failed, mailbox left untouched
    Skipped,
}

impl ApplyOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ApplyOutcome::Applied { .. } => "applied",
            ApplyOutcome::Failed { .. } => "failed",
            ApplyOutcome::Skipped => "skipped",
        }
    }

    /// Human readable description of what was done to the message
    pub fn action_text(&self) -> Option<String> {
        match self {
            ApplyOutcome::Applied {
                labels_added,
                archived,
            } => {
                let mut text = format!("labeled {}", labels_added.join(", "));
                if *archived {
                    text.push_str("; archived");
                }
                Some(text)
            }
            ApplyOutcome::Failed { .. } | ApplyOutcome::Skipped => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ApplyOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub actionable: usize,
    pub informational: usize,
    pub promotional: usize,
    pub noise: usize,
}

impl CategoryCounts {
    pub fn add(&mut self, category: EmailCategory) {
        match category {
            EmailCategory::Actionable => self.actionable += 1,
            EmailCategory::Informational => self.informational += 1,
            EmailCategory::Promotional => self.promotional += 1,
            EmailCategory::Noise => self.noise += 1,
        }
    }
}

/// Typed state threaded through one pipeline run
#[derive(Debug)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub items: Vec<EmailItem>,
    /// Parallel to `items`
    pub outcomes: Vec<ItemOutcome>,
    /// Parallel to `items`
    pub disposals: Vec<ApplyOutcome>,
    pub collection_error: Option<String>,
    /// Items collected but left unclassified because the run was cancelled
    pub deferred: usize,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            items: vec![],
            outcomes: vec![],
            disposals: vec![],
            collection_error: None,
            deferred: 0,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.collection_error.is_some() {
            return RunStatus::Failure;
        }
        let any_failed = self.outcomes.iter().any(ItemOutcome::is_failed)
            || self
                .disposals
                .iter()
                .any(|d| matches!(d, ApplyOutcome::Failed { .. }));
        if any_failed || self.deferred > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Success
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub emails_collected: usize,
    pub emails_classified: usize,
    pub emails_labelled: usize,
    pub errors_count: usize,
    pub counts: CategoryCounts,
    pub status: RunStatus,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn from_context(ctx: &RunContext, finished_at: DateTime<Utc>) -> Self {
        let mut counts = CategoryCounts::default();
        for result in ctx.outcomes.iter().filter_map(ItemOutcome::result) {
            counts.add(result.category);
        }

        let failed_items = ctx.outcomes.iter().filter(|o| o.is_failed()).count();
        let failed_disposals = ctx
            .disposals
            .iter()
            .filter(|d| matches!(d, ApplyOutcome::Failed { .. }))
            .count();
        let collection_errors = usize::from(ctx.collection_error.is_some());

        let error = match (&ctx.collection_error, ctx.deferred) {
            (Some(error), _) => Some(error.clone()),
            (None, 0) => None,
            (None, deferred) => Some(format!("cancelled; {} items deferred", deferred)),
        };

        Self {
            run_id: ctx.run_id.clone(),
            started_at: ctx.started_at,
            finished_at,
            emails_collected: ctx.outcomes.len(),
            emails_classified: ctx.outcomes.len() - failed_items,
            emails_labelled: ctx.disposals.iter().filter(|d| d.is_applied()).count(),
            errors_count: failed_items + failed_disposals + collection_errors,
            counts,
            status: ctx.status(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(category: EmailCategory) -> ItemOutcome {
        ItemOutcome::Classified(ClassificationResult {
            category,
            confidence: 0.98,
            reasoning: String::new(),
            refinement_count: 0,
            source: ClassificationSource::ClassifierOnly,
        })
    }

    fn applied() -> ApplyOutcome {
        ApplyOutcome::Applied {
            labels_added: vec!["janitor/done".to_string()],
            archived: false,
        }
    }

    #[test]
    fn test_empty_run_is_success() {
        let ctx = RunContext::new();
        let summary = RunSummary::from_context(&ctx, Utc::now());
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.emails_collected, 0);
        assert_eq!(summary.errors_count, 0);
        assert!(summary.error.is_none());
    }

    #[test]
    fn test_collection_failure() {
        let mut ctx = RunContext::new();
        ctx.collection_error = Some("Transport error: connection refused".to_string());
        let summary = RunSummary::from_context(&ctx, Utc::now());
        assert_eq!(summary.status, RunStatus::Failure);
        assert_eq!(summary.errors_count, 1);
        assert_eq!(
            summary.error.as_deref(),
            Some("Transport error: connection refused")
        );
    }

    #[test]
    fn test_partial_on_item_failure() {
        let mut ctx = RunContext::new();
        ctx.outcomes = vec![
            classified(EmailCategory::Noise),
            ItemOutcome::Failed {
                error: "Validation error: Unknown category".to_string(),
            },
            classified(EmailCategory::Noise),
        ];
        ctx.disposals = vec![
            applied(),
            ApplyOutcome::Skipped,
            ApplyOutcome::Failed {
                error: "Transport error: 503".to_string(),
            },
        ];

        let summary = RunSummary::from_context(&ctx, Utc::now());
        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.emails_collected, 3);
        assert_eq!(summary.emails_classified, 2);
        assert_eq!(summary.emails_labelled, 1);
        assert_eq!(summary.errors_count, 2);
        assert_eq!(summary.counts.noise, 2);
    }

    #[test]
    fn test_cancelled_run_notes_deferred_items() {
        let mut ctx = RunContext::new();
        ctx.outcomes = vec![classified(EmailCategory::Actionable)];
        ctx.disposals = vec![applied()];
        ctx.deferred = 4;

        let summary = RunSummary::from_context(&ctx, Utc::now());
        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(
            summary.error.as_deref(),
            Some("cancelled; 4 items deferred")
        );
    }

    #[test]
    fn test_action_text() {
        let outcome = ApplyOutcome::Applied {
            labels_added: vec!["janitor/noise".to_string(), "janitor/done".to_string()],
            archived: true,
        };
        assert_eq!(
            outcome.action_text().as_deref(),
            Some("labeled janitor/noise, janitor/done; archived")
        );
        assert_eq!(outcome.status(), "applied");
        assert_eq!(ApplyOutcome::Skipped.action_text(), None);
        assert_eq!(RunStatus::Partial.to_string(), "partial");
    }
}
