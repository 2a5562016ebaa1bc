use async_trait::async_trait;
use derive_more::derive::Display;

use crate::{email::EmailItem, error::AppResult, model::EmailCategory};

pub mod chat;

pub use chat::ChatClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ClassifierRole {
    #[display("primary")]
    Primary,
    #[display("critic")]
    Critic,
}

/// One classifier's answer, confidence already on the normalized scale
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierVerdict {
    pub category: EmailCategory,
    pub confidence: f32,
    pub reasoning: String,
    pub keywords: Vec<String>,
}

/// Prior verdicts handed back to the classifiers on a refinement pass
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementContext {
    pub attempt: u32,
    pub primary: ClassifierVerdict,
    pub critic: ClassifierVerdict,
    pub consensus_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    /// Set when the critic is asked to review the primary's verdict
    pub primary: Option<ClassifierVerdict>,
    pub refinement: Option<RefinementContext>,
}

impl ClassificationRequest {
    pub fn for_item(item: &EmailItem) -> Self {
        Self {
            sender: item.sender.clone(),
            subject: item.subject.clone(),
            snippet: item.snippet.clone(),
            primary: None,
            refinement: None,
        }
    }

    pub fn with_primary(mut self, primary: ClassifierVerdict) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_refinement(mut self, refinement: Option<RefinementContext>) -> Self {
        self.refinement = refinement;
        self
    }
}

/// A backend that maps one message to a category with a confidence.
#[async_trait]
pub trait TextClassifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, request: &ClassificationRequest) -> AppResult<ClassifierVerdict>;
}
