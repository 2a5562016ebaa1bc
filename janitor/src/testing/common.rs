use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use sea_orm::DatabaseConnection;

use crate::{
    app_config::{ConfidenceScale, ConsensusPolicy},
    email::{label_search_term, EmailItem, MailStore},
    error::{AppError, AppResult},
    model::EmailCategory,
    pipeline::labeler::LabelNames,
    prompt::{ClassificationRequest, ClassifierVerdict, TextClassifier},
};

pub async fn setup_db() -> DatabaseConnection {
    crate::db_core::connect(":memory:")
        .await
        .expect("in-memory database")
}

pub fn test_item(id: &str, sender: &str, subject: &str) -> EmailItem {
    EmailItem {
        id: id.to_string(),
        thread_id: format!("t-{id}"),
        sender: sender.to_string(),
        subject: subject.to_string(),
        snippet: format!("{subject} ..."),
        label_ids: vec!["INBOX".to_string(), "UNREAD".to_string()],
    }
}

pub fn verdict(category: EmailCategory, confidence: f32) -> ClassifierVerdict {
    ClassifierVerdict {
        category,
        confidence,
        reasoning: format!("looks {}", category.as_str().to_lowercase()),
        keywords: vec![],
    }
}

pub fn test_policy() -> ConsensusPolicy {
    ConsensusPolicy {
        confidence_threshold: 0.95,
        max_refinements: 1,
        classifier_weight: 0.6,
        critic_weight: 0.4,
        escalation_category: EmailCategory::Actionable,
        scale: ConfidenceScale::Normalized,
    }
}

pub fn test_label_names() -> LabelNames {
    LabelNames {
        processed: "janitor/done".to_string(),
        noise: "janitor/noise".to_string(),
        promotional: "janitor/promotions".to_string(),
        informational: "janitor/newsletters".to_string(),
    }
}

#[derive(Default)]
struct FakeMailbox {
    items: Vec<EmailItem>,
    labels: HashSet<String>,
    created: Vec<String>,
    mutations: Vec<String>,
    list_error: Option<String>,
    modify_errors: HashMap<String, String>,
    label_errors: HashMap<String, String>,
}

/// In-memory mailbox that understands the subset of Gmail search the collector emits
#[derive(Default)]
pub struct FakeMailStore {
    mailbox: Mutex<FakeMailbox>,
}

impl FakeMailStore {
    pub fn with_items(items: Vec<EmailItem>) -> Self {
        Self {
            mailbox: Mutex::new(FakeMailbox {
                items,
                ..Default::default()
            }),
        }
    }

    pub fn push_item(&self, item: EmailItem) {
        self.mailbox.lock().unwrap().items.push(item);
    }

    pub fn fail_listing(&self, error: &str) {
        self.mailbox.lock().unwrap().list_error = Some(error.to_string());
    }

    pub fn fail_modify(&self, item_id: &str, error: &str) {
        self.mailbox
            .lock()
            .unwrap()
            .modify_errors
            .insert(item_id.to_string(), error.to_string());
    }

    /// Fail any mutation that adds or removes `label_name`
    pub fn fail_label(&self, label_name: &str, error: &str) {
        self.mailbox
            .lock()
            .unwrap()
            .label_errors
            .insert(label_name.to_string(), error.to_string());
    }

    pub fn clear_failures(&self) {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.modify_errors.clear();
        mailbox.label_errors.clear();
    }

    pub fn labels_of(&self, item_id: &str) -> Vec<String> {
        self.mailbox
            .lock()
            .unwrap()
            .items
            .iter()
            .find(|i| i.id == item_id)
            .map(|i| i.label_ids.clone())
            .unwrap_or_default()
    }

    pub fn created_labels(&self) -> Vec<String> {
        self.mailbox.lock().unwrap().created.clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mailbox.lock().unwrap().mutations.clone()
    }

    fn matches(item: &EmailItem, query: &str) -> bool {
        query.split_whitespace().all(|term| match term {
            "in:inbox" => item.has_label("INBOX"),
            "is:unread" => item.has_label("UNREAD"),
            _ => match term.strip_prefix("-label:") {
                Some(label) => !item
                    .label_ids
                    .iter()
                    .any(|l| label_search_term(l) == label),
                None => true,
            },
        })
    }
}

#[async_trait]
impl MailStore for FakeMailStore {
    async fn list_unprocessed_inbox_items(&self, query: &str) -> AppResult<Vec<EmailItem>> {
        let mailbox = self.mailbox.lock().unwrap();
        if let Some(error) = &mailbox.list_error {
            return Err(AppError::Transport(error.clone()));
        }
        Ok(mailbox
            .items
            .iter()
            .filter(|item| Self::matches(item, query))
            .cloned()
            .collect())
    }

    async fn modify_labels(&self, item_id: &str, add: &[&str], remove: &[&str]) -> AppResult<()> {
        let mut mailbox = self.mailbox.lock().unwrap();
        if let Some(error) = mailbox.modify_errors.get(item_id) {
            return Err(AppError::Transport(error.clone()));
        }
        if let Some(error) = add
            .iter()
            .chain(remove)
            .find_map(|label| mailbox.label_errors.get(*label))
        {
            return Err(AppError::Transport(error.clone()));
        }

        let item = mailbox
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| AppError::Transport(format!("404 Not Found: {item_id}")))?;
        for label in add {
            if !item.has_label(label) {
                item.label_ids.push(label.to_string());
            }
        }
        item.label_ids.retain(|l| !remove.contains(&l.as_str()));

        let changes = add
            .iter()
            .map(|l| format!("+{l}"))
            .chain(remove.iter().map(|l| format!("-{l}")))
            .collect::<Vec<_>>();
        mailbox
            .mutations
            .push(format!("modify {item_id} {}", changes.join(" ")));
        Ok(())
    }

    async fn ensure_label_exists(&self, label_name: &str) -> AppResult<()> {
        let mut mailbox = self.mailbox.lock().unwrap();
        if mailbox.labels.insert(label_name.to_string()) {
            mailbox.created.push(label_name.to_string());
        }
        Ok(())
    }
}

type Script = Box<dyn Fn(&ClassificationRequest) -> AppResult<ClassifierVerdict> + Send + Sync>;

/// Classifier whose answers come from a closure; records every request it sees
pub struct ScriptedClassifier {
    script: Script,
    requests: Mutex<Vec<ClassificationRequest>>,
}

impl ScriptedClassifier {
    pub fn new(
        script: impl Fn(&ClassificationRequest) -> AppResult<ClassifierVerdict> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn constant(answer: ClassifierVerdict) -> Self {
        Self::new(move |_| Ok(answer.clone()))
    }

    /// Answers in order, repeating the last one
    pub fn sequence(answers: Vec<ClassifierVerdict>) -> Self {
        let calls = AtomicUsize::new(0);
        Self::new(move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            answers
                .get(n)
                .or_else(|| answers.last())
                .cloned()
                .ok_or_else(|| AppError::Validation("no scripted answer".to_string()))
        })
    }

    pub fn failing(error: impl Fn() -> AppError + Send + Sync + 'static) -> Self {
        Self::new(move |_| Err(error()))
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ClassificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextClassifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(&self, request: &ClassificationRequest) -> AppResult<ClassifierVerdict> {
        self.requests.lock().unwrap().push(request.clone());
        (self.script)(request)
    }
}
