use async_trait::async_trait;

use crate::error::AppResult;

pub mod auth;
pub mod client;
pub mod item;

pub use item::EmailItem;

/// System label whose removal archives a message
pub const INBOX_LABEL: &str = "INBOX";

/// Operations the pipeline needs from a mailbox
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Items matching a Gmail search query, in store order
    async fn list_unprocessed_inbox_items(&self, query: &str) -> AppResult<Vec<EmailItem>>;

    /// Add and remove labels in a single mutation: either every change lands or none does
    async fn modify_labels(&self, item_id: &str, add: &[&str], remove: &[&str]) -> AppResult<()>;

    async fn add_label(&self, item_id: &str, label_name: &str) -> AppResult<()> {
        self.modify_labels(item_id, &[label_name], &[]).await
    }

    async fn remove_label(&self, item_id: &str, label_name: &str) -> AppResult<()> {
        self.modify_labels(item_id, &[], &[label_name]).await
    }

    /// Create the label if it is missing; idempotent
    async fn ensure_label_exists(&self, label_name: &str) -> AppResult<()>;
}

/// Label name as it must appear in a `label:` search term
pub fn label_search_term(label_name: &str) -> String {
    label_name.replace(['/', ' '], "-")
}

pub fn build_collection_query(inbox_query: &str, processed_label: &str) -> String {
    format!(
        "{} -label:{}",
        inbox_query.trim(),
        label_search_term(processed_label)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_search_term() {
        assert_eq!(label_search_term("janitor/done"), "janitor-done");
        assert_eq!(label_search_term("My Label/sub"), "My-Label-sub");
        assert_eq!(label_search_term("plain"), "plain");
    }

    #[test]
    fn test_build_collection_query() {
        assert_eq!(
            build_collection_query("in:inbox is:unread -in:sent", "janitor/done"),
            "in:inbox is:unread -in:sent -label:janitor-done"
        );
    }
}
