use std::sync::Arc;

use crate::{
    email::{build_collection_query, EmailItem, MailStore},
    error::AppResult,
};

/// Pulls the batch of unread inbox items that have not been dispositioned yet
pub struct Collector {
    store: Arc<dyn MailStore>,
    query: String,
}

impl Collector {
    pub fn new(store: Arc<dyn MailStore>, inbox_query: &str, processed_label: &str) -> Self {
        Self {
            store,
            query: build_collection_query(inbox_query, processed_label),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub async fn collect(&self) -> AppResult<Vec<EmailItem>> {
        let items = self.store.list_unprocessed_inbox_items(&self.query).await?;
        tracing::info!("Collected {} items", items.len());
        Ok(items)
    }
}
