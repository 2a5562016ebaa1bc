extern crate google_gmail1 as gmail1;

use async_trait::async_trait;
use futures::future::join_all;
use gmail1::api::{Label, ListLabelsResponse, ListMessagesResponse, Message};
use indexmap::IndexSet;
use leaky_bucket::RateLimiter;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;

use crate::{
    error::{status_error, AppError, AppResult},
    HttpClient,
};

use super::{auth::GmailTokenProvider, item::EmailItem, MailStore};

/// Per-call quota units, see https://developers.google.com/gmail/api/reference/quota
pub struct GmailApiQuota {
    pub messages_list: usize,
    pub messages_get: usize,
    pub messages_modify: usize,
    pub labels_list: usize,
    pub labels_create: usize,
}

pub const GMAIL_API_QUOTA: GmailApiQuota = GmailApiQuota {
    messages_list: 5,
    messages_get: 5,
    messages_modify: 5,
    labels_list: 1,
    labels_create: 5,
};

pub const GMAIL_QUOTA_PER_SECOND: usize = 250;

pub const MAX_MESSAGES_PER_PAGE_DEFAULT: usize = 500;
const METADATA_FETCH_CHUNK: usize = 25;

const SYSTEM_LABELS: &[&str] = &[
    "INBOX",
    "UNREAD",
    "STARRED",
    "IMPORTANT",
    "SENT",
    "DRAFT",
    "SPAM",
    "TRASH",
];

macro_rules! gmail_url {
    ($($params:expr),*) => {
        {
            const GMAIL_ENDPOINT: &str = "https://www.googleapis.com/gmail/v1/users/me";
            let list_params = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", GMAIL_ENDPOINT, path)
        }
    };
}

fn is_system_label(name: &str) -> bool {
    SYSTEM_LABELS.contains(&name) || name.starts_with("CATEGORY_")
}

pub struct GmailClient {
    http_client: HttpClient,
    tokens: GmailTokenProvider,
    rate_limiter: Arc<RateLimiter>,
    max_items: usize,
    /// label name -> label id
    label_ids: RwLock<HashMap<String, String>>,
}

impl GmailClient {
    pub fn new(http_client: HttpClient, tokens: GmailTokenProvider, max_items: usize) -> Self {
        let rate_limiter = Arc::new(
            RateLimiter::builder()
                .initial(GMAIL_QUOTA_PER_SECOND)
                .interval(Duration::from_secs(1))
                .refill(GMAIL_QUOTA_PER_SECOND)
                .max(GMAIL_QUOTA_PER_SECOND)
                .build(),
        );

        Self {
            http_client,
            tokens,
            rate_limiter,
            max_items,
            label_ids: RwLock::new(HashMap::new()),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> AppResult<T> {
        let access_token = self.tokens.access_token().await?;
        let resp = req.bearer_auth(access_token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        Ok(resp.json::<T>().await?)
    }

    pub async fn get_message_list(
        &self,
        query: &str,
        page_token: Option<String>,
        max_results: usize,
    ) -> AppResult<ListMessagesResponse> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;

        let mut params = vec![
            ("q".to_string(), query.to_string()),
            ("maxResults".to_string(), max_results.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken".to_string(), token));
        }

        self.send_json(self.http_client.get(gmail_url!("messages")).query(&params))
            .await
    }

    /// Ids matching `query`, in store order, at most `max_items`
    pub async fn list_message_ids(&self, query: &str) -> AppResult<Vec<String>> {
        let mut ids = IndexSet::new();
        let mut page_token = None;

        loop {
            let remaining = self.max_items - ids.len();
            let page = self
                .get_message_list(
                    query,
                    page_token.take(),
                    remaining.min(MAX_MESSAGES_PER_PAGE_DEFAULT),
                )
                .await?;

            for message in page.messages.unwrap_or_default() {
                if ids.len() >= self.max_items {
                    break;
                }
                if let Some(id) = message.id {
                    ids.insert(id);
                }
            }

            match page.next_page_token {
                Some(token) if ids.len() < self.max_items => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids.into_iter().collect())
    }

    pub async fn get_message_metadata(&self, message_id: &str) -> AppResult<Message> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_get)
            .await;

        self.send_json(
            self.http_client
                .get(gmail_url!("messages", message_id))
                .query(&[
                    ("format", "metadata"),
                    ("metadataHeaders", "From"),
                    ("metadataHeaders", "Subject"),
                ]),
        )
        .await
    }

    pub async fn get_labels(&self) -> AppResult<Vec<Label>> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.labels_list).await;
        let data: ListLabelsResponse = self
            .send_json(self.http_client.get(gmail_url!("labels")))
            .await?;

        Ok(data.labels.unwrap_or_default())
    }

    async fn refresh_label_cache(&self) -> AppResult<()> {
        let labels = self.get_labels().await?;
        let mut cache = self.label_ids.write().await;
        for label in labels {
            if let (Some(name), Some(id)) = (label.name, label.id) {
                cache.insert(name, id);
            }
        }
        Ok(())
    }

    async fn cached_label_id(&self, label_name: &str) -> Option<String> {
        self.label_ids.read().await.get(label_name).cloned()
    }

    async fn resolve_label_id(&self, label_name: &str) -> AppResult<String> {
        if is_system_label(label_name) {
            return Ok(label_name.to_string());
        }
        if let Some(id) = self.cached_label_id(label_name).await {
            return Ok(id);
        }
        self.refresh_label_cache().await?;
        self.cached_label_id(label_name)
            .await
            .ok_or_else(|| AppError::Transport(format!("Label {} does not exist", label_name)))
    }

    pub async fn create_label(&self, label_name: &str) -> AppResult<()> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.labels_create)
            .await;

        let label = Label {
            name: Some(label_name.to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            message_list_visibility: Some("show".to_string()),
            ..Default::default()
        };

        match self
            .send_json::<Label>(self.http_client.post(gmail_url!("labels")).json(&label))
            .await
        {
            Ok(created) => {
                if let Some(id) = created.id {
                    self.label_ids
                        .write()
                        .await
                        .insert(label_name.to_string(), id);
                }
                tracing::info!("Created label {}", label_name);
                Ok(())
            }
            Err(AppError::Transport(msg)) if msg.starts_with(StatusCode::CONFLICT.as_str()) => {
                // Label already exists
                self.refresh_label_cache().await
            }
            Err(e) => Err(e),
        }
    }

    async fn modify_label_ids(
        &self,
        message_id: &str,
        add: &[String],
        remove: &[String],
    ) -> AppResult<()> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_modify)
            .await;

        let _: Message = self
            .send_json(
                self.http_client
                    .post(gmail_url!("messages", message_id, "modify"))
                    .json(&json!({
                        "addLabelIds": add,
                        "removeLabelIds": remove,
                    })),
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl MailStore for GmailClient {
    async fn list_unprocessed_inbox_items(&self, query: &str) -> AppResult<Vec<EmailItem>> {
        let ids = self.list_message_ids(query).await?;
        tracing::info!("Found {} messages for query {:?}", ids.len(), query);

        let mut items = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(METADATA_FETCH_CHUNK) {
            let messages = join_all(chunk.iter().map(|id| self.get_message_metadata(id))).await;
            for message in messages {
                items.push(EmailItem::from_gmail_message(message?)?);
            }
        }

        Ok(items)
    }

    async fn modify_labels(&self, item_id: &str, add: &[&str], remove: &[&str]) -> AppResult<()> {
        let mut add_ids = Vec::with_capacity(add.len());
        for label_name in add {
            add_ids.push(self.resolve_label_id(label_name).await?);
        }
        let mut remove_ids = Vec::with_capacity(remove.len());
        for label_name in remove {
            remove_ids.push(self.resolve_label_id(label_name).await?);
        }
        // one messages.modify call, so Gmail applies all of it or none of it
        self.modify_label_ids(item_id, &add_ids, &remove_ids).await
    }

    async fn ensure_label_exists(&self, label_name: &str) -> AppResult<()> {
        if is_system_label(label_name) || self.cached_label_id(label_name).await.is_some() {
            return Ok(());
        }
        self.refresh_label_cache().await?;
        if self.cached_label_id(label_name).await.is_some() {
            return Ok(());
        }
        self.create_label(label_name).await
    }
}
