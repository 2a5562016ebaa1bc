use google_gmail1::api::Message;
use regex::Regex;

use crate::error::{AppError, AppResult};

const MAX_SNIPPET_CHARS: usize = 500;

lazy_static::lazy_static!(
    static ref RE_WHITESPACE: Regex = Regex::new(r"[\r\t\n]+").unwrap();
    static ref RE_LONG_SPACE: Regex = Regex::new(r" {2,}").unwrap();
    static ref RE_ZERO_WIDTH: Regex = Regex::new(r"[\x{200B}-\x{200D}\x{FEFF}\x{034F}]").unwrap();
    static ref RE_NUMERIC_ENTITY: Regex = Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap();
);

/// A message as the pipeline sees it. Built once by the collector and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailItem {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    pub snippet: String,
    pub label_ids: Vec<String>,
}

impl EmailItem {
    /// Build from a `messages.get` response fetched with `format=metadata`
    pub fn from_gmail_message(message: Message) -> AppResult<Self> {
        let id = message
            .id
            .ok_or_else(|| AppError::Transport("Gmail message without an id".to_string()))?;

        let mut sender = String::new();
        let mut subject = String::new();
        let headers = message
            .payload
            .and_then(|p| p.headers)
            .unwrap_or_default();
        for header in headers {
            match (header.name.as_deref(), header.value) {
                (Some(name), Some(value)) if name.eq_ignore_ascii_case("from") => sender = value,
                (Some(name), Some(value)) if name.eq_ignore_ascii_case("subject") => {
                    subject = value
                }
                _ => {}
            }
        }

        Ok(EmailItem {
            thread_id: message.thread_id.unwrap_or_else(|| id.clone()),
            id,
            sender,
            subject,
            snippet: clean_snippet(message.snippet.as_deref().unwrap_or_default()),
            label_ids: message.label_ids.unwrap_or_default(),
        })
    }

    pub fn has_label(&self, label_id: &str) -> bool {
        self.label_ids.iter().any(|l| l == label_id)
    }
}

fn decode_entities(text: &str) -> String {
    let decoded = RE_NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });

    decoded
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Gmail snippets arrive HTML-escaped and padded with preheader filler
pub fn clean_snippet(snippet: &str) -> String {
    let text = decode_entities(snippet);
    let text = RE_ZERO_WIDTH.replace_all(&text, "");
    let text = RE_WHITESPACE.replace_all(&text, " ");
    let text = RE_LONG_SPACE.replace_all(&text, " ");
    crate::util::truncate_chars(text.trim(), MAX_SNIPPET_CHARS)
}
