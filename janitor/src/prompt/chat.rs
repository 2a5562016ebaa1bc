use std::str::FromStr;

use anyhow::Context;
use indoc::formatdoc;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::IntoEnumIterator;

use crate::{
    app_config::{ConfidenceScale, ModelConfig},
    error::{status_error, AppError, AppResult},
    model::EmailCategory,
    rate_limiters::RateLimiters,
    util::truncate_chars,
    HttpClient,
};

use super::{ClassificationRequest, ClassifierRole, ClassifierVerdict, TextClassifier};

const MAX_REASONING_CHARS: usize = 1000;

static RE_JSON_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());
static RE_CAT: Lazy<Regex> = Lazy::new(|| Regex::new(r#""category"\s*:\s*"([^"]*)""#).unwrap());
static RE_CONF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""confidence"\s*:\s*"?(-?[0-9]+(?:\.[0-9]+)?)"#).unwrap());
static RE_REASONING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""reasoning"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());

fn category_list() -> String {
    EmailCategory::iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}: {}", i + 1, c, c.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn system_prompt(role: ClassifierRole, scale: ConfidenceScale) -> String {
    match role {
        ClassifierRole::Primary => formatdoc! {r#"
            You are an expert email classifier that classifies emails into exactly one of the following categories:
            {categories}
            Your confidence score is {range} and reflects how certain you are about the classification.
            You will only respond with a JSON object with the keys category, confidence, reasoning and keywords. Do not provide multiple categories."#,
            categories = category_list(),
            range = scale.prompt_range(),
        },
        ClassifierRole::Critic => formatdoc! {r#"
            You are a strict email classification reviewer. Your job is to catch errors, not approve everything.
            The categories are:
            {categories}
            Question the classifier's answer. Look for ACTIONABLE emails mislabeled as NOISE, NOISE mislabeled as ACTIONABLE, and PROMOTIONAL vs INFORMATIONAL confusion.
            Give the category YOU believe is correct with your confidence score, which is {range}.
            You will only respond with a JSON object with the keys category, confidence, reasoning and keywords."#,
            categories = category_list(),
            range = scale.prompt_range(),
        },
    }
}

fn user_prompt(request: &ClassificationRequest) -> String {
    let mut prompt = formatdoc! {r#"
        Classify the following email.
        <sender>{sender}</sender>
        <subject>{subject}</subject>
        <snippet>{snippet}</snippet>"#,
        sender = request.sender,
        subject = request.subject,
        snippet = request.snippet,
    };

    if let Some(primary) = &request.primary {
        prompt.push_str(&formatdoc! {r#"

            The classifier answered:
            category: {category}
            confidence: {confidence:.2}
            reasoning: {reasoning}
            keywords: {keywords}"#,
            category = primary.category,
            confidence = primary.confidence,
            reasoning = primary.reasoning,
            keywords = primary.keywords.join(", "),
        });
    }

    if let Some(refinement) = &request.refinement {
        prompt.push_str(&formatdoc! {r#"

            This is refinement attempt {attempt}. The previous attempt did not reach agreement.
            Previous classifier answer: {primary} ({primary_conf:.2}) because {primary_reason}
            Previous reviewer answer: {critic} ({critic_conf:.2}) because {critic_reason}
            Weighted agreement was only {consensus:.2}. Look again for specific evidence."#,
            attempt = refinement.attempt,
            primary = refinement.primary.category,
            primary_conf = refinement.primary.confidence,
            primary_reason = refinement.primary.reasoning,
            critic = refinement.critic.category,
            critic_conf = refinement.critic.confidence,
            critic_reason = refinement.critic.reasoning,
            consensus = refinement.consensus_confidence,
        });
    }

    prompt
}

#[derive(Debug, Deserialize)]
struct AnswerJson {
    category: String,
    confidence: f32,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Parse a model reply into a verdict. Accepts chatty replies wrapping a JSON object and
/// falls back to field extraction when the object is not valid JSON.
pub fn parse_verdict(content: &str, scale: ConfidenceScale) -> AppResult<ClassifierVerdict> {
    let block = RE_JSON_BLOCK
        .find(content)
        .map(|m| m.as_str())
        .unwrap_or_else(|| content.trim());

    let answer = match serde_json::from_str::<AnswerJson>(block) {
        Ok(answer) => answer,
        Err(_) => {
            tracing::debug!("Could not parse JSON response, parsing manually...");
            let category = RE_CAT
                .captures(block)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| {
                    AppError::Validation(format!("No category in response: {:?}", content))
                })?;
            let confidence = RE_CONF
                .captures(block)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f32>().ok())
                .ok_or_else(|| {
                    AppError::Validation(format!("No confidence in response: {:?}", content))
                })?;
            let reasoning = RE_REASONING
                .captures(block)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().replace("\\\"", "\""));

            AnswerJson {
                category,
                confidence,
                reasoning,
                keywords: vec![],
            }
        }
    };

    let category = EmailCategory::from_str(answer.category.trim()).map_err(|_| {
        AppError::Validation(format!("Unknown category {:?}", answer.category))
    })?;
    let confidence = scale.normalize(answer.confidence).ok_or_else(|| {
        AppError::Validation(format!(
            "Confidence {} is outside the {:?} scale",
            answer.confidence, scale
        ))
    })?;

    Ok(ClassifierVerdict {
        category,
        confidence,
        reasoning: truncate_chars(answer.reasoning.unwrap_or_default().trim(), MAX_REASONING_CHARS),
        keywords: answer.keywords,
    })
}

/// Classifier backed by an OpenAI-compatible chat completions endpoint
pub struct ChatClassifier {
    http_client: HttpClient,
    rate_limiters: RateLimiters,
    name: String,
    endpoint: String,
    model: String,
    temperature: f64,
    api_key: Option<String>,
    role: ClassifierRole,
    scale: ConfidenceScale,
}

impl ChatClassifier {
    pub fn new(
        http_client: HttpClient,
        rate_limiters: RateLimiters,
        config: &ModelConfig,
        role: ClassifierRole,
        scale: ConfidenceScale,
    ) -> Self {
        let model = match role {
            ClassifierRole::Primary => config.primary_model.clone(),
            ClassifierRole::Critic => config.critic_model.clone(),
        };
        Self {
            http_client,
            rate_limiters,
            name: format!("{}:{}", role, model),
            endpoint: config.endpoint.clone(),
            model,
            temperature: config.temperature,
            api_key: config.api_key.clone(),
            role,
            scale,
        }
    }

    async fn send_prompt(&self, request: &ClassificationRequest) -> AppResult<ChatApiResponse> {
        self.rate_limiters.acquire_one().await;

        let mut req = self.http_client.post(&self.endpoint).json(&json!(
          {
            "model": &self.model,
            "temperature": self.temperature,
            "messages": [
              {
                "role": "system",
                "content": system_prompt(self.role, self.scale)
              },
              {
                "role": "user",
                "content": user_prompt(request)
              }
            ],
            "response_format": { "type": "json_object" }
          }
        ));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.rate_limiters.trigger_backoff();
            return Err(AppError::TooManyRequests);
        }
        let body = match resp.json::<serde_json::Value>().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => return Err(status_error(status, "")),
            Err(e) => return Err(e.into()),
        };

        let parsed = serde_json::from_value::<ChatApiResponseOrError>(body.clone())
            .context(format!("Could not parse chat response: {}", body))?;

        match parsed {
            ChatApiResponseOrError::Response(parsed) => Ok(parsed),
            ChatApiResponseOrError::Error(error)
            | ChatApiResponseOrError::NestedError { error } => {
                if error.message.to_lowercase().contains("rate limit exceeded") {
                    self.rate_limiters.trigger_backoff();
                    return Err(AppError::TooManyRequests);
                }
                Err(AppError::Transport(format!("Chat API error: {}", error.message)))
            }
        }
    }
}

#[async_trait::async_trait]
impl TextClassifier for ChatClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, request: &ClassificationRequest) -> AppResult<ClassifierVerdict> {
        let parsed = self.send_prompt(request).await?;
        let choice = parsed
            .choices
            .first()
            .ok_or_else(|| AppError::Validation("No choices in response".to_string()))?;

        if let Some(usage) = &parsed.usage {
            tracing::trace!("{} used {} tokens", self.name, usage.total_tokens);
        }

        parse_verdict(&choice.message.content, self.scale)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ModelLength,
    Error,
    ToolCalls,
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<PromptUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
    NestedError { error: ChatApiError },
}
