use config::{Config, FileFormat};
use serde::Deserialize;
use std::{env, path::Path};

use crate::{
    error::{AppError, AppResult},
    model::EmailCategory,
};

const ENV_PREFIX: &str = "JANITOR";
const MAX_REFINEMENTS_LIMIT: u32 = 5;
const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

/// Scale the classifier backend reports confidence on.
/// Everything downstream of the backend works on the normalized scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceScale {
    #[default]
    Normalized,
    /// 1 to 5, mapped onto [0, 1] with (x - 1) / 4
    Ordinal,
}

impl ConfidenceScale {
    pub fn bounds(&self) -> (f32, f32) {
        match self {
            ConfidenceScale::Normalized => (0.0, 1.0),
            ConfidenceScale::Ordinal => (1.0, 5.0),
        }
    }

    /// Map a value on this scale onto [0, 1]. Returns None when the value is not finite
    /// or lies outside the scale.
    pub fn normalize(&self, value: f32) -> Option<f32> {
        let (low, high) = self.bounds();
        if !value.is_finite() || value < low || value > high {
            return None;
        }
        match self {
            ConfidenceScale::Normalized => Some(value),
            ConfidenceScale::Ordinal => Some((value - 1.0) / 4.0),
        }
    }

    pub fn prompt_range(&self) -> &'static str {
        match self {
            ConfidenceScale::Normalized => "a number between 0.0 and 1.0",
            ConfidenceScale::Ordinal => "an integer between 1 and 5",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    /// Expressed on `confidence_scale`
    pub confidence_threshold: f32,
    #[serde(default)]
    pub confidence_scale: ConfidenceScale,
    pub max_refinements: u32,
    pub classifier_weight: f32,
    pub critic_weight: f32,
    pub escalation_category: EmailCategory,
}

/// Validated consensus settings. Threshold and confidences are on the normalized scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusPolicy {
    pub confidence_threshold: f32,
    pub max_refinements: u32,
    pub classifier_weight: f32,
    pub critic_weight: f32,
    pub escalation_category: EmailCategory,
    pub scale: ConfidenceScale,
}

impl ClassificationConfig {
    pub fn validate(&self) -> AppResult<ConsensusPolicy> {
        let scale = self.confidence_scale;
        let confidence_threshold = scale.normalize(self.confidence_threshold).ok_or_else(|| {
            let (low, high) = scale.bounds();
            AppError::Configuration(format!(
                "confidence_threshold {} is outside the {:?} scale [{}, {}]",
                self.confidence_threshold, scale, low, high
            ))
        })?;

        if self.max_refinements > MAX_REFINEMENTS_LIMIT {
            return Err(AppError::Configuration(format!(
                "max_refinements {} exceeds the limit of {}",
                self.max_refinements, MAX_REFINEMENTS_LIMIT
            )));
        }

        for (name, weight) in [
            ("classifier_weight", self.classifier_weight),
            ("critic_weight", self.critic_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(AppError::Configuration(format!(
                    "{name} must be a finite, non-negative number, got {weight}"
                )));
            }
        }

        let sum = self.classifier_weight + self.critic_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(AppError::Configuration(format!(
                "classifier_weight + critic_weight must equal 1.0, got {sum}"
            )));
        }

        Ok(ConsensusPolicy {
            confidence_threshold,
            max_refinements: self.max_refinements,
            classifier_weight: self.classifier_weight / sum,
            critic_weight: self.critic_weight / sum,
            escalation_category: self.escalation_category,
            scale,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptLimits {
    pub rate_limit_per_sec: usize,
    pub refill_interval_ms: usize,
    pub refill_amount: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible chat completions endpoint
    pub endpoint: String,
    pub primary_model: String,
    pub critic_model: String,
    pub temperature: f64,
    #[serde(default)]
    pub api_key: Option<String>,
    pub prompt_limits: PromptLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    pub inbox_query: String,
    pub processed_label: String,
    pub noise_label: String,
    pub promotional_label: String,
    pub informational_label: String,
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    pub max_items: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub run_once: bool,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    settings: Settings,
    classification: ClassificationConfig,
    model: ModelConfig,
    gmail: GmailConfig,
    collector: CollectorConfig,
    database: DatabaseConfig,
}

#[derive(Debug)]
pub struct JanitorConfig {
    pub settings: Settings,
    pub classification: ClassificationConfig,
    pub consensus: ConsensusPolicy,
    pub model: ModelConfig,
    pub gmail: GmailConfig,
    pub collector: CollectorConfig,
    pub database: DatabaseConfig,
}

impl JanitorConfig {
    /// Load `config.toml` from `APP_DIR` (or `<workspace>/config`), apply `JANITOR__*`
    /// overrides and secrets from the environment, then validate.
    pub fn load() -> AppResult<Self> {
        let root = match env::var("APP_DIR") {
            Ok(dir) => dir,
            Err(_) => {
                let dir = env::var("CARGO_MANIFEST_DIR").map_err(|_| {
                    AppError::Configuration("CARGO_MANIFEST_DIR or APP_DIR is required".into())
                })?;
                let parent = Path::new(&dir)
                    .parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or(dir);
                format!("{parent}/config")
            }
        };
        let path = format!("{root}/config.toml");

        let cfg_file: ConfigFile = Config::builder()
            .add_source(config::File::with_name(&path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Self::from_file(cfg_file, |key| env::var(key).ok())
    }

    /// Build from TOML text; secrets are not read from the environment
    pub fn from_toml_str(contents: &str) -> AppResult<Self> {
        let cfg_file: ConfigFile = Config::builder()
            .add_source(config::File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        Self::from_file(cfg_file, |_| None)
    }

    fn from_file(cfg_file: ConfigFile, secret: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let ConfigFile {
            settings,
            classification,
            mut model,
            mut gmail,
            collector,
            database,
        } = cfg_file;

        if let Some(key) = secret("MODEL_API_KEY") {
            model.api_key = Some(key);
        }
        if let Some(id) = secret("GMAIL_CLIENT_ID") {
            gmail.client_id = id;
        }
        if let Some(client_secret) = secret("GMAIL_CLIENT_SECRET") {
            gmail.client_secret = client_secret;
        }
        if let Some(token) = secret("GMAIL_REFRESH_TOKEN") {
            gmail.refresh_token = token;
        }

        let consensus = classification.validate()?;

        if settings.poll_interval_secs == 0 {
            return Err(AppError::Configuration(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        if collector.max_items == 0 {
            return Err(AppError::Configuration(
                "collector.max_items must be at least 1".into(),
            ));
        }
        for (name, label) in [
            ("processed_label", &gmail.processed_label),
            ("noise_label", &gmail.noise_label),
            ("promotional_label", &gmail.promotional_label),
            ("informational_label", &gmail.informational_label),
        ] {
            if label.trim().is_empty() {
                return Err(AppError::Configuration(format!(
                    "gmail.{name} must not be empty"
                )));
            }
        }

        Ok(JanitorConfig {
            settings,
            classification,
            consensus,
            model,
            gmail,
            collector,
            database,
        })
    }
}

impl std::fmt::Display for JanitorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Janitor Config:\n{:?}\n\nClassification: {:?}\n\nModel: endpoint={} primary={} critic={} temperature={} api_key={}\n\nGmail: query={:?} processed={} noise={} promotions={} newsletters={} client_id={}\n\nCollector: {:?}\n\nDatabase: {:?}",
            self.settings,
            self.consensus,
            self.model.endpoint,
            self.model.primary_model,
            self.model.critic_model,
            self.model.temperature,
            if self.model.api_key.is_some() { "set" } else { "unset" },
            self.gmail.inbox_query,
            self.gmail.processed_label,
            self.gmail.noise_label,
            self.gmail.promotional_label,
            self.gmail.informational_label,
            if self.gmail.client_id.is_empty() { "unset" } else { "set" },
            self.collector,
            self.database,
        )
    }
}
