use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};

/// Closed set of outcomes a message can be classified into
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum EmailCategory {
    Actionable,
    Informational,
    Promotional,
    Noise,
}

impl EmailCategory {
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }

    /// Prompt description of what belongs in the category
    pub fn description(&self) -> &'static str {
        match self {
            EmailCategory::Actionable => {
                "Security alerts, invoices, bills, or direct messages from individuals."
            }
            EmailCategory::Informational => {
                "Newsletters, shipping updates, or trusted industry news."
            }
            EmailCategory::Promotional => "Sales, coupons, or marketing offers.",
            EmailCategory::Noise => "Spam or irrelevant content.",
        }
    }
}
