use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::template::Tone;

/// Per-user settings consumed by sending and placeholder substitution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default)]
    pub default_tone: Tone,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_payment_terms_days: Option<i64>,
    /// Optional address copied on every outgoing email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc_email: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::datetime"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}
