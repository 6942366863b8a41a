use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::template::TemplateInstance;

/// A named snapshot of a full template set.
///
/// Applying a flow deep-copies `templates` into the invoice; invoices never
/// reference a flow afterwards, so deleting one leaves them untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailFlow {
    pub flow_id: String,
    pub user_id: String,
    pub name: String,
    pub schedule: String,
    #[serde(default)]
    pub templates: Vec<TemplateInstance>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::models::datetime"
    )]
    pub created_at: Option<DateTime<Utc>>,
}
