use serde::Deserialize;
use validator::Validate;

/// Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkspaceRequest {
    #[validate(length(max = 200))]
    pub display_name: Option<String>,
    #[validate(length(max = 200))]
    pub company_name: Option<String>,
    pub default_tone: Option<String>,
    #[validate(range(min = 0, max = 365, message = "Payment terms must be between 0 and 365 days"))]
    pub default_payment_terms_days: Option<i64>,
    /// Blank clears the stored address.
    pub cc_email: Option<String>,
}
