use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub client_id: Option<String>,
    #[validate(range(min = 1, message = "Amount must be greater than zero"))]
    pub amount_cents: Option<i64>,
    /// `YYYY-MM-DD`. Defaults to today plus the workspace payment terms.
    pub due_date: Option<String>,
    #[validate(url(message = "Payment link must be a valid URL"))]
    pub payment_link: Option<String>,
    pub reminder_schedule: Option<String>,
}

/// Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    pub client_id: Option<String>,
    #[validate(range(min = 1, message = "Amount must be greater than zero"))]
    pub amount_cents: Option<i64>,
    pub due_date: Option<String>,
    #[validate(url(message = "Payment link must be a valid URL"))]
    pub payment_link: Option<String>,
    pub reminder_schedule: Option<String>,
}

impl UpdateInvoiceRequest {
    /// Whether the request touches a field frozen once the invoice is sent.
    pub fn touches_commercial_fields(&self) -> bool {
        self.client_id.is_some()
            || self.amount_cents.is_some()
            || self.due_date.is_some()
            || self.payment_link.is_some()
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    #[validate(length(min = 1, message = "Template id is required"))]
    pub template_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CronParams {
    pub secret: Option<String>,
}
