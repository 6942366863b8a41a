use serde::Deserialize;
use validator::Validate;

/// Saves the templates of an existing invoice as a named flow.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlowRequest {
    #[validate(length(min = 1, max = 100, message = "Name cannot be empty"))]
    pub name: String,
    #[validate(length(min = 1, message = "Invoice id is required"))]
    pub invoice_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyFlowRequest {
    #[validate(length(min = 1, message = "Flow id is required"))]
    pub flow_id: String,
}
