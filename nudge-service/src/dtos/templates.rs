use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    pub tone: String,
    #[validate(length(min = 1, max = 300, message = "Subject cannot be empty"))]
    pub subject: String,
    #[validate(length(min = 1, max = 20000, message = "Body cannot be empty"))]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct RevertTemplateRequest {
    pub tone: String,
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    /// Defaults to the template's canonical tone.
    pub tone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub ok: bool,
    pub template_id: String,
    pub tone: String,
    pub subject: String,
    pub body: String,
    pub html: String,
}
