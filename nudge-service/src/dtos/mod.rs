pub mod clients;
pub mod flows;
pub mod invoices;
pub mod templates;
pub mod workspace;

pub use clients::CreateClientRequest;
pub use flows::{ApplyFlowRequest, CreateFlowRequest};
pub use invoices::{CreateInvoiceRequest, CronParams, ResendRequest, UpdateInvoiceRequest};
pub use templates::{PreviewParams, PreviewResponse, RevertTemplateRequest, UpdateTemplateRequest};
pub use workspace::UpdateWorkspaceRequest;

use crate::models::Tone;
use service_core::error::AppError;

/// Parses a tone from request input, with the error message the API shows.
pub fn parse_tone(raw: &str) -> Result<Tone, AppError> {
    raw.parse::<Tone>()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))
}
