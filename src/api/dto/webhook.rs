//! Webhook acknowledgement DTO.

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::WebhookDisposition;

/// Acknowledgement returned to the payment provider. Every verified
/// delivery is acknowledged with 200 so the provider stops retrying;
/// `disposition` records what the engine did with it.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    /// What happened: processed, replayed, ignored or conflicted
    #[schema(example = "processed")]
    pub disposition: String,
}

impl From<WebhookDisposition> for WebhookAck {
    fn from(disposition: WebhookDisposition) -> Self {
        let label = match disposition {
            WebhookDisposition::Processed => "processed",
            WebhookDisposition::Replayed => "replayed",
            WebhookDisposition::Ignored => "ignored",
            WebhookDisposition::Conflicted => "conflicted",
        };
        Self {
            received: true,
            disposition: label.to_string(),
        }
    }
}
