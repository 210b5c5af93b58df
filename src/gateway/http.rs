//! HTTP payment gateway speaking a form-encoded REST API.

use async_trait::async_trait;
use serde::Deserialize;

use super::client::GATEWAY_HTTP_CLIENT;
use super::provider::PaymentGateway;
use super::types::{
    ChargeRequest, GatewayError, GatewayRefund, GatewayTransfer, PaymentIntent, TransferRequest,
};

const PAYMENT_INTENTS_PATH: &str = "/v1/payment_intents";
const REFUNDS_PATH: &str = "/v1/refunds";
const TRANSFERS_PATH: &str = "/v1/transfers";

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
    amount: i64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    amount: i64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Provider client authenticated with a bearer secret key.
pub struct HttpGateway {
    base_url: String,
    secret_key: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            secret_key: secret_key.into(),
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        operation: &str,
        form: &[(String, String)],
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let response = GATEWAY_HTTP_CLIENT
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e: reqwest::Error| GatewayError::Retryable {
                message: format!("{} request failed: {}", operation, e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            // 5xx and rate limits are provider trouble; anything else is the
            // provider refusing this request.
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(GatewayError::Retryable {
                    message: format!("{} returned {}: {}", operation, status, message),
                });
            }
            return Err(GatewayError::Permanent {
                message: format!("{} returned {}: {}", operation, status, message),
            });
        }

        response
            .json()
            .await
            .map_err(|e: reqwest::Error| GatewayError::Permanent {
                message: format!("{} invalid JSON: {}", operation, e),
            })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create_payment_intent(
        &self,
        request: ChargeRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), request.amount_cents.to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("description".to_string(), request.description.clone()),
        ];
        if let Some(fee) = request.application_fee_cents {
            form.push(("application_fee_amount".to_string(), fee.to_string()));
        }
        if let Some(destination) = &request.destination_account {
            form.push((
                "transfer_data[destination]".to_string(),
                destination.clone(),
            ));
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let data: IntentResponse = self
            .post_form(PAYMENT_INTENTS_PATH, "create_payment_intent", &form)
            .await?;
        Ok(PaymentIntent {
            id: data.id,
            client_secret: data.client_secret,
            amount_cents: data.amount,
            currency: data.currency,
            status: data.status,
        })
    }

    async fn cancel_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, GatewayError> {
        let path = format!("{}/{}/cancel", PAYMENT_INTENTS_PATH, payment_intent_id);
        let data: IntentResponse = self
            .post_form(&path, "cancel_payment_intent", &[])
            .await?;
        Ok(PaymentIntent {
            id: data.id,
            client_secret: data.client_secret,
            amount_cents: data.amount,
            currency: data.currency,
            status: data.status,
        })
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount_cents: i64,
        reverse_transfer: bool,
    ) -> Result<GatewayRefund, GatewayError> {
        let form = vec![
            (
                "payment_intent".to_string(),
                payment_intent_id.to_string(),
            ),
            ("amount".to_string(), amount_cents.to_string()),
            ("reverse_transfer".to_string(), reverse_transfer.to_string()),
        ];
        let data: RefundResponse = self.post_form(REFUNDS_PATH, "create_refund", &form).await?;
        Ok(GatewayRefund {
            id: data.id,
            amount_cents: data.amount,
            status: data.status,
        })
    }

    async fn create_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<GatewayTransfer, GatewayError> {
        let form = vec![
            ("amount".to_string(), request.amount_cents.to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("destination".to_string(), request.destination_account.clone()),
            ("description".to_string(), request.description.clone()),
        ];
        let data: TransferResponse = self
            .post_form(TRANSFERS_PATH, "create_transfer", &form)
            .await?;
        Ok(GatewayTransfer {
            id: data.id,
            amount_cents: data.amount,
            currency: data.currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let gateway = HttpGateway::new("https://api.example.com/", "sk_test");
        assert_eq!(gateway.base_url, "https://api.example.com");
    }

    #[test]
    fn error_body_parses_provider_shape() {
        let body = r#"{"error":{"message":"No such payment_intent"}}"#;
        let parsed: ApiErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "No such payment_intent");
    }
}
