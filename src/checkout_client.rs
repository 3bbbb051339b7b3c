use crate::domain::Plan;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

/// Client for the hosted checkout provider. Sessions are created with a
/// form-encoded `POST {base_url}/v1/checkout/sessions`, the provider's wire
/// format for nested fields (`line_items[0][price_data][currency]`).
#[derive(Clone)]
pub struct CheckoutClient {
    http_client: Client,
    base_url: String,
    secret_key: Secret<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

impl CheckoutClient {
    pub fn new(base_url: String, secret_key: Secret<String>, timeout: Duration) -> Self {
        let http_client = Client::builder().timeout(timeout).build().unwrap();

        Self {
            http_client,
            base_url,
            secret_key,
        }
    }

    pub async fn create_session(
        &self,
        plan: Plan,
        upload_id: Uuid,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, reqwest::Error> {
        let url = format!("{}/v1/checkout/sessions", &self.base_url);
        let form: Vec<(&str, String)> = vec![
            ("mode", "payment".into()),
            ("success_url", success_url.into()),
            ("cancel_url", cancel_url.into()),
            ("payment_method_types[0]", "card".into()),
            ("payment_method_types[1]", "boleto".into()),
            ("billing_address_collection", "required".into()),
            ("line_items[0][quantity]", "1".into()),
            ("line_items[0][price_data][currency]", "brl".into()),
            (
                "line_items[0][price_data][unit_amount]",
                plan.amount_cents().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                plan.description().into(),
            ),
            ("metadata[upload_id]", upload_id.to_string()),
            ("metadata[plan]", plan.as_ref().into()),
        ];

        let session = self
            .http_client
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<CheckoutSession>()
            .await?;

        Ok(session)
    }
}
