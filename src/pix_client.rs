use crate::domain::{LetterSlug, PayerEmail, PayerName, PaymentStatus};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Client for the PIX payment provider (`POST /v1/payments` to create a
/// charge, `GET /v1/payments/{id}` for the authoritative status).
#[derive(Clone)]
pub struct PixClient {
    http_client: Client,
    base_url: String,
    access_token: Secret<String>,
}

impl PixClient {
    pub fn new(base_url: String, access_token: Secret<String>, timeout: Duration) -> Self {
        let http_client = Client::builder().timeout(timeout).build().unwrap();

        Self {
            http_client,
            base_url,
            access_token,
        }
    }

    pub async fn create_payment(
        &self,
        amount_cents: i64,
        description: &str,
        payer_email: &PayerEmail,
        payer_name: &PayerName,
        external_reference: &LetterSlug,
    ) -> Result<PixPayment, reqwest::Error> {
        let url = format!("{}/v1/payments", &self.base_url);
        let request_body = CreatePaymentRequest {
            // the provider wants the amount in BRL units, not cents
            transaction_amount: amount_cents as f64 / 100.0,
            description,
            payment_method_id: "pix",
            payer: Payer {
                email: payer_email.as_ref(),
                first_name: payer_name.first_name(),
                last_name: &payer_name.last_name(),
            },
            external_reference: external_reference.as_ref(),
        };

        let payment = self
            .http_client
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .header("X-Idempotency-Key", Uuid::new_v4().to_string())
            .json(&request_body)
            .send()
            .await?
            .error_for_status()?
            .json::<PixPayment>()
            .await?;

        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: &str) -> Result<PaymentLookup, reqwest::Error> {
        let url = format!("{}/v1/payments/{payment_id}", &self.base_url);

        let payment = self
            .http_client
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?
            .error_for_status()?
            .json::<PaymentLookup>()
            .await?;

        Ok(payment)
    }
}

#[derive(Serialize)]
struct CreatePaymentRequest<'a> {
    transaction_amount: f64,
    description: &'a str,
    payment_method_id: &'a str,
    payer: Payer<'a>,
    external_reference: &'a str,
}

#[derive(Serialize)]
struct Payer<'a> {
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct PixPayment {
    pub id: i64,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date_of_expiration: Option<OffsetDateTime>,
    pub point_of_interaction: PointOfInteraction,
}

#[derive(Debug, Deserialize)]
pub struct PointOfInteraction {
    pub transaction_data: TransactionData,
}

#[derive(Debug, Deserialize)]
pub struct TransactionData {
    pub qr_code: String,
    pub qr_code_base64: String,
}

#[derive(Deserialize)]
pub struct PaymentLookup {
    pub id: i64,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
}
