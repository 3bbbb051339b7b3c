use crate::{
    captcha::CaptchaVerifier, checkout_client::CheckoutClient, email_client::EmailClient,
    media_store::MediaStore, pix_client::PixClient,
};
use secrecy::Secret;
use sqlx::PgPool;
use time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub email_client: EmailClient,
    pub checkout_client: CheckoutClient,
    pub pix_client: PixClient,
    pub captcha_verifier: CaptchaVerifier,
    pub media_store: MediaStore,
    pub base_url: String,
    pub checkout_webhook_secret: Secret<String>,
    pub pix_webhook_secret: Secret<String>,
    pub staged_upload_ttl: Duration,
}

impl AppState {
    pub fn share_url(&self, slug: &str) -> String {
        format!("{}/love/{slug}", self.base_url)
    }
}
