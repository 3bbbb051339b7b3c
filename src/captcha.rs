use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

/// Client for the CAPTCHA verification endpoint
/// (`POST {base_url}/recaptcha/api/siteverify`). Disabled in local runs via
/// configuration, in which case every token is accepted without a call.
#[derive(Clone)]
pub struct CaptchaVerifier {
    http_client: Client,
    base_url: String,
    secret: Secret<String>,
    enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    #[error("Captcha token is missing")]
    MissingToken,
    #[error("Captcha verification rejected the token")]
    Rejected,
    #[error("Failed to reach the captcha verification endpoint")]
    Unreachable(#[from] reqwest::Error),
}

impl CaptchaVerifier {
    pub fn new(base_url: String, secret: Secret<String>, enabled: bool, timeout: Duration) -> Self {
        let http_client = Client::builder().timeout(timeout).build().unwrap();

        Self {
            http_client,
            base_url,
            secret,
            enabled,
        }
    }

    pub async fn verify(&self, token: Option<&str>) -> Result<(), CaptchaError> {
        if !self.enabled {
            return Ok(());
        }

        let token = token.ok_or(CaptchaError::MissingToken)?;
        let url = format!("{}/recaptcha/api/siteverify", &self.base_url);
        let form = [
            ("secret", self.secret.expose_secret().as_str()),
            ("response", token),
        ];

        let response = self
            .http_client
            .post(&url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<VerificationResponse>()
            .await?;

        if response.success {
            Ok(())
        } else {
            Err(CaptchaError::Rejected)
        }
    }
}

#[derive(Deserialize)]
struct VerificationResponse {
    success: bool,
}
