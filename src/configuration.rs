use crate::{
    captcha::CaptchaVerifier, checkout_client::CheckoutClient, email_client::EmailClient,
    pix_client::PixClient,
};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};
use std::{path::PathBuf, time::Duration};
use tracing_log::log::LevelFilter;

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub email_client: EmailClientSettings,
    pub checkout: CheckoutSettings,
    pub pix: PixSettings,
    pub captcha: CaptchaSettings,
    pub media_store: MediaStoreSettings,
}

#[derive(Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub base_url: String,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    pub database_name: String,
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db()
            .database(&self.database_name)
            .log_statements(LevelFilter::Trace)
    }

    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(self.password.expose_secret())
            .ssl_mode(ssl_mode)
    }
}

#[derive(Clone, Deserialize)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
    pub authorization_token: Secret<String>,
    pub timeout_milliseconds: u64,
}

impl EmailClientSettings {
    pub fn client(&self) -> EmailClient {
        EmailClient::new(
            self.base_url.clone(),
            self.sender_email.clone(),
            self.authorization_token.clone(),
            self.timeout(),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

#[derive(Clone, Deserialize)]
pub struct CheckoutSettings {
    pub base_url: String,
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub timeout_milliseconds: u64,
}

impl CheckoutSettings {
    pub fn client(&self) -> CheckoutClient {
        CheckoutClient::new(
            self.base_url.clone(),
            self.secret_key.clone(),
            self.timeout(),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

#[derive(Clone, Deserialize)]
pub struct PixSettings {
    pub base_url: String,
    pub access_token: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub timeout_milliseconds: u64,
}

impl PixSettings {
    pub fn client(&self) -> PixClient {
        PixClient::new(
            self.base_url.clone(),
            self.access_token.clone(),
            self.timeout(),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

#[derive(Clone, Deserialize)]
pub struct CaptchaSettings {
    pub base_url: String,
    pub secret: Secret<String>,
    pub enabled: bool,
    pub timeout_milliseconds: u64,
}

impl CaptchaSettings {
    pub fn verifier(&self) -> CaptchaVerifier {
        CaptchaVerifier::new(
            self.base_url.clone(),
            self.secret.clone(),
            self.enabled,
            self.timeout(),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

#[derive(Clone, Deserialize)]
pub struct MediaStoreSettings {
    pub root: PathBuf,
    pub staged_upload_ttl_hours: u64,
}

impl MediaStoreSettings {
    pub fn staged_upload_ttl(&self) -> time::Duration {
        time::Duration::hours(self.staged_upload_ttl_hours as i64)
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let config_dir = std::env::current_dir()
        .map(|dir| dir.join("configuration"))
        .expect("Failed to determine the current directory");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse app environment");

    let env_config = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(config_dir.join("base.yaml")))
        .add_source(config::File::from(config_dir.join(env_config)))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "`{other}` is not a supported environment. Use either `local` or `production`."
            )),
        }
    }
}
