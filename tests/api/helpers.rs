use hmac::{Hmac, Mac};
use loveyuu::{
    configuration::{get_configuration, DatabaseSettings, Settings},
    startup::{get_pg_connection_pool, Application},
    telemetry::{get_subscriber, init_subscriber},
};
use once_cell::sync::Lazy;
use reqwest::{multipart, Client, Response};
use secrecy::ExposeSecret;
use sha2::Sha256;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::net::SocketAddr;
use time::OffsetDateTime;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

static TRACING: Lazy<()> = Lazy::new(|| {
    let name = "test";
    let default_env_filter = "info";
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(name.into(), default_env_filter.into(), std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(name.into(), default_env_filter.into(), std::io::sink);
        init_subscriber(subscriber);
    }
});

static FAILED_TO_EXECUTE_REQUEST: &str = "Failed to execute request";

pub struct TestApp {
    pub address: SocketAddr,
    pub db_pool: PgPool,
    pub email_server: MockServer,
    pub payment_server: MockServer,
    pub captcha_server: MockServer,
    pub checkout_webhook_secret: String,
    pub pix_webhook_secret: String,
    pub media_root: tempfile::TempDir,
    pub settings: Settings,
    client: Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawns the app with CAPTCHA verification turned on, pointed at the
    /// captcha mock server.
    pub async fn spawn_with_captcha() -> Self {
        Self::spawn_with(|config| config.captcha.enabled = true).await
    }

    async fn spawn_with(customize: impl FnOnce(&mut Settings)) -> Self {
        Lazy::force(&TRACING);

        let email_server = MockServer::start().await;
        let payment_server = MockServer::start().await;
        let captcha_server = MockServer::start().await;
        let media_root = tempfile::tempdir().expect("Failed to create media root");

        let mut config = get_configuration().expect("Failed to read configuration");
        config.database.database_name = Uuid::new_v4().to_string();
        config.application.port = 0;
        config.email_client.base_url = email_server.uri();
        config.checkout.base_url = payment_server.uri();
        config.pix.base_url = payment_server.uri();
        config.captcha.base_url = captcha_server.uri();
        config.media_store.root = media_root.path().to_path_buf();
        customize(&mut config);

        let checkout_webhook_secret = config.checkout.webhook_secret.expose_secret().clone();
        let pix_webhook_secret = config.pix.webhook_secret.expose_secret().clone();

        let db_pool = configure_database(&config.database).await;

        let app = Application::build(config.clone())
            .await
            .expect("Failed to build application");
        let address = app.local_addr();

        tokio::spawn(app.run_until_stopped());

        Self {
            address,
            db_pool,
            email_server,
            payment_server,
            captcha_server,
            checkout_webhook_secret,
            pix_webhook_secret,
            media_root,
            settings: config,
            client: Client::new(),
        }
    }

    pub async fn get_health_check(&self) -> Response {
        self.client
            .get(self.url("/health_check"))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn post_upload(&self, form: multipart::Form) -> Response {
        self.client
            .post(self.url("/uploads"))
            .multipart(form)
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn post_letter(&self, body: serde_json::Value) -> Response {
        self.client
            .post(self.url("/letters"))
            .json(&body)
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn get_letter(&self, slug: &str) -> Response {
        self.client
            .get(self.url(&format!("/letters/{slug}")))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn post_checkout_session(&self, body: serde_json::Value) -> Response {
        self.client
            .post(self.url("/checkout/sessions"))
            .json(&body)
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn get_session_letter(&self, session_id: &str) -> Response {
        self.client
            .get(self.url(&format!("/checkout/sessions/{session_id}/letter")))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn post_pix_payment(&self, body: serde_json::Value) -> Response {
        self.client
            .post(self.url("/payments/pix"))
            .json(&body)
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn get_payment(&self, payment_id: &str) -> Response {
        self.client
            .get(self.url(&format!("/payments/{payment_id}")))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn post_checkout_webhook(&self, body: &[u8], signature: Option<&str>) -> Response {
        let mut request = self
            .client
            .post(self.url("/webhooks/checkout"))
            .header("Content-Type", "application/json")
            .body(body.to_vec());
        if let Some(signature) = signature {
            request = request.header("Checkout-Signature", signature);
        }

        request.send().await.expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn post_pix_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
        request_id: &str,
    ) -> Response {
        let mut request = self
            .client
            .post(self.url("/webhooks/pix"))
            .header("Content-Type", "application/json")
            .header("X-Request-Id", request_id)
            .body(body.to_vec());
        if let Some(signature) = signature {
            request = request.header("X-Signature", signature);
        }

        request.send().await.expect(FAILED_TO_EXECUTE_REQUEST)
    }

    /// Stages a complete, valid upload and returns its id.
    pub async fn stage_upload(&self, plan: &str) -> Uuid {
        let response = self.post_upload(valid_upload_form(plan)).await;
        assert_eq!(response.status(), 200, "Failed to stage the test upload");

        let body: serde_json::Value = response.json().await.expect("Failed to parse upload body");
        body["upload_id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("Upload response carries no id")
    }

    /// Stages an upload and promotes it into a pending letter, returning
    /// the slug.
    pub async fn create_pending_letter(&self) -> String {
        let upload_id = self.stage_upload("premium").await;
        let response = self
            .post_letter(serde_json::json!({ "upload_id": upload_id }))
            .await;
        assert_eq!(response.status(), 200, "Failed to create the test letter");

        let body: serde_json::Value = response.json().await.expect("Failed to parse letter body");
        body["slug"]
            .as_str()
            .expect("Letter response carries no slug")
            .to_string()
    }

    pub async fn mock_checkout_session(&self, session_id: &str) {
        Mock::given(path("/v1/checkout/sessions"))
            .and(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": session_id,
                "url": format!("{}/c/pay/{session_id}", self.payment_server.uri()),
            })))
            .mount(&self.payment_server)
            .await;
    }

    pub async fn mock_pix_payment_creation(&self, payment_id: i64) {
        Mock::given(path("/v1/payments"))
            .and(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": payment_id,
                "status": "pending",
                "status_detail": "pending_waiting_transfer",
                "point_of_interaction": {
                    "transaction_data": {
                        "qr_code": "00020126580014br.gov.bcb.pix",
                        "qr_code_base64": "aVZCT1J3MEtHZ28="
                    }
                }
            })))
            .mount(&self.payment_server)
            .await;
    }

    pub async fn mock_pix_payment_status(&self, payment_id: i64, status: &str, slug: &str) {
        Mock::given(path(format!("/v1/payments/{payment_id}")))
            .and(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": payment_id,
                "status": status,
                "status_detail": format!("{status}_detail"),
                "external_reference": slug,
            })))
            .mount(&self.payment_server)
            .await;
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("http://{}{endpoint}", self.address)
    }
}

/// A complete multipart form for `/uploads` with two photos and an audio
/// message.
pub fn valid_upload_form(plan: &str) -> multipart::Form {
    let mut form = multipart::Form::new()
        .text("couple_names", "Ana & João")
        .text("relationship_started_at", "2019-02-14T20:30:00Z")
        .text("message", "Te amo desde o primeiro dia.")
        .text("plan", plan.to_string())
        .text("payer_email", "ana.silva@example.com")
        .text("payer_name", "Ana Silva")
        .part("photo", photo_part("primeira.jpg"))
        .part("photo", photo_part("viagem.jpg"))
        .part(
            "audio",
            multipart::Part::bytes(b"RIFFfakeaudio".to_vec())
                .file_name("recado.mp3")
                .mime_str("audio/mpeg")
                .unwrap(),
        );

    if plan == "premium" {
        form = form.text(
            "music_link",
            "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC",
        );
    }

    form
}

pub fn photo_part(file_name: &str) -> multipart::Part {
    multipart::Part::bytes(b"\xFF\xD8\xFF\xE0fakejpegbytes".to_vec())
        .file_name(file_name.to_string())
        .mime_str("image/jpeg")
        .unwrap()
}

fn hmac_hex(secret: &str, message: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Signs a checkout webhook payload the way the provider would.
pub fn checkout_signature(secret: &str, payload: &[u8]) -> String {
    let timestamp = OffsetDateTime::now_utc().unix_timestamp();
    let message = [timestamp.to_string().as_bytes(), b".", payload].concat();
    format!("t={timestamp},v1={}", hmac_hex(secret, &message))
}

/// Signs a PIX notification the way the provider would.
pub fn pix_signature(secret: &str, payment_id: &str, request_id: &str) -> String {
    let timestamp = OffsetDateTime::now_utc().unix_timestamp();
    let manifest = format!(
        "id:{};request-id:{request_id};ts:{timestamp};",
        payment_id.to_lowercase()
    );
    format!("ts={timestamp},v1={}", hmac_hex(secret, manifest.as_bytes()))
}

async fn configure_database(configuration: &DatabaseSettings) -> PgPool {
    let mut conn = PgConnection::connect_with(&configuration.without_db())
        .await
        .expect("Failed to connect to Postgres");

    conn.execute(format!(r#"CREATE DATABASE "{}";"#, configuration.database_name).as_str())
        .await
        .expect("Failed to create database");

    let pool = get_pg_connection_pool(configuration);

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    pool
}
