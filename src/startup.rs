use crate::{
    app_state::AppState,
    configuration::{DatabaseSettings, Settings},
    media_store::MediaStore,
    request_id::RequestUuid,
    routes::{checkout, health_check, letters, payments, uploads, webhooks},
    telemetry::request_span,
};
use axum::Router;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{net::SocketAddr, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub struct Application {
    listener: TcpListener,
    app: Router,
    local_addr: SocketAddr,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let db_pool = get_pg_connection_pool(&config.database);

        let media_store = MediaStore::new(config.media_store.root.clone());
        media_store.ensure_layout().await?;

        let app_state = AppState {
            db_pool,
            email_client: config.email_client.client(),
            checkout_client: config.checkout.client(),
            pix_client: config.pix.client(),
            captcha_verifier: config.captcha.verifier(),
            media_store: media_store.clone(),
            base_url: config.application.base_url.clone(),
            checkout_webhook_secret: config.checkout.webhook_secret.clone(),
            pix_webhook_secret: config.pix.webhook_secret.clone(),
            staged_upload_ttl: config.media_store.staged_upload_ttl(),
        };

        let app = router(app_state, &media_store);

        let listener =
            TcpListener::bind((config.application.host.as_str(), config.application.port)).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            app,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        tracing::info!("Listening on {}", self.local_addr);
        axum::serve(self.listener, self.app).await
    }
}

pub fn get_pg_connection_pool(config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(config.with_db())
}

fn router(app_state: AppState, media_store: &MediaStore) -> Router {
    Router::new()
        .merge(health_check::router())
        .merge(uploads::router())
        .merge(letters::router())
        .merge(checkout::router())
        .merge(payments::router())
        .merge(webhooks::router())
        .nest_service(
            "/media/letters",
            ServeDir::new(media_store.public_root().join("letters")),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(RequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(app_state)
}
