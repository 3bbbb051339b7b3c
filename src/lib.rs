pub mod app_state;
pub mod captcha;
pub mod checkout_client;
pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod email_delivery_worker;
pub mod email_outbox;
pub mod idempotency;
pub mod media_store;
pub mod payment_processing;
pub mod pix_client;
pub mod promotion;
pub mod request_id;
pub mod routes;
pub mod signature;
pub mod startup;
pub mod telemetry;
pub mod upload_expiry_worker;
