use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Replay window for signed webhook deliveries, in seconds.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Malformed signature header: {0}")]
    Malformed(String),
    #[error("Signature timestamp outside the accepted window")]
    StaleTimestamp,
    #[error("Signature does not match the payload")]
    Mismatch,
}

/// Checkout provider scheme: `Checkout-Signature: t=<unix ts>,v1=<hex hmac>`
/// where the MAC covers `"{t}.{raw body}"`.
pub struct CheckoutSignature;

impl CheckoutSignature {
    pub fn verify(
        secret: &Secret<String>,
        header: &str,
        payload: &[u8],
    ) -> Result<(), SignatureError> {
        let (timestamp, signature) = parse_header(header, "t")?;
        check_timestamp(&timestamp)?;

        let mut message = Vec::with_capacity(timestamp.len() + 1 + payload.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.push(b'.');
        message.extend_from_slice(payload);

        verify_mac(secret, &message, &signature)
    }
}

/// PIX provider scheme: `X-Signature: ts=<unix ts>,v1=<hex hmac>` where the
/// MAC covers the manifest `id:{payment id};request-id:{request id};ts:{ts};`
/// with the payment id lowercased.
pub struct PixSignature;

impl PixSignature {
    pub fn verify(
        secret: &Secret<String>,
        header: &str,
        payment_id: &str,
        request_id: &str,
    ) -> Result<(), SignatureError> {
        let (timestamp, signature) = parse_header(header, "ts")?;
        check_timestamp(&timestamp)?;

        let manifest = format!(
            "id:{};request-id:{request_id};ts:{timestamp};",
            payment_id.to_lowercase()
        );

        verify_mac(secret, manifest.as_bytes(), &signature)
    }
}

fn parse_header(header: &str, timestamp_key: &str) -> Result<(String, String), SignatureError> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some((key, value)) if key == timestamp_key => timestamp = Some(value.to_string()),
            Some(("v1", value)) => signature = Some(value.to_string()),
            _ => {}
        }
    }

    match (timestamp, signature) {
        (Some(t), Some(v1)) => Ok((t, v1)),
        (None, _) => Err(SignatureError::Malformed(format!(
            "missing `{timestamp_key}` element"
        ))),
        (_, None) => Err(SignatureError::Malformed("missing `v1` element".into())),
    }
}

fn check_timestamp(timestamp: &str) -> Result<(), SignatureError> {
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::Malformed(format!("`{timestamp}` is not a unix timestamp")))?;

    let now = OffsetDateTime::now_utc().unix_timestamp();
    if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    Ok(())
}

fn verify_mac(
    secret: &Secret<String>,
    message: &[u8],
    signature: &str,
) -> Result<(), SignatureError> {
    let expected = hex::decode(signature)
        .map_err(|_| SignatureError::Malformed("`v1` element is not hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(message);

    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
