use crate::error::AppError;

use base64::{engine, Engine};
use reqwest::StatusCode;
use ring::hmac;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::debug;

/// Compute Twilio's request signature: HMAC-SHA1 of the full URL followed by each POST
/// parameter name and value, sorted by name, base64-encoded.
#[cfg(test)]
pub fn twilio_signature(auth_token: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, auth_token.as_bytes());
    let tag = hmac::sign(&key, signature_payload(url, params).as_bytes());
    engine::general_purpose::STANDARD.encode(tag.as_ref())
}

/// Check an `X-Twilio-Signature` header value in constant time.
pub fn validate_twilio_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &BTreeMap<String, String>,
) -> bool {
    let Ok(expected) = engine::general_purpose::STANDARD.decode(signature.trim()) else {
        debug!("signature header is not valid base64");
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, auth_token.as_bytes());
    hmac::verify(&key, signature_payload(url, params).as_bytes(), &expected).is_ok()
}

fn signature_payload(url: &str, params: &BTreeMap<String, String>) -> String {
    let mut payload = String::from(url);
    for (name, value) in params {
        payload.push_str(name);
        payload.push_str(value);
    }
    payload
}

/// Render a number of seconds as zero-padded `HH:MM:SS`.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Turn a non-2xx provider response into an error, keeping the body for the log line.
pub async fn ensure_success(
    provider: &'static str,
    what: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, AppError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(what.to_string()));
    }
    Err(AppError::upstream(provider, format!("{what}: {status} {body}")))
}

pub async fn decode_json<T: DeserializeOwned>(
    provider: &'static str,
    what: &str,
    resp: reqwest::Response,
) -> Result<T, AppError> {
    let resp = ensure_success(provider, what, resp).await?;
    resp.json::<T>()
        .await
        .map_err(|e| AppError::upstream(provider, format!("{what}: malformed response: {e}")))
}
