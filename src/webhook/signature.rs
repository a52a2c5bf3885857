use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

fn mac(secret: &str, body: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Signature(format!("invalid channel secret: {}", e)))?;
    mac.update(body);
    Ok(mac)
}

/// base64(HMAC-SHA256(secret, body)).
#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    Ok(STANDARD.encode(mac(secret, body)?.finalize().into_bytes()))
}

/// Constant-time check of the request signature against the raw body.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> Result<()> {
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| AppError::Signature("signature is not valid base64".to_string()))?;

    mac(secret, body)?
        .verify_slice(&expected)
        .map_err(|_| AppError::Signature("signature mismatch".to_string()))
}
