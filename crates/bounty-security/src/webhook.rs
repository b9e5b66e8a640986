use crate::error::{GateError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify an inbound `sha256=<hex>` webhook signature header in constant time.
pub fn verify_webhook_signature(body: &[u8], header: &str, secret: &[u8]) -> Result<()> {
    if secret.is_empty() {
        return Err(GateError::InvalidWebhookSignature);
    }
    let encoded = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(GateError::InvalidWebhookSignature)?;
    let expected = hex::decode(encoded).map_err(|_| GateError::InvalidWebhookSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| GateError::InvalidWebhookSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| GateError::InvalidWebhookSignature)
}

/// Header value for `body`, as produced by the sender.
pub fn sign_webhook_body(body: &[u8], secret: &[u8]) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| GateError::InvalidWebhookSignature)?;
    mac.update(body);
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_verification() {
        let secret = b"webhook-secret";
        let body = br#"{"action":"opened","number":7}"#;
        let header = sign_webhook_body(body, secret).unwrap();

        assert!(verify_webhook_signature(body, &header, secret).is_ok());
        assert!(verify_webhook_signature(b"tampered", &header, secret).is_err());
        assert!(verify_webhook_signature(body, &header, b"other-secret").is_err());
        assert!(verify_webhook_signature(body, "sha1=abcd", secret).is_err());
        assert!(verify_webhook_signature(body, "sha256=zz", secret).is_err());
        assert!(verify_webhook_signature(body, &header, b"").is_err());
    }
}
