//! Webhook signature computation and verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the HMAC signature on webhooks and callbacks.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header carrying the GitHub event name.
pub const EVENT_HEADER: &str = "x-github-event";

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Total length of a well-formed signature header value
/// (`sha256=` + 64 hex chars).
pub const SIGNATURE_HEADER_LEN: usize = 71;

/// Compute the hex HMAC-SHA256 digest of `body` under `secret`.
#[must_use]
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Produce the full `sha256=<hex>` header value for a body.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", compute_signature(secret, body))
}

/// Verify a webhook signature header against the raw body.
///
/// The header must be exactly 71 characters (`sha256=` + 64 hex chars); the
/// digest comparison is constant-time.
#[must_use]
pub fn verify_signature(body: &[u8], header_value: &str, secret: &str) -> bool {
    if header_value.len() != SIGNATURE_HEADER_LEN {
        return false;
    }
    let Some(signature) = header_value.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    // Constant-time comparison to prevent timing attacks
    computed.as_slice().ct_eq(&signature_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // the signature example from the GitHub webhook documentation
    const DOCS_BODY: &[u8] = b"Hello, World!";
    const DOCS_SECRET: &str = "It's a Secret to Everybody";
    const DOCS_SIGNATURE: &str =
        "757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";

    #[test]
    fn test_compute_signature_matches_github_docs() {
        assert_eq!(compute_signature(DOCS_SECRET, DOCS_BODY), DOCS_SIGNATURE);
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let body = br#"{"id":42,"labels":["self-hosted"]}"#;
        let header = sign("test-secret", body);
        assert_eq!(header.len(), 71);
        assert!(verify_signature(body, &header, "test-secret"));
    }

    #[test]
    fn test_verify_rejects_mutated_body() {
        let body = b"test payload";
        let header = sign("test-secret", body);
        assert!(!verify_signature(b"test payloaD", &header, "test-secret"));
    }

    #[test]
    fn test_verify_rejects_mutated_signature() {
        let body = b"test payload";
        let mut header = sign("test-secret", body);
        // flip the last hex digit
        let last = header.pop().unwrap();
        header.push(if last == '0' { '1' } else { '0' });
        assert!(!verify_signature(body, &header, "test-secret"));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let body = b"test payload";
        let header = sign("test-secret", body);
        assert!(!verify_signature(body, &header, "other-secret"));
    }

    #[test]
    fn test_verify_rejects_malformed_header() {
        let body = b"test payload";
        assert!(!verify_signature(body, "", "s"));
        assert!(!verify_signature(body, "not-hex", "s"));
        // right length, wrong prefix
        let bogus = format!("sha512={DOCS_SIGNATURE}");
        assert_eq!(bogus.len(), 71);
        assert!(!verify_signature(body, &bogus, "s"));
        // bare digest without the prefix
        assert!(!verify_signature(DOCS_BODY, DOCS_SIGNATURE, DOCS_SECRET));
    }

    #[test]
    fn test_verify_accepts_github_docs_vector() {
        let header = format!("{SIGNATURE_PREFIX}{DOCS_SIGNATURE}");
        assert!(verify_signature(DOCS_BODY, &header, DOCS_SECRET));
    }
}
