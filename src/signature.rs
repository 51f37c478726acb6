// sapp_unlock_webhook/src/signature.rs
// Origin authentication for NOWPayments IPN callbacks.

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha512;
use std::str::FromStr;
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// How the `x-nowpayments-sig` header is checked.
///
/// `SharedSecret` compares the header to the configured secret verbatim, which is
/// what existing integrations send. `HmacSha512` expects the hex HMAC-SHA512 of the
/// key-sorted JSON body, keyed by the same secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMode {
    #[default]
    SharedSecret,
    HmacSha512,
}

impl FromStr for SignatureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared-secret" | "shared_secret" => Ok(Self::SharedSecret),
            "hmac-sha512" | "hmac_sha512" => Ok(Self::HmacSha512),
            other => Err(format!("unknown signature mode: {}", other)),
        }
    }
}

/// Returns true only when the request carries a valid signature for `secret`.
/// An unset secret never authenticates.
pub fn verify_signature(
    mode: SignatureMode,
    signature: Option<&str>,
    secret: Option<&str>,
    body: &[u8],
) -> bool {
    let (Some(signature), Some(secret)) = (signature, secret) else {
        return false;
    };
    if secret.is_empty() {
        return false;
    }

    match mode {
        SignatureMode::SharedSecret => signature.as_bytes().ct_eq(secret.as_bytes()).into(),
        SignatureMode::HmacSha512 => verify_hmac(signature, secret, body),
    }
}

fn verify_hmac(signature: &str, secret: &str, body: &[u8]) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Some(canonical) = canonical_body(body) else {
        return false;
    };

    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(canonical.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Compact JSON with object keys sorted at every depth, the form NOWPayments signs.
pub fn canonical_body(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    serde_json::to_string(&sort_keys(value)).ok()
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Hex HMAC-SHA512 over the canonical body. Used by tests and tooling that sign payloads.
pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let canonical = canonical_body(body)?;
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(canonical.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"payment_status":"finished","order_id":"sapp_beginner_u1_1","meta":{"z":1,"a":2}}"#;

    #[test]
    fn shared_secret_requires_exact_match() {
        let mode = SignatureMode::SharedSecret;
        assert!(verify_signature(mode, Some("s3cret"), Some("s3cret"), BODY));
        assert!(!verify_signature(mode, Some("s3cret "), Some("s3cret"), BODY));
        assert!(!verify_signature(mode, Some("S3CRET"), Some("s3cret"), BODY));
        assert!(!verify_signature(mode, Some(""), Some("s3cret"), BODY));
        assert!(!verify_signature(mode, None, Some("s3cret"), BODY));
    }

    #[test]
    fn unset_secret_rejects_everything() {
        for mode in [SignatureMode::SharedSecret, SignatureMode::HmacSha512] {
            assert!(!verify_signature(mode, Some("anything"), None, BODY));
            assert!(!verify_signature(mode, Some(""), Some(""), BODY));
            assert!(!verify_signature(mode, None, None, BODY));
        }
    }

    #[test]
    fn hmac_mode_accepts_signed_body_regardless_of_key_order() {
        let sig = sign_body("ipn-key", BODY).unwrap();
        let reordered = br#"{"meta":{"a":2,"z":1},"order_id":"sapp_beginner_u1_1","payment_status":"finished"}"#;
        assert!(verify_signature(SignatureMode::HmacSha512, Some(sig.as_str()), Some("ipn-key"), BODY));
        assert!(verify_signature(SignatureMode::HmacSha512, Some(sig.as_str()), Some("ipn-key"), reordered));
    }

    #[test]
    fn hmac_mode_rejects_tampering_and_garbage() {
        let sig = sign_body("ipn-key", BODY).unwrap();
        let tampered = br#"{"payment_status":"finished","order_id":"sapp_pro_u1_1","meta":{"z":1,"a":2}}"#;
        let mode = SignatureMode::HmacSha512;
        assert!(!verify_signature(mode, Some(sig.as_str()), Some("ipn-key"), tampered));
        assert!(!verify_signature(mode, Some(sig.as_str()), Some("other-key"), BODY));
        assert!(!verify_signature(mode, Some("not-hex"), Some("ipn-key"), BODY));
        assert!(!verify_signature(mode, Some(sig.as_str()), Some("ipn-key"), b"not json"));
        // The raw secret is not a valid HMAC.
        assert!(!verify_signature(mode, Some("ipn-key"), Some("ipn-key"), BODY));
    }

    #[test]
    fn canonical_body_sorts_nested_keys() {
        assert_eq!(
            canonical_body(br#"{"b":{"y":1,"x":[{"d":1,"c":2}]},"a":null}"#).unwrap(),
            r#"{"a":null,"b":{"x":[{"c":2,"d":1}],"y":1}}"#
        );
    }

    #[test]
    fn parses_modes() {
        assert_eq!("shared-secret".parse::<SignatureMode>(), Ok(SignatureMode::SharedSecret));
        assert_eq!("HMAC-SHA512".parse::<SignatureMode>(), Ok(SignatureMode::HmacSha512));
        assert!("sha1".parse::<SignatureMode>().is_err());
    }
}
