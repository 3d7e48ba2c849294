//! Request signatures.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// `appsecret_proof` for Graph API calls: hex HMAC-SHA256 of the access token,
/// keyed by the app secret.
pub fn appsecret_proof(access_token: &str, app_secret: &str) -> String {
    // HMAC accepts keys of any length, so construction cannot fail here.
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
    mac.update(access_token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Asset host upload signature: SHA-256 over the `k=v` pairs sorted by key and
/// joined with `&`, immediately followed by the API secret.
pub fn asset_upload_signature(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appsecret_proof_matches_rfc4231_vector() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        assert_eq!(
            appsecret_proof("what do ya want for nothing?", "Jefe"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_appsecret_proof_depends_on_secret() {
        let a = appsecret_proof("token", "secret-a");
        let b = appsecret_proof("token", "secret-b");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_upload_signature_is_order_independent() {
        let forward = asset_upload_signature(
            &[("folder", "products".into()), ("timestamp", "1700000000".into())],
            "secret",
        );
        let reversed = asset_upload_signature(
            &[("timestamp", "1700000000".into()), ("folder", "products".into())],
            "secret",
        );
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_upload_signature_of_known_string() {
        // sha256("timestamp=1315060510abcd")
        let mut hasher = Sha256::new();
        hasher.update(b"timestamp=1315060510abcd");
        let expected = hex::encode(hasher.finalize());

        assert_eq!(
            asset_upload_signature(&[("timestamp", "1315060510".into())], "abcd"),
            expected
        );
    }
}
