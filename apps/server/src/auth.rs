use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Fixed HMAC key for token comparison. Not a secret: hashing both sides
/// before comparing makes the equality check timing-independent of where the
/// strings first differ.
const COMPARE_KEY: &[u8] = b"salon-admin-token";

fn token_digest(token: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(COMPARE_KEY).expect("HMAC can take key of any size");
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Validate an `Authorization: Bearer <token>` header against the configured
/// admin token.
pub fn verify_bearer(auth_header: &str, admin_token: &str) -> bool {
    if admin_token.is_empty() {
        return false;
    }
    match auth_header.strip_prefix("Bearer ") {
        Some(presented) => token_digest(presented) == token_digest(admin_token),
        None => false,
    }
}
