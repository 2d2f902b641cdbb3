use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Claims extracted from a verified bearer token. `user_id` is the JWT
/// subject; `raw` keeps the full claim set for the session mirror.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub raw: serde_json::Value,
}

/// Why verification failed. Logged internally; clients only ever learn
/// "unauthorized".
#[derive(Debug)]
pub enum AuthError {
    Malformed,
    WrongAlgorithm,
    BadSignature,
    Expired,
    MissingSubject,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            AuthError::Malformed => "malformed token",
            AuthError::WrongAlgorithm => "unexpected signing algorithm",
            AuthError::BadSignature => "signature mismatch",
            AuthError::Expired => "token expired",
            AuthError::MissingSubject => "no subject claim",
        };
        f.write_str(reason)
    }
}

/// Verify an HS256 bearer token: signature over `header.payload`, then
/// expiry. Audience verification is disabled by contract.
pub fn verify_token(token: &str, secret: &str) -> Result<AuthClaims, AuthError> {
    let mut segments = token.split('.');
    let (header_b64, payload_b64, signature_b64) =
        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(AuthError::Malformed),
        };

    let header: serde_json::Value = URL_SAFE_NO_PAD
        .decode(header_b64)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .ok_or(AuthError::Malformed)?;
    if header.get("alg").and_then(|a| a.as_str()) != Some("HS256") {
        return Err(AuthError::WrongAlgorithm);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::Malformed)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature).map_err(|_| AuthError::BadSignature)?;

    let claims: serde_json::Value = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .ok_or(AuthError::Malformed)?;

    if let Some(exp) = claims.get("exp").and_then(|e| e.as_i64())
        && exp <= chrono::Utc::now().timestamp()
    {
        return Err(AuthError::Expired);
    }

    let user_id = claims
        .get("sub")
        .and_then(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::MissingSubject)?
        .to_string();

    Ok(AuthClaims {
        user_id,
        email: claims.get("email").and_then(|v| v.as_str()).map(String::from),
        role: claims.get("role").and_then(|v| v.as_str()).map(String::from),
        raw: claims,
    })
}

/// Pull a bearer token out of an `Authorization` header value.
pub fn token_from_authorization(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").filter(|t| !t.is_empty())
}
