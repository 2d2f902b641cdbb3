// HTTP surface: health/root endpoints and the WebSocket upgrade route.
// Shared request guards live here; route functions in submodules.

mod socket;
mod system;

pub use socket::socket_connect;
pub use system::{health, root};

use rocket::request::{FromRequest, Outcome, Request};

/// Client IP, preferring `X-Forwarded-For` so the per-IP connection cap
/// works behind a proxy.
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

/// Bearer token from the `Authorization` header, if any. Absence is not an
/// error at upgrade time: the token may still arrive as a query parameter or
/// an `auth` frame.
pub struct BearerToken(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BearerToken {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = req
            .headers()
            .get_one("Authorization")
            .and_then(crate::auth::token_from_authorization)
            .map(String::from);
        Outcome::Success(BearerToken(token))
    }
}
