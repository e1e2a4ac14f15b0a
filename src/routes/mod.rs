mod admin;
mod auth;
mod health_check;

pub use admin::{
    event_stats, list_events, list_users, revoke_family, revoke_session, user_sessions,
};
pub use auth::{get_current_user, login, refresh, signup};
pub use health_check::health_check;

use actix_web::HttpRequest;

use crate::session::ClientHints;

/// Extract the caller's network identity from the request.
///
/// Behind a proxy the first `X-Forwarded-For` entry is the real client, so it
/// wins over the socket peer address. Both hints stay optional; the engine
/// treats an absent hint as "no binding evidence".
pub fn client_hints(req: &HttpRequest) -> ClientHints {
    let ip = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()));

    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    ClientHints { ip, user_agent }
}
