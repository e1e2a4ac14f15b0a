/// Middleware module
///
/// Custom middleware for authentication, logging, and other concerns.

mod auth_guard;
mod request_logger;

pub use auth_guard::AuthGuard;
pub use request_logger::RequestLogger;
