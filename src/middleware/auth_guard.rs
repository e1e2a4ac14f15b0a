/// Bearer-token guard for protected routes
///
/// Validates the access token from the Authorization header and injects the
/// verified claims into request extensions for handlers to read.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::session::SessionEngine;

/// Apply to any scope that requires an authenticated caller.
pub struct AuthGuard {
    engine: SessionEngine,
}

impl AuthGuard {
    pub fn new(engine: SessionEngine) -> Self {
        Self { engine }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthGuardService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthGuardService {
            service: Rc::new(service),
            engine: self.engine.clone(),
        }))
    }
}

pub struct AuthGuardService<S> {
    service: Rc<S>,
    engine: SessionEngine,
}

impl<S, B> Service<ServiceRequest> for AuthGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").map(|t| t.to_string()));

        let token = match bearer {
            Some(token) => token,
            None => {
                tracing::warn!(path = %req.path(), "Missing or invalid Authorization header");
                let response = HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Missing or invalid authorization header",
                    "code": "MISSING_TOKEN"
                }));
                return Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(
                        "Missing token",
                        response,
                    )
                    .into())
                });
            }
        };

        match self.engine.verify_access(&token) {
            Ok(claims) => {
                tracing::debug!(
                    user_id = %claims.sub,
                    jti = %claims.jti,
                    "Access token validated"
                );
                req.extensions_mut().insert(claims);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(_) => {
                // Expired, tampered, wrong issuer: one body for all of them
                let response = HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Invalid or expired token",
                    "code": "TOKEN_INVALID"
                }));
                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(
                        "Invalid token",
                        response,
                    )
                    .into())
                })
            }
        }
    }
}
