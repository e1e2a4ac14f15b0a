use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::middleware::{AuthGuard, RequestLogger};
use crate::routes::{
    event_stats, get_current_user, health_check, list_events, list_users, login, refresh,
    revoke_family, revoke_session, signup, user_sessions,
};
use crate::session::SessionEngine;

pub fn run(listener: TcpListener, engine: SessionEngine) -> Result<Server, std::io::Error> {
    let engine_data = web::Data::new(engine.clone());

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(RequestLogger)

            // Shared state
            .app_data(engine_data.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/signup", web::post().to(signup))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))

            // Protected routes (require a valid access token)
            .service(
                web::scope("/api")
                    .wrap(AuthGuard::new(engine.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/admin/revoke/session", web::post().to(revoke_session))
                    .route("/admin/revoke/family", web::post().to(revoke_family))
                    .route("/admin/sessions/{user_id}", web::get().to(user_sessions))
                    .route("/admin/events", web::get().to(list_events))
                    .route("/admin/users", web::get().to(list_users))
                    .route("/admin/stats", web::get().to(event_stats)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
