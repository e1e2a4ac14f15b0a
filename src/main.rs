use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use session_hardener::auth::{
    AccessTokenIssuer, PasswordHasher, RateLimiter, RefreshTokenCodec, SigningKeypair,
};
use session_hardener::configuration::get_configuration;
use session_hardener::geo_client::GeoClient;
use session_hardener::session::{PgSessionStore, SessionEngine};
use session_hardener::startup::run;
use session_hardener::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Structured logging first, everything after this is traceable
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    let store = PgSessionStore::new(pool);
    store.migrate().await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
    })?;

    tracing::info!("Database migrations applied");

    // Fresh Ed25519 key material every boot: a restart invalidates all
    // outstanding access tokens, refresh tokens survive in the store.
    let keys = SigningKeypair::generate().map_err(|e| {
        tracing::error!("Failed to generate signing keypair: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Key generation error")
    })?;
    tracing::info!(key_fingerprint = %keys.fingerprint(), "Signing keypair generated");

    let issuer = AccessTokenIssuer::new(keys, configuration.tokens.issuer.clone());

    let password_hasher = PasswordHasher::new(&configuration.password).map_err(|e| {
        tracing::error!("Failed to build password hasher: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Password hasher error")
    })?;

    let refresh_codec = RefreshTokenCodec::new(&configuration.refresh_hash).map_err(|e| {
        tracing::error!("Failed to build refresh-token codec: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Refresh codec error")
    })?;

    let limiter = RateLimiter::new(&configuration.rate_limit);

    let geo = if configuration.geo.enabled {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(configuration.geo.timeout_secs))
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build geolocation HTTP client: {}", e);
                std::io::Error::new(std::io::ErrorKind::Other, "HTTP client error")
            })?;
        Some(GeoClient::new(&configuration.geo, http_client))
    } else {
        tracing::info!("Geolocation enrichment disabled");
        None
    };

    let engine = SessionEngine::new(
        Arc::new(store),
        issuer,
        password_hasher,
        refresh_codec,
        limiter,
        geo,
        configuration.tokens.clone(),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    tracing::info!("Binding server to address: {}", address);

    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, engine)?;
    tracing::info!("Server started successfully");

    let _ = server.await;

    Ok(())
}
