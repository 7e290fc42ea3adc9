use axum::extract::FromRef;
use ring::digest;
use secrecy::{ExposeSecret, Secret};
use sqlx::PgPool;
use tower_sessions::{cookie::Key, service::SignedCookie, Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::Config;
use crate::services::payments::PaymentGateway;

/// Session keys used in the application
pub const SESSION_KEY_TENANT_ID: &str = "tenant_id";
pub const SESSION_KEY_SESSION_STARTED_AT: &str = "session_started_at";

/// Cookie signing key; any secret length maps onto the 64 bytes `Key` expects
pub fn signing_key(secret: &Secret<String>) -> Key {
    let digest = digest::digest(&digest::SHA512, secret.expose_secret().as_bytes());
    Key::from(digest.as_ref())
}

/// Creates a session layer for Axum
pub async fn create_session_layer(
    pool: PgPool,
    config: &Config,
) -> Result<SessionManagerLayer<PostgresStore, SignedCookie>, sqlx::Error> {
    // Create the session store backed by PostgreSQL
    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_signed(signing_key(&config.session_secret))
        .with_secure(config.uses_https())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)));

    Ok(session_layer)
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub payments: PaymentGateway,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let payments = PaymentGateway::from_config(&config, reqwest::Client::new());
        Self {
            pool,
            config,
            payments,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use std::future::Future;

    #[tokio::test]
    async fn test_session_layer_signs_cookies() {
        fn assert_signed<F>(_: F)
        where
            F: Future<Output = Result<SessionManagerLayer<PostgresStore, SignedCookie>, sqlx::Error>>,
        {
        }

        let config = Config::for_tests();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        // Never awaited, so no connection is attempted
        assert_signed(create_session_layer(pool, &config));
    }

    #[test]
    fn test_signing_key_depends_on_secret() {
        let a = signing_key(&Secret::new("short".to_string()));
        let b = signing_key(&Secret::new("short".to_string()));
        let c = signing_key(&Secret::new("another secret".to_string()));
        assert_eq!(a.master(), b.master());
        assert_ne!(a.master(), c.master());
    }
}
