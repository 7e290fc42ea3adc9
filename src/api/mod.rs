// API module - HTTP endpoints

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod customers;
pub mod employees;
pub mod health;
pub mod middleware;
pub mod pagination;
pub mod public;
pub mod reports;
pub mod reviews;
pub mod schedules;
pub mod services;
pub mod tenant;
pub mod webhooks;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use crate::config::Config;
use middleware::session::AppState;

/// Every route of the application; session and tracing layers are added by the caller
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(auth::router())
        .merge(tenant::router())
        .merge(services::router())
        .merge(employees::router())
        .merge(schedules::router())
        .merge(bookings::router())
        .merge(customers::router())
        .merge(reviews::router())
        .merge(reports::router())
        .merge(public::router())
        .merge(webhooks::router())
        .merge(admin::router(state))
}

/// Lets the booking frontend call the API with the session cookie
pub fn cors_layer(config: &Config) -> Result<CorsLayer, header::InvalidHeaderValue> {
    let origin = HeaderValue::from_str(config.frontend_url.trim_end_matches('/'))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    use crate::api::middleware::auth::ADMIN_KEY_HEADER;

    /// The pool never connects; every request here must be answered before touching it
    fn app() -> Router {
        let config = Config::for_tests();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let state = AppState::new(pool, config);

        router(state.clone())
            .layer(SessionManagerLayer::new(MemoryStore::default()))
            .with_state(state)
    }

    async fn status_of(request: Request<Body>) -> StatusCode {
        app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_admin_routes_require_key() {
        let request = Request::get("/api/admin/stats").body(Body::empty()).unwrap();
        assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED);

        let request = Request::get("/api/admin/tenants")
            .header(ADMIN_KEY_HEADER, "wrong-key")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_dashboard_routes_require_session() {
        for uri in ["/api/tenant", "/api/bookings", "/api/customers", "/api/reports/summary?from=2024-01-01&to=2024-01-31"] {
            let request = Request::get(uri).body(Body::empty()).unwrap();
            assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_webhook_without_tenant_is_rejected() {
        let request = Request::post("/api/webhooks/mercadopago?type=payment&data.id=123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_with_non_numeric_payment_id_is_rejected() {
        let uri = format!(
            "/api/webhooks/mercadopago?tenant={}&type=payment&data.id=..%2F..%2Fusers%2Fme",
            uuid::Uuid::new_v4()
        );
        let request = Request::post(uri).body(Body::empty()).unwrap();
        assert_eq!(status_of(request).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let request = Request::get("/api/nope").body(Body::empty()).unwrap();
        assert_eq!(status_of(request).await, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_cors_layer_accepts_frontend_url() {
        assert!(cors_layer(&Config::for_tests()).is_ok());

        let mut config = Config::for_tests();
        config.frontend_url = "http://bad\nhost".to_string();
        assert!(cors_layer(&config).is_err());
    }
}
