use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use ring::constant_time;
use secrecy::ExposeSecret;
use tower_sessions::Session;
use uuid::Uuid;

use super::session::{AppState, SESSION_KEY_TENANT_ID};
use crate::error::AppError;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Tenant id of the logged-in owner, or `Unauthorized`
pub async fn current_tenant(session: &Session) -> Result<Uuid, AppError> {
    session
        .get::<Uuid>(SESSION_KEY_TENANT_ID)
        .await
        .map_err(|e| AppError::Session(e.to_string()))?
        .ok_or(AppError::Unauthorized)
}

/// Middleware that requires the `x-admin-key` header to match the configured key
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let expected = state.config.admin_api_key.expose_secret();
    if provided.is_empty()
        || constant_time::verify_slices_are_equal(provided.as_bytes(), expected.as_bytes()).is_err()
    {
        tracing::warn!(ip = ?client_ip(request.headers()), "Rejected admin request");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Best-effort client address from proxy headers
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_client_ip_fallbacks() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.2"));
    }
}
