use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::{
    audit_log::{self, AuditLog, NewAuditLog},
    subscription::{Subscription, SubscriptionStatus},
    tenant::{self, CreateTenantData, Tenant},
};
use crate::services::password::{self, PasswordError};
use crate::services::subscriptions::{TRIAL_DAYS, TRIAL_PLAN};

pub const MAX_FAILED_LOGINS: i64 = 5;
pub const LOCKOUT_WINDOW_MINUTES: i64 = 15;

const RESERVED_SLUGS: &[&str] = &["admin", "api", "app", "bookings", "dashboard", "login", "public", "static"];

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("A business with this slug or email already exists")]
    AlreadyRegistered,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many failed login attempts, try again in {} minutes", LOCKOUT_WINDOW_MINUTES)]
    LockedOut,

    #[error("This account has been deactivated")]
    AccountDisabled,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::DatabaseError(e) => AppError::Database(e),
            AuthError::Password(PasswordError::TooShort) | AuthError::InvalidRegistration(_) => {
                AppError::Validation(err.to_string())
            }
            AuthError::Password(e) => AppError::Internal(anyhow::anyhow!(e)),
            AuthError::AlreadyRegistered => AppError::Conflict(err.to_string()),
            AuthError::InvalidCredentials => AppError::Unauthorized,
            AuthError::LockedOut => AppError::TooManyRequests(err.to_string()),
            AuthError::AccountDisabled => AppError::Forbidden(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub business_name: String,
    /// Derived from the business name when absent
    pub slug: Option<String>,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Validates and normalizes a registration, returning `(slug, email)`
pub fn normalize_registration(request: &RegisterRequest) -> Result<(String, String), AuthError> {
    if request.business_name.trim().is_empty() {
        return Err(AuthError::InvalidRegistration(
            "business name is required".to_string(),
        ));
    }

    let email = request.email.trim().to_lowercase();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(AuthError::InvalidRegistration(format!(
            "invalid email address: {}",
            email
        )));
    }

    let slug = tenant::slugify(request.slug.as_deref().unwrap_or(&request.business_name));
    if slug.len() < 3 || slug.len() > 60 {
        return Err(AuthError::InvalidRegistration(
            "slug must be between 3 and 60 characters".to_string(),
        ));
    }
    if RESERVED_SLUGS.contains(&slug.as_str()) {
        return Err(AuthError::InvalidRegistration(format!(
            "slug '{}' is reserved",
            slug
        )));
    }

    password::validate_strength(&request.password)?;

    Ok((slug, email))
}

/// Creates a tenant together with its trial subscription
#[tracing::instrument(skip(pool, request), fields(email = %request.email))]
pub async fn register(
    pool: &PgPool,
    request: RegisterRequest,
    ip_address: Option<String>,
    now: DateTime<Utc>,
) -> Result<Tenant, AuthError> {
    let (slug, email) = normalize_registration(&request)?;

    if Tenant::slug_or_email_taken(pool, &slug, &email).await? {
        return Err(AuthError::AlreadyRegistered);
    }

    let password_hash = password::hash_password(&request.password)?;

    let mut tx = pool.begin().await?;

    let tenant = Tenant::create(
        &mut *tx,
        CreateTenantData {
            slug,
            name: request.business_name.trim().to_string(),
            email,
            password_hash,
            phone: request.phone,
        },
    )
    .await
    .map_err(|e| match e {
        // Lost a race with another registration
        sqlx::Error::Database(ref db) if db.is_unique_violation() => AuthError::AlreadyRegistered,
        other => AuthError::DatabaseError(other),
    })?;

    Subscription::create(
        &mut *tx,
        tenant.id,
        TRIAL_PLAN,
        SubscriptionStatus::Trialing,
        Some(now + Duration::days(TRIAL_DAYS)),
    )
    .await?;

    tx.commit().await?;

    AuditLog::record_quietly(
        pool,
        NewAuditLog {
            tenant_id: Some(tenant.id),
            actor: format!("tenant:{}", tenant.id),
            action: audit_log::ACTION_TENANT_REGISTERED,
            entity_type: Some("tenant"),
            entity_id: Some(tenant.id.to_string()),
            ip_address,
            metadata: Some(json!({ "slug": tenant.slug })),
        },
    )
    .await;

    tracing::info!(tenant_id = %tenant.id, slug = %tenant.slug, "Tenant registered");

    Ok(tenant)
}

/// Checks credentials, enforcing the failed-attempt lockout
#[tracing::instrument(skip(pool, request))]
pub async fn login(
    pool: &PgPool,
    request: LoginRequest,
    ip_address: Option<String>,
    now: DateTime<Utc>,
) -> Result<Tenant, AuthError> {
    let email = request.email.trim().to_lowercase();

    let since = now - Duration::minutes(LOCKOUT_WINDOW_MINUTES);
    let failures = AuditLog::count_failed_logins(pool, &email, since).await?;
    if failures >= MAX_FAILED_LOGINS {
        tracing::warn!(%email, failures, "Login rejected, account locked out");
        return Err(AuthError::LockedOut);
    }

    let tenant = Tenant::find_by_email(pool, &email).await?;
    let verified = match &tenant {
        Some(tenant) => password::verify_password(&request.password, &tenant.password_hash)?,
        None => false,
    };

    let Some(tenant) = tenant.filter(|_| verified) else {
        AuditLog::record_quietly(
            pool,
            NewAuditLog {
                actor: "anonymous".to_string(),
                action: audit_log::ACTION_LOGIN_FAILED,
                entity_type: Some("email"),
                entity_id: Some(email.clone()),
                ip_address,
                ..Default::default()
            },
        )
        .await;
        tracing::info!(%email, "Login failed");
        return Err(AuthError::InvalidCredentials);
    };

    if !tenant.is_active {
        return Err(AuthError::AccountDisabled);
    }

    AuditLog::record_quietly(
        pool,
        NewAuditLog {
            tenant_id: Some(tenant.id),
            actor: format!("tenant:{}", tenant.id),
            action: audit_log::ACTION_LOGIN_SUCCEEDED,
            entity_type: Some("tenant"),
            entity_id: Some(tenant.id.to_string()),
            ip_address,
            ..Default::default()
        },
    )
    .await;

    tracing::info!(tenant_id = %tenant.id, "Tenant logged in");

    Ok(tenant)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, slug: Option<&str>, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            business_name: name.to_string(),
            slug: slug.map(str::to_string),
            email: email.to_string(),
            password: password.to_string(),
            phone: None,
        }
    }

    #[test]
    fn test_normalize_registration() {
        let (slug, email) =
            normalize_registration(&request("Peluquería Ana", None, " Ana@Example.com ", "secret123"))
                .unwrap();
        assert_eq!(slug, "peluqueria-ana");
        assert_eq!(email, "ana@example.com");

        let (slug, _) =
            normalize_registration(&request("Ana", Some("Ana Cortes"), "ana@example.com", "secret123"))
                .unwrap();
        assert_eq!(slug, "ana-cortes");
    }

    #[test]
    fn test_registration_rejections() {
        assert!(matches!(
            normalize_registration(&request(" ", None, "a@b.co", "secret123")),
            Err(AuthError::InvalidRegistration(_))
        ));
        assert!(matches!(
            normalize_registration(&request("Ana", None, "not-an-email", "secret123")),
            Err(AuthError::InvalidRegistration(_))
        ));
        assert!(matches!(
            normalize_registration(&request("Admin", None, "a@b.co", "secret123")),
            Err(AuthError::InvalidRegistration(msg)) if msg.contains("reserved")
        ));
        assert!(matches!(
            normalize_registration(&request("Ana Spa", None, "a@b.co", "short")),
            Err(AuthError::Password(PasswordError::TooShort))
        ));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(AppError::from(AuthError::LockedOut), AppError::TooManyRequests(_)));
        assert!(matches!(AppError::from(AuthError::InvalidCredentials), AppError::Unauthorized));
        assert!(matches!(
            AppError::from(AuthError::Password(PasswordError::TooShort)),
            AppError::Validation(_)
        ));
    }
}
