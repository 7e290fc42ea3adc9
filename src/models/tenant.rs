use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub utc_offset_minutes: i32, // local time = UTC + offset
    pub slot_interval_minutes: i32,
    pub booking_window_days: i32,
    #[serde(skip)]
    pub mp_access_token: Option<Vec<u8>>, // AES-256-GCM encrypted
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a tenant (booking pages)
#[derive(Debug, Clone, Serialize)]
pub struct TenantProfile {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub utc_offset_minutes: i32,
}

impl From<&Tenant> for TenantProfile {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id,
            slug: tenant.slug.clone(),
            name: tenant.name.clone(),
            phone: tenant.phone.clone(),
            address: tenant.address.clone(),
            description: tenant.description.clone(),
            utc_offset_minutes: tenant.utc_offset_minutes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateTenantData {
    pub slug: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTenantData {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub utc_offset_minutes: Option<i32>,
    pub slot_interval_minutes: Option<i32>,
    pub booking_window_days: Option<i32>,
}

/// Admin listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub plan: Option<String>,
}

/// Tenant row joined with its subscription for the admin panel
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TenantOverview {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub plan: Option<String>,
    pub subscription_status: Option<String>,
    pub booking_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Current wall-clock time at the tenant's location
    pub fn local_now(&self, now: DateTime<Utc>) -> chrono::NaiveDateTime {
        now.naive_utc() + chrono::Duration::minutes(i64::from(self.utc_offset_minutes))
    }

    /// Creates a new tenant
    pub async fn create<'e, E>(executor: E, data: CreateTenantData) -> Result<Self, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let tenant = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO tenants (slug, name, email, password_hash, phone)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&data.slug)
        .bind(&data.name)
        .bind(&data.email)
        .bind(&data.password_hash)
        .bind(&data.phone)
        .fetch_one(executor)
        .await?;

        Ok(tenant)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let tenant = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tenants WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(tenant)
    }

    /// Finds an active tenant by its public slug
    pub async fn find_active_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        let tenant = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tenants WHERE slug = $1 AND is_active = TRUE
            "#,
        )
        .bind(slug)
        .fetch_optional(pool)
        .await?;

        Ok(tenant)
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let tenant = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM tenants WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(tenant)
    }

    pub async fn slug_or_email_taken(
        pool: &PgPool,
        slug: &str,
        email: &str,
    ) -> Result<bool, sqlx::Error> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM tenants WHERE slug = $1 OR LOWER(email) = LOWER($2)
            )
            "#,
        )
        .bind(slug)
        .bind(email)
        .fetch_one(pool)
        .await?;

        Ok(taken)
    }

    /// Updates tenant settings; absent fields keep their value
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTenantData,
    ) -> Result<Self, sqlx::Error> {
        let tenant = sqlx::query_as::<_, Self>(
            r#"
            UPDATE tenants
            SET
                name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                address = COALESCE($4, address),
                description = COALESCE($5, description),
                utc_offset_minutes = COALESCE($6, utc_offset_minutes),
                slot_interval_minutes = COALESCE($7, slot_interval_minutes),
                booking_window_days = COALESCE($8, booking_window_days),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.phone)
        .bind(data.address)
        .bind(data.description)
        .bind(data.utc_offset_minutes)
        .bind(data.slot_interval_minutes)
        .bind(data.booking_window_days)
        .fetch_one(pool)
        .await?;

        Ok(tenant)
    }

    /// Stores (or clears) the tenant's encrypted Mercado Pago access token
    pub async fn set_mp_access_token(
        pool: &PgPool,
        id: Uuid,
        encrypted_token: Option<Vec<u8>>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tenants
            SET mp_access_token = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(encrypted_token)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_active_status(
        pool: &PgPool,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let tenant = sqlx::query_as::<_, Self>(
            r#"
            UPDATE tenants
            SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(is_active)
        .fetch_optional(pool)
        .await?;

        Ok(tenant)
    }

    /// Paginated admin listing with optional filters
    pub async fn list_overview(
        pool: &PgPool,
        filter: &TenantFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TenantOverview>, i64), sqlx::Error> {
        let mut count_query = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM tenants t LEFT JOIN subscriptions s ON s.tenant_id = t.id",
        );
        push_tenant_filter(&mut count_query, filter);
        let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT
                t.id, t.slug, t.name, t.email, t.is_active,
                s.plan, s.status AS subscription_status,
                (SELECT COUNT(*) FROM bookings b WHERE b.tenant_id = t.id) AS booking_count,
                t.created_at
            FROM tenants t
            LEFT JOIN subscriptions s ON s.tenant_id = t.id
            "#,
        );
        push_tenant_filter(&mut query, filter);
        query.push(" ORDER BY t.created_at DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let tenants = query
            .build_query_as::<TenantOverview>()
            .fetch_all(pool)
            .await?;

        Ok((tenants, total))
    }
}

fn push_tenant_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &TenantFilter) {
    query.push(" WHERE TRUE");

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        query.push(" AND (LOWER(t.name) LIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR LOWER(t.slug) LIKE ");
        query.push_bind(pattern.clone());
        query.push(" OR LOWER(t.email) LIKE ");
        query.push_bind(pattern);
        query.push(")");
    }
    if let Some(is_active) = filter.is_active {
        query.push(" AND t.is_active = ");
        query.push_bind(is_active);
    }
    if let Some(plan) = filter.plan.as_deref() {
        query.push(" AND s.plan = ");
        query.push_bind(plan.to_uppercase());
    }
}

/// Turns a business name into a URL slug (`"Peluquería Ana"` -> `"peluqueria-ana"`)
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;

    for c in name.chars().flat_map(char::to_lowercase) {
        let c = match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        };

        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Peluquería Ana"), "peluqueria-ana");
        assert_eq!(slugify("  Barber & Co.  "), "barber-co");
        assert_eq!(slugify("Niño's Spa"), "nino-s-spa");
        assert_eq!(slugify("---"), "");
    }
}
