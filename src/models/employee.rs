use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEmployeeData {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEmployeeData {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Employee {
    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        data: CreateEmployeeData,
    ) -> Result<Self, sqlx::Error> {
        let employee = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO employees (tenant_id, name, email, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(&data.name)
        .bind(&data.email)
        .bind(&data.phone)
        .fetch_one(pool)
        .await?;

        Ok(employee)
    }

    pub async fn find_for_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let employee = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM employees WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;

        Ok(employee)
    }

    pub async fn list_by_tenant(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let employees = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM employees
            WHERE tenant_id = $1 AND is_active = TRUE
            ORDER BY name ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await?;

        Ok(employees)
    }

    pub async fn count_active(pool: &PgPool, tenant_id: Uuid) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM employees WHERE tenant_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    pub async fn update(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        data: UpdateEmployeeData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let employee = sqlx::query_as::<_, Self>(
            r#"
            UPDATE employees
            SET
                name = COALESCE($3, name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(data.name)
        .bind(data.email)
        .bind(data.phone)
        .fetch_optional(pool)
        .await?;

        Ok(employee)
    }

    pub async fn deactivate(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE employees
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the set of services this employee performs
    pub async fn set_services(
        pool: &PgPool,
        employee_id: Uuid,
        service_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM employee_services WHERE employee_id = $1")
            .bind(employee_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO employee_services (employee_id, service_id)
            SELECT $1, UNNEST($2::uuid[])
            "#,
        )
        .bind(employee_id)
        .bind(service_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn service_ids(pool: &PgPool, employee_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT service_id FROM employee_services WHERE employee_id = $1
            "#,
        )
        .bind(employee_id)
        .fetch_all(pool)
        .await?;

        Ok(ids)
    }

    pub async fn performs_service(
        pool: &PgPool,
        employee_id: Uuid,
        service_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let performs: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM employee_services WHERE employee_id = $1 AND service_id = $2
            )
            "#,
        )
        .bind(employee_id)
        .bind(service_id)
        .fetch_one(pool)
        .await?;

        Ok(performs)
    }
}
