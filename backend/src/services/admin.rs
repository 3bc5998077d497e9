//! Administration: user accounts and order reporting

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{OrderStatus, PaginatedResponse, Pagination, User, UserRole};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::auth::{UserRow, USER_COLUMNS};
use crate::services::order::{OrderRow, OrderService, ORDER_COLUMNS};

/// Admin service
#[derive(Clone)]
pub struct AdminService {
    db: PgPool,
}

/// Filters for the user list
#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Filters for the order list
#[derive(Debug, Default, Deserialize)]
pub struct AdminOrderQuery {
    pub status: Option<OrderStatus>,
    /// `csv` exports every matching order instead of a page
    pub format: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl AdminOrderQuery {
    pub fn wants_csv(&self) -> bool {
        self.format.as_deref().is_some_and(|f| f.eq_ignore_ascii_case("csv"))
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleInput {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub is_active: bool,
}

/// One line of the order export
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct OrderExportRow {
    pub reference: String,
    pub status: String,
    pub cliente_email: String,
    pub cliente_name: String,
    pub total: Decimal,
    pub currency: String,
    pub item_count: i64,
    pub wompi_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Render export rows as CSV with a header line
pub fn orders_to_csv(rows: &[OrderExportRow]) -> AppResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))
}

impl AdminService {
    /// Create a new AdminService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_users(&self, query: &UserQuery) -> AppResult<PaginatedResponse<User>> {
        let pagination = Pagination::from_query(query.page, query.per_page);
        let role = query.role.map(|r| r.as_str());
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::text IS NULL OR email ILIKE $2 OR full_name ILIKE $2)
            "#,
        )
        .bind(role)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {} FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::text IS NULL OR email ILIKE $2 OR full_name ILIKE $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            USER_COLUMNS
        ))
        .bind(role)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let users = rows
            .into_iter()
            .map(UserRow::into_user)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(users, pagination, total.max(0) as u64))
    }

    pub async fn update_role(&self, admin: &AuthUser, user_id: Uuid, role: UserRole) -> AppResult<User> {
        if admin.user_id == user_id && role != UserRole::Admin {
            return Err(AppError::validation(
                "role",
                "You cannot remove your own admin role",
                "No puedes quitarte el rol de administrador",
            ));
        }

        let user = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(role.as_str())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?
        .into_user()?;

        tracing::info!(user_id = %user_id, role = %role, by = %admin.user_id, "User role changed");
        Ok(user)
    }

    /// Activate or deactivate an account. Deactivation also revokes its refresh tokens.
    pub async fn update_status(&self, admin: &AuthUser, user_id: Uuid, is_active: bool) -> AppResult<User> {
        if admin.user_id == user_id && !is_active {
            return Err(AppError::validation(
                "is_active",
                "You cannot deactivate your own account",
                "No puedes desactivar tu propia cuenta",
            ));
        }

        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(is_active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        if !is_active {
            sqlx::query(
                "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(user_id = %user_id, is_active, by = %admin.user_id, "User status changed");
        user.into_user()
    }

    /// All orders, optionally filtered by status
    pub async fn list_orders(
        &self,
        orders: &OrderService,
        query: &AdminOrderQuery,
    ) -> AppResult<PaginatedResponse<shared::Order>> {
        let pagination = Pagination::from_query(query.page, query.per_page);
        let status = query.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {} FROM orders o
            WHERE ($1::text IS NULL OR o.status = $1)
            ORDER BY o.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            ORDER_COLUMNS
        ))
        .bind(status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = orders.attach_items(rows).await?;
        Ok(PaginatedResponse::new(data, pagination, total.max(0) as u64))
    }

    /// Every matching order as CSV
    pub async fn export_orders(&self, query: &AdminOrderQuery) -> AppResult<String> {
        let rows = sqlx::query_as::<_, OrderExportRow>(
            r#"
            SELECT o.reference, o.status, u.email AS cliente_email, u.full_name AS cliente_name,
                   o.total, o.currency,
                   (SELECT COUNT(*) FROM order_items oi WHERE oi.order_id = o.id) AS item_count,
                   o.wompi_transaction_id, o.created_at, o.paid_at
            FROM orders o
            JOIN users u ON u.id = o.cliente_id
            WHERE ($1::text IS NULL OR o.status = $1)
            ORDER BY o.created_at DESC
            "#,
        )
        .bind(query.status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        orders_to_csv(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_export_has_header_and_rows() {
        let created_at = DateTime::parse_from_rfc3339("2024-03-01T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let rows = vec![OrderExportRow {
            reference: "PAT-1A2B3C4D5E6F".to_string(),
            status: "paid".to_string(),
            cliente_email: "maria@example.com".to_string(),
            cliente_name: "María, la costurera".to_string(),
            total: Decimal::new(4_500_000, 2),
            currency: "COP".to_string(),
            item_count: 2,
            wompi_transaction_id: Some("1234-1610641025-49201".to_string()),
            created_at,
            paid_at: None,
        }];

        let csv = orders_to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("reference,status,cliente_email,cliente_name,total,currency,item_count,wompi_transaction_id,created_at,paid_at")
        );
        let line = lines.next().unwrap();
        assert!(line.starts_with("PAT-1A2B3C4D5E6F,paid,maria@example.com,\"María, la costurera\",45000.00,COP,2,"));
        assert!(line.ends_with(','));
    }

    #[test]
    fn test_empty_export_is_empty() {
        assert_eq!(orders_to_csv(&[]).unwrap(), "");
    }

    #[test]
    fn test_csv_format_flag() {
        let query = AdminOrderQuery {
            format: Some("CSV".to_string()),
            ..Default::default()
        };
        assert!(query.wants_csv());
        assert!(!AdminOrderQuery::default().wants_csv());
    }
}
