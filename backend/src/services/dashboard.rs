//! Role dashboards: summary figures for patronistas, clientes and admins

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

/// Dashboard service
#[derive(Clone)]
pub struct DashboardService {
    db: PgPool,
}

/// A count per status or role
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

/// One sold order line
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RecentSale {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub cliente_name: String,
    pub subtotal: Decimal,
    pub include_training: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Patronista dashboard
#[derive(Debug, Serialize)]
pub struct PatronistaDashboard {
    pub total_products: i64,
    pub active_products: i64,
    pub units_sold: i64,
    pub revenue: Decimal,
    pub pending_trainings: i64,
    pub recent_sales: Vec<RecentSale>,
}

/// A product the cliente owns
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PurchasedProduct {
    pub product_id: Uuid,
    pub title: String,
    pub patronista_name: String,
    pub paid_at: Option<DateTime<Utc>>,
}

/// An upcoming session
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UpcomingTraining {
    pub training_id: Uuid,
    pub product_title: String,
    pub patronista_name: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub meeting_url: Option<String>,
}

/// Cliente dashboard
#[derive(Debug, Serialize)]
pub struct ClienteDashboard {
    pub orders_by_status: Vec<LabelCount>,
    pub total_spent: Decimal,
    pub purchased_products: Vec<PurchasedProduct>,
    pub upcoming_trainings: Vec<UpcomingTraining>,
}

/// Best selling product
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub title: String,
    pub units_sold: i64,
    pub revenue: Decimal,
}

/// Admin dashboard
#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub users_by_role: Vec<LabelCount>,
    pub orders_by_status: Vec<LabelCount>,
    pub gross_revenue: Decimal,
    pub active_products: i64,
    pub top_products: Vec<TopProduct>,
}

impl DashboardService {
    /// Create a new DashboardService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn patronista(&self, patronista_id: Uuid) -> AppResult<PatronistaDashboard> {
        let (total_products, active_products) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active)
            FROM products WHERE patronista_id = $1
            "#,
        )
        .bind(patronista_id)
        .fetch_one(&self.db)
        .await?;

        let (units_sold, revenue) = sqlx::query_as::<_, (i64, Decimal)>(
            r#"
            SELECT COUNT(oi.id), COALESCE(SUM(oi.subtotal), 0)
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE oi.patronista_id = $1 AND o.status = 'paid'
            "#,
        )
        .bind(patronista_id)
        .fetch_one(&self.db)
        .await?;

        let pending_trainings = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM trainings WHERE patronista_id = $1 AND status IN ('requested', 'scheduled')",
        )
        .bind(patronista_id)
        .fetch_one(&self.db)
        .await?;

        let recent_sales = sqlx::query_as::<_, RecentSale>(
            r#"
            SELECT o.id AS order_id, oi.product_id, p.title AS product_title,
                   u.full_name AS cliente_name, oi.subtotal, oi.include_training, o.paid_at
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN products p ON p.id = oi.product_id
            JOIN users u ON u.id = o.cliente_id
            WHERE oi.patronista_id = $1 AND o.status = 'paid'
            ORDER BY o.paid_at DESC
            LIMIT 10
            "#,
        )
        .bind(patronista_id)
        .fetch_all(&self.db)
        .await?;

        Ok(PatronistaDashboard {
            total_products,
            active_products,
            units_sold,
            revenue,
            pending_trainings,
            recent_sales,
        })
    }

    pub async fn cliente(&self, cliente_id: Uuid) -> AppResult<ClienteDashboard> {
        let orders_by_status = sqlx::query_as::<_, LabelCount>(
            r#"
            SELECT status AS label, COUNT(*) AS count
            FROM orders WHERE cliente_id = $1
            GROUP BY status ORDER BY status
            "#,
        )
        .bind(cliente_id)
        .fetch_all(&self.db)
        .await?;

        let total_spent = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(total), 0) FROM orders WHERE cliente_id = $1 AND status = 'paid'",
        )
        .bind(cliente_id)
        .fetch_one(&self.db)
        .await?;

        let purchased_products = sqlx::query_as::<_, PurchasedProduct>(
            r#"
            SELECT DISTINCT ON (p.id)
                   p.id AS product_id, p.title, u.full_name AS patronista_name, o.paid_at
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN products p ON p.id = oi.product_id
            JOIN users u ON u.id = p.patronista_id
            WHERE o.cliente_id = $1 AND o.status = 'paid'
            ORDER BY p.id, o.paid_at
            "#,
        )
        .bind(cliente_id)
        .fetch_all(&self.db)
        .await?;

        let upcoming_trainings = sqlx::query_as::<_, UpcomingTraining>(
            r#"
            SELECT t.id AS training_id, p.title AS product_title, u.full_name AS patronista_name,
                   t.scheduled_at, t.duration_minutes, t.meeting_url
            FROM trainings t
            JOIN products p ON p.id = t.product_id
            JOIN users u ON u.id = t.patronista_id
            WHERE t.cliente_id = $1
              AND (t.status = 'requested' OR (t.status = 'scheduled' AND t.scheduled_at > NOW()))
            ORDER BY t.scheduled_at NULLS LAST
            "#,
        )
        .bind(cliente_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ClienteDashboard {
            orders_by_status,
            total_spent,
            purchased_products,
            upcoming_trainings,
        })
    }

    pub async fn admin(&self) -> AppResult<AdminDashboard> {
        let users_by_role = sqlx::query_as::<_, LabelCount>(
            "SELECT role AS label, COUNT(*) AS count FROM users GROUP BY role ORDER BY role",
        )
        .fetch_all(&self.db)
        .await?;

        let orders_by_status = sqlx::query_as::<_, LabelCount>(
            "SELECT status AS label, COUNT(*) AS count FROM orders GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.db)
        .await?;

        let gross_revenue = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(total), 0) FROM orders WHERE status = 'paid'",
        )
        .fetch_one(&self.db)
        .await?;

        let active_products =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE is_active = true")
                .fetch_one(&self.db)
                .await?;

        let top_products = sqlx::query_as::<_, TopProduct>(
            r#"
            SELECT p.id AS product_id, p.title, COUNT(oi.id) AS units_sold,
                   COALESCE(SUM(oi.subtotal), 0) AS revenue
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN products p ON p.id = oi.product_id
            WHERE o.status = 'paid'
            GROUP BY p.id, p.title
            ORDER BY units_sold DESC, revenue DESC
            LIMIT 5
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(AdminDashboard {
            users_by_role,
            orders_by_status,
            gross_revenue,
            active_products,
            top_products,
        })
    }
}
