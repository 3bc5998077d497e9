//! Orders: checkout from the storefront cart, payment links and status polling

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    cart_total, generate_order_reference, to_amount_in_cents, CartLine, DomainError, Order,
    OrderItem, OrderStatus, PaginatedResponse, Pagination, StatusChange, UserRole,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::external::wompi::{
    integrity_signature, PaymentLink, PaymentLinkRequest, WompiClient, WompiTransaction,
};
use crate::middleware::AuthUser;
use crate::services::PaymentService;

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
    wompi: WompiClient,
    config: Arc<Config>,
}

/// One line of the storefront cart
#[derive(Debug, Clone, Deserialize)]
pub struct CartItemInput {
    pub product_id: Uuid,
    #[serde(default)]
    pub include_training: bool,
}

/// Input for creating an order
#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub items: Vec<CartItemInput>,
}

/// Order plus what the storefront needs to open the checkout
#[derive(Debug, Serialize)]
pub struct CheckoutOrder {
    #[serde(flatten)]
    pub order: Order,
    pub amount_in_cents: i64,
    pub integrity_signature: String,
}

/// Answer of the polling endpoint
#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Order row from database
#[derive(Debug, sqlx::FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub cliente_id: Uuid,
    pub reference: String,
    pub status: String,
    pub total: Decimal,
    pub currency: String,
    pub payment_link_id: Option<String>,
    pub checkout_url: Option<String>,
    pub wompi_transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn into_order(self, items: Vec<OrderItem>) -> AppResult<Order> {
        Ok(Order {
            id: self.id,
            cliente_id: self.cliente_id,
            reference: self.reference,
            status: self.status.parse()?,
            total: self.total,
            currency: self.currency,
            checkout_url: self.checkout_url,
            wompi_transaction_id: self.wompi_transaction_id,
            paid_at: self.paid_at,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const ORDER_COLUMNS: &str = "o.id, o.cliente_id, o.reference, o.status, o.total, \
     o.currency, o.payment_link_id, o.checkout_url, o.wompi_transaction_id, o.paid_at, \
     o.created_at, o.updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_title: String,
    patronista_id: Uuid,
    unit_price: Decimal,
    include_training: bool,
    training_price: Option<Decimal>,
    subtotal: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            product_id: row.product_id,
            product_title: row.product_title,
            patronista_id: row.patronista_id,
            unit_price: row.unit_price,
            include_training: row.include_training,
            training_price: row.training_price,
            subtotal: row.subtotal,
        }
    }
}

/// Purchasable product as read at checkout time
#[derive(Debug, sqlx::FromRow)]
struct CheckoutProduct {
    id: Uuid,
    patronista_id: Uuid,
    title: String,
    price: Decimal,
    training_available: bool,
    training_price: Option<Decimal>,
}

/// Price the cart against current product data
fn price_cart(
    buyer_id: Uuid,
    items: &[CartItemInput],
    products: &HashMap<Uuid, CheckoutProduct>,
) -> AppResult<Vec<CartLine>> {
    items
        .iter()
        .map(|item| {
            let product = products.get(&item.product_id).ok_or_else(|| {
                AppError::validation(
                    "items",
                    &format!("Product {} is not available", item.product_id),
                    "Un producto del carrito ya no está disponible",
                )
            })?;

            if product.patronista_id == buyer_id {
                return Err(AppError::validation(
                    "items",
                    "You cannot buy your own product",
                    "No puedes comprar tu propio producto",
                ));
            }

            if item.include_training && !product.training_available {
                return Err(DomainError::TrainingNotOffered(product.id).into());
            }

            Ok(CartLine {
                product_id: product.id,
                unit_price: product.price,
                include_training: item.include_training,
                training_price: product.training_price.filter(|_| product.training_available),
            })
        })
        .collect()
}

fn describe_items(titles: &[&str]) -> String {
    let joined = titles.join(", ");
    if joined.chars().count() > 200 {
        let truncated: String = joined.chars().take(197).collect();
        format!("{}...", truncated)
    } else {
        joined
    }
}

impl OrderService {
    /// Create a new OrderService instance
    pub fn new(db: PgPool, wompi: WompiClient, config: Arc<Config>) -> Self {
        Self { db, wompi, config }
    }

    /// Turn the storefront cart into a pending order with a payment link
    pub async fn create_order(&self, user: &AuthUser, input: CreateOrderInput) -> AppResult<CheckoutOrder> {
        user.require_role(&[UserRole::Cliente])?;

        if input.items.is_empty() {
            return Err(DomainError::EmptyCart.into());
        }

        let product_ids: Vec<Uuid> = input.items.iter().map(|i| i.product_id).collect();

        let products: HashMap<Uuid, CheckoutProduct> = sqlx::query_as::<_, CheckoutProduct>(
            r#"
            SELECT p.id, p.patronista_id, p.title, p.price, p.training_available, p.training_price
            FROM products p
            JOIN users u ON u.id = p.patronista_id
            WHERE p.id = ANY($1) AND p.is_active = true AND u.is_active = true
            "#,
        )
        .bind(&product_ids)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

        let lines = price_cart(user.user_id, &input.items, &products)?;
        let total = cart_total(&lines)?;
        let amount_in_cents = to_amount_in_cents(total)?;

        let already_paid = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT oi.product_id
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.cliente_id = $1 AND o.status = 'paid' AND oi.product_id = ANY($2)
            LIMIT 1
            "#,
        )
        .bind(user.user_id)
        .bind(&product_ids)
        .fetch_optional(&self.db)
        .await?;

        if let Some(product_id) = already_paid {
            return Err(AppError::Conflict {
                resource: "items".to_string(),
                message: format!("Product {} was already purchased", product_id),
                message_es: "Ya compraste uno de los productos del carrito".to_string(),
            });
        }

        let order_id = Uuid::new_v4();
        let reference = generate_order_reference(order_id);
        let currency = self.config.wompi.currency.clone();

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, cliente_id, reference, status, total, currency)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            "#,
        )
        .bind(order_id)
        .bind(user.user_id)
        .bind(&reference)
        .bind(total)
        .bind(&currency)
        .execute(&mut *tx)
        .await?;

        for line in &lines {
            // Lines were built from `products`, so the lookup cannot miss
            let Some(product) = products.get(&line.product_id) else {
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, product_id, patronista_id, unit_price,
                    include_training, training_price, subtotal
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(product.patronista_id)
            .bind(line.unit_price)
            .bind(line.include_training)
            .bind(line.training_price.filter(|_| line.include_training))
            .bind(line.subtotal()?)
            .execute(&mut *tx)
            .await?;
        }

        let titles: Vec<&str> = lines
            .iter()
            .filter_map(|l| products.get(&l.product_id).map(|p| p.title.as_str()))
            .collect();

        // A failed link request drops `tx`, rolling the order back
        let link = self
            .request_payment_link(order_id, &reference, &describe_items(&titles), amount_in_cents)
            .await?;
        Self::store_payment_link(&mut tx, order_id, &link).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            reference = %reference,
            total = %total,
            items = lines.len(),
            "Order created"
        );

        let order = self.load_order(order_id).await?;
        self.with_checkout(order)
    }

    /// The caller's own orders, newest first
    pub async fn list_orders(&self, user: &AuthUser, pagination: Pagination) -> AppResult<PaginatedResponse<Order>> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE cliente_id = $1")
            .bind(user.user_id)
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {}
            FROM orders o
            WHERE o.cliente_id = $1
            ORDER BY o.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            ORDER_COLUMNS
        ))
        .bind(user.user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let orders = self.attach_items(rows).await?;
        Ok(PaginatedResponse::new(orders, pagination, total.max(0) as u64))
    }

    /// An order visible to its buyer, an admin, or a patronista selling in it
    pub async fn get_order(&self, user: &AuthUser, order_id: Uuid) -> AppResult<CheckoutOrder> {
        let order = self.load_order(order_id).await?;

        let allowed = user.owns_or_admin(order.cliente_id)
            || (user.role == UserRole::Patronista
                && order.items.iter().any(|i| i.patronista_id == user.user_id));
        if !allowed {
            return Err(AppError::InsufficientPermissions);
        }

        self.with_checkout(order)
    }

    /// Refresh an order's status from Wompi when it is still open
    pub async fn poll_status(
        &self,
        user: &AuthUser,
        order_id: Uuid,
        transaction_id: Option<String>,
    ) -> AppResult<OrderStatusResponse> {
        let row = self.order_row(order_id).await?;
        if !user.owns_or_admin(row.cliente_id) {
            return Err(AppError::InsufficientPermissions);
        }

        let status: OrderStatus = row.status.parse()?;
        let transaction_id = transaction_id
            .filter(|id| !id.trim().is_empty())
            .or(row.wompi_transaction_id.clone());

        if status.is_terminal() {
            return Ok(OrderStatusResponse { order_id, status, paid_at: row.paid_at });
        }

        if let Some(transaction_id) = transaction_id {
            match self.wompi.get_transaction(&transaction_id).await {
                Ok(transaction) => {
                    if !transaction_matches_order(
                        &transaction,
                        &row.reference,
                        row.payment_link_id.as_deref(),
                    ) {
                        return Err(AppError::validation(
                            "transaction_id",
                            "Transaction does not belong to this order",
                            "La transacción no corresponde a este pedido",
                        ));
                    }
                    let mut tx = self.db.begin().await?;
                    PaymentService::apply_transaction_status(&mut tx, order_id, &transaction).await?;
                    tx.commit().await?;
                }
                // The stored status is still a valid answer when Wompi is unreachable
                Err(AppError::PaymentGateway(e)) => {
                    tracing::warn!(order_id = %order_id, error = %e, "Status poll could not reach Wompi");
                }
                Err(AppError::NotFound(_)) => {
                    tracing::debug!(order_id = %order_id, transaction_id = %transaction_id, "Transaction not found yet");
                }
                Err(e) => return Err(e),
            }
        }

        let row = self.order_row(order_id).await?;
        Ok(OrderStatusResponse {
            order_id,
            status: row.status.parse()?,
            paid_at: row.paid_at,
        })
    }

    /// Issue a fresh payment link for a failed (or abandoned pending) order
    pub async fn regenerate_payment_link(&self, user: &AuthUser, order_id: Uuid) -> AppResult<CheckoutOrder> {
        let mut tx = self.db.begin().await?;

        let row = Self::lock_order(&mut tx, order_id).await?;
        if !user.owns_or_admin(row.cliente_id) {
            return Err(AppError::InsufficientPermissions);
        }

        let status: OrderStatus = row.status.parse()?;
        status.apply(OrderStatus::Pending)?;

        let titles = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.title FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;
        let titles: Vec<&str> = titles.iter().map(String::as_str).collect();

        let link = self
            .request_payment_link(
                order_id,
                &row.reference,
                &describe_items(&titles),
                to_amount_in_cents(row.total)?,
            )
            .await?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = 'pending', wompi_transaction_id = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
        Self::store_payment_link(&mut tx, order_id, &link).await?;

        tx.commit().await?;

        tracing::info!(order_id = %order_id, from = %status, "Payment link regenerated");

        let order = self.load_order(order_id).await?;
        self.with_checkout(order)
    }

    /// Cancel a pending order
    pub async fn cancel_order(&self, user: &AuthUser, order_id: Uuid) -> AppResult<OrderStatusResponse> {
        let mut tx = self.db.begin().await?;

        let row = Self::lock_order(&mut tx, order_id).await?;
        if !user.owns_or_admin(row.cliente_id) {
            return Err(AppError::InsufficientPermissions);
        }

        let status: OrderStatus = row.status.parse()?;
        if let StatusChange::Changed { .. } = status.apply(OrderStatus::Cancelled)? {
            sqlx::query("UPDATE orders SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
                .bind(order_id)
                .execute(&mut *tx)
                .await?;
            tracing::info!(order_id = %order_id, "Order cancelled");
        }

        tx.commit().await?;

        Ok(OrderStatusResponse {
            order_id,
            status: OrderStatus::Cancelled,
            paid_at: None,
        })
    }

    /// Load one order with its items
    pub async fn load_order(&self, order_id: Uuid) -> AppResult<Order> {
        let row = self.order_row(order_id).await?;
        let mut orders = self.attach_items(vec![row]).await?;
        orders
            .pop()
            .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    /// Attach items to a batch of order rows, keeping their order
    pub async fn attach_items(&self, rows: Vec<OrderRow>) -> AppResult<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let items = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT oi.id, oi.order_id, oi.product_id, p.title AS product_title, oi.patronista_id,
                   oi.unit_price, oi.include_training, oi.training_price, oi.subtotal
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = ANY($1)
            ORDER BY p.title
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;

        let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item.into());
        }

        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }

    async fn order_row(&self, order_id: Uuid) -> AppResult<OrderRow> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders o WHERE o.id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<OrderRow> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders o WHERE o.id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    async fn request_payment_link(
        &self,
        order_id: Uuid,
        reference: &str,
        description: &str,
        amount_in_cents: i64,
    ) -> AppResult<PaymentLink> {
        let request = PaymentLinkRequest {
            name: format!("Pedido {}", reference),
            description: description.to_string(),
            single_use: true,
            collect_shipping: false,
            currency: self.config.wompi.currency.clone(),
            amount_in_cents,
            redirect_url: format!(
                "{}/{}",
                self.config.wompi.redirect_url.trim_end_matches('/'),
                order_id
            ),
            sku: reference.to_string(),
        };
        self.wompi.create_payment_link(&request).await
    }

    async fn store_payment_link(conn: &mut PgConnection, order_id: Uuid, link: &PaymentLink) -> AppResult<()> {
        sqlx::query(
            "UPDATE orders SET payment_link_id = $2, checkout_url = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(order_id)
        .bind(&link.id)
        .bind(link.checkout_url())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    fn with_checkout(&self, order: Order) -> AppResult<CheckoutOrder> {
        let amount_in_cents = to_amount_in_cents(order.total)?;
        let integrity_signature = integrity_signature(
            &order.reference,
            amount_in_cents,
            &order.currency,
            &self.config.wompi.integrity_secret,
        );
        Ok(CheckoutOrder {
            order,
            amount_in_cents,
            integrity_signature,
        })
    }
}

/// Whether a fetched transaction pays this order. Payment-link transactions
/// carry a gateway-generated reference, so the link id is checked first.
fn transaction_matches_order(
    transaction: &WompiTransaction,
    reference: &str,
    payment_link_id: Option<&str>,
) -> bool {
    let same_link = matches!(
        (transaction.payment_link_id.as_deref(), payment_link_id),
        (Some(a), Some(b)) if a == b
    );
    same_link || transaction.reference.as_deref() == Some(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::WompiTransactionStatus;

    fn transaction(reference: Option<&str>, link: Option<&str>) -> WompiTransaction {
        WompiTransaction {
            id: "12345-1700000000-00001".to_string(),
            status: WompiTransactionStatus::Approved,
            reference: reference.map(str::to_string),
            amount_in_cents: 4_500_000,
            currency: Some("COP".to_string()),
            payment_link_id: link.map(str::to_string),
            payment_method_type: Some("CARD".to_string()),
        }
    }

    #[test]
    fn test_link_transaction_matches_by_link_id() {
        let tx = transaction(Some("test_abc_1700000000_x1"), Some("test_LINK1"));
        assert!(transaction_matches_order(&tx, "PAT-1A2B3C4D5E6F", Some("test_LINK1")));
        assert!(!transaction_matches_order(&tx, "PAT-1A2B3C4D5E6F", Some("test_LINK2")));
        assert!(!transaction_matches_order(&tx, "PAT-1A2B3C4D5E6F", None));
    }

    #[test]
    fn test_transaction_matches_by_reference() {
        let tx = transaction(Some("PAT-1A2B3C4D5E6F"), None);
        assert!(transaction_matches_order(&tx, "PAT-1A2B3C4D5E6F", Some("test_LINK1")));
        assert!(!transaction_matches_order(&tx, "PAT-FFFFFFFFFFFF", Some("test_LINK1")));
        assert!(!transaction_matches_order(&transaction(None, None), "PAT-1A2B3C4D5E6F", None));
    }

    fn product(patronista_id: Uuid, price: i64, training: Option<i64>) -> CheckoutProduct {
        CheckoutProduct {
            id: Uuid::new_v4(),
            patronista_id,
            title: "Pantalón palazzo".to_string(),
            price: Decimal::new(price, 0),
            training_available: training.is_some(),
            training_price: training.map(|t| Decimal::new(t, 0)),
        }
    }

    fn catalog(products: Vec<CheckoutProduct>) -> HashMap<Uuid, CheckoutProduct> {
        products.into_iter().map(|p| (p.id, p)).collect()
    }

    #[test]
    fn test_cart_is_priced_from_database() {
        let seller = Uuid::new_v4();
        let a = product(seller, 45_000, Some(60_000));
        let b = product(seller, 30_000, None);
        let items = vec![
            CartItemInput { product_id: a.id, include_training: true },
            CartItemInput { product_id: b.id, include_training: false },
        ];
        let products = catalog(vec![a, b]);

        let lines = price_cart(Uuid::new_v4(), &items, &products).unwrap();
        assert_eq!(cart_total(&lines).unwrap(), Decimal::new(135_000, 0));
    }

    #[test]
    fn test_unknown_product_is_rejected() {
        let items = vec![CartItemInput { product_id: Uuid::new_v4(), include_training: false }];
        assert!(price_cart(Uuid::new_v4(), &items, &HashMap::new()).is_err());
    }

    #[test]
    fn test_own_product_is_rejected() {
        let seller = Uuid::new_v4();
        let p = product(seller, 10_000, None);
        let items = vec![CartItemInput { product_id: p.id, include_training: false }];
        assert!(price_cart(seller, &items, &catalog(vec![p])).is_err());
    }

    #[test]
    fn test_training_must_be_offered() {
        let p = product(Uuid::new_v4(), 10_000, None);
        let items = vec![CartItemInput { product_id: p.id, include_training: true }];
        let err = price_cart(Uuid::new_v4(), &items, &catalog(vec![p])).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "include_training"));
    }

    #[test]
    fn test_item_description_is_truncated() {
        let long = "x".repeat(300);
        let description = describe_items(&[long.as_str()]);
        assert_eq!(description.chars().count(), 200);
        assert!(description.ends_with("..."));
        assert_eq!(describe_items(&["Blusa", "Falda"]), "Blusa, Falda");
    }

    #[test]
    fn test_cart_input_defaults_training_off() {
        let input: CreateOrderInput =
            serde_json::from_str(r#"{"items":[{"product_id":"6f1c7f3e-2a7b-4d2e-9a53-0c3b3f1e9a10"}]}"#)
                .unwrap();
        assert!(!input.items[0].include_training);
    }
}
