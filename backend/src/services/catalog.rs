//! Public catalog: browsing active patterns, categories and patronista profiles

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    CatalogSort, Category, Difficulty, PaginatedResponse, Pagination, PatronistaProfile, Product,
    ProductFileInfo,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::category::CategoryRow;
use crate::services::product::{ProductFileRow, ProductRow, PRODUCT_COLUMNS};
use crate::services::storage::FileStorage;

/// Catalog service
#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
    storage: FileStorage,
}

/// Catalog listing filters, taken from the query string
#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    /// Category slug
    pub category: Option<String>,
    pub patronista_id: Option<Uuid>,
    pub difficulty: Option<Difficulty>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub with_training: Option<bool>,
    pub sort: Option<CatalogSort>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl CatalogQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_query(self.page, self.per_page)
    }

    /// `%term%` pattern for ILIKE, with LIKE wildcards escaped
    fn search_pattern(&self) -> Option<String> {
        let term = self.search.as_deref()?.trim();
        if term.is_empty() {
            return None;
        }
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Some(format!("%{}%", escaped))
    }
}

/// A product as shown in the catalog
#[derive(Debug, Serialize)]
pub struct CatalogProduct {
    #[serde(flatten)]
    pub product: Product,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    pub patronista_name: String,
}

/// Catalog product with its file list
#[derive(Debug, Serialize)]
pub struct CatalogProductDetail {
    #[serde(flatten)]
    pub product: CatalogProduct,
    pub files: Vec<ProductFileInfo>,
}

/// Category with the number of active products in it
#[derive(Debug, Serialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: i64,
}

/// Public patronista page
#[derive(Debug, Serialize)]
pub struct PatronistaPage {
    pub profile: PatronistaProfile,
    pub products: Vec<CatalogProduct>,
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogRow {
    #[sqlx(flatten)]
    product: ProductRow,
    category_name: Option<String>,
    category_slug: Option<String>,
    patronista_name: String,
}

impl CatalogRow {
    fn into_catalog_product(self) -> AppResult<CatalogProduct> {
        Ok(CatalogProduct {
            product: self.product.into_product()?,
            category_name: self.category_name,
            category_slug: self.category_slug,
            patronista_name: self.patronista_name,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryCountRow {
    #[sqlx(flatten)]
    category: CategoryRow,
    product_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PatronistaRow {
    id: Uuid,
    full_name: String,
    bio: Option<String>,
    created_at: DateTime<Utc>,
}

/// Thumbnail bytes and their content type
pub struct Thumbnail {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Joins and visibility rules shared by every catalog query
const CATALOG_FROM: &str = r#"
    FROM products p
    JOIN users u ON u.id = p.patronista_id
    LEFT JOIN categories c ON c.id = p.category_id
    WHERE p.is_active = true AND u.is_active = true
"#;

const CATALOG_FILTERS: &str = r#"
    AND ($1::text IS NULL OR p.title ILIKE $1 OR p.description ILIKE $1)
    AND ($2::uuid IS NULL OR p.category_id = $2)
    AND ($3::text IS NULL OR c.slug = $3)
    AND ($4::uuid IS NULL OR p.patronista_id = $4)
    AND ($5::text IS NULL OR p.difficulty = $5)
    AND ($6::numeric IS NULL OR p.price >= $6)
    AND ($7::numeric IS NULL OR p.price <= $7)
    AND ($8::boolean IS NULL OR p.training_available = $8)
"#;

impl CatalogService {
    /// Create a new CatalogService instance
    pub fn new(db: PgPool, storage: FileStorage) -> Self {
        Self { db, storage }
    }

    /// Search the catalog
    pub async fn list_products(&self, query: &CatalogQuery) -> AppResult<PaginatedResponse<CatalogProduct>> {
        let pagination = query.pagination();
        let search = query.search_pattern();
        let difficulty = query.difficulty.map(|d| d.as_str());
        let sort = query.sort.unwrap_or_default();

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) {} {}",
            CATALOG_FROM, CATALOG_FILTERS
        ))
        .bind(&search)
        .bind(query.category_id)
        .bind(&query.category)
        .bind(query.patronista_id)
        .bind(difficulty)
        .bind(query.min_price)
        .bind(query.max_price)
        .bind(query.with_training)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, CatalogRow>(&format!(
            r#"
            SELECT {}, c.name AS category_name, c.slug AS category_slug,
                   u.full_name AS patronista_name
            {} {}
            ORDER BY {}
            LIMIT $9 OFFSET $10
            "#,
            PRODUCT_COLUMNS,
            CATALOG_FROM,
            CATALOG_FILTERS,
            sort.order_by()
        ))
        .bind(&search)
        .bind(query.category_id)
        .bind(&query.category)
        .bind(query.patronista_id)
        .bind(difficulty)
        .bind(query.min_price)
        .bind(query.max_price)
        .bind(query.with_training)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let products = rows
            .into_iter()
            .map(CatalogRow::into_catalog_product)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(products, pagination, total.max(0) as u64))
    }

    /// Product detail with file names and sizes
    pub async fn get_product(&self, product_id: Uuid) -> AppResult<CatalogProductDetail> {
        let row = sqlx::query_as::<_, CatalogRow>(&format!(
            r#"
            SELECT {}, c.name AS category_name, c.slug AS category_slug,
                   u.full_name AS patronista_name
            {}
            AND p.id = $1
            "#,
            PRODUCT_COLUMNS, CATALOG_FROM
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let files = sqlx::query_as::<_, ProductFileRow>(
            r#"
            SELECT id, product_id, file_name, content_type, size_bytes, created_at
            FROM product_files
            WHERE product_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        Ok(CatalogProductDetail {
            product: row.into_catalog_product()?,
            files: files.into_iter().map(Into::into).collect(),
        })
    }

    /// Thumbnail image of an active product
    pub async fn get_thumbnail(&self, product_id: Uuid) -> AppResult<Thumbnail> {
        let (path, content_type) = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT thumbnail_path, thumbnail_content_type FROM products WHERE id = $1 AND is_active = true",
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let path = path.ok_or_else(|| AppError::NotFound("Thumbnail".to_string()))?;
        let bytes = self.storage.read(&path).await?;

        Ok(Thumbnail {
            content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            bytes,
        })
    }

    /// All categories with their active product counts
    pub async fn list_categories(&self) -> AppResult<Vec<CategoryWithCount>> {
        let rows = sqlx::query_as::<_, CategoryCountRow>(
            r#"
            SELECT c.id, c.name, c.slug, c.description, c.created_at,
                   COUNT(p.id) FILTER (WHERE p.is_active AND u.is_active) AS product_count
            FROM categories c
            LEFT JOIN products p ON p.category_id = c.id
            LEFT JOIN users u ON u.id = p.patronista_id
            GROUP BY c.id
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryWithCount {
                category: row.category.into(),
                product_count: row.product_count,
            })
            .collect())
    }

    /// Public profile of an active patronista and their active products
    pub async fn get_patronista(&self, patronista_id: Uuid) -> AppResult<PatronistaPage> {
        let patronista = sqlx::query_as::<_, PatronistaRow>(
            r#"
            SELECT id, full_name, bio, created_at
            FROM users
            WHERE id = $1 AND role = 'patronista' AND is_active = true
            "#,
        )
        .bind(patronista_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Patronista".to_string()))?;

        let rows = sqlx::query_as::<_, CatalogRow>(&format!(
            r#"
            SELECT {}, c.name AS category_name, c.slug AS category_slug,
                   u.full_name AS patronista_name
            {}
            AND p.patronista_id = $1
            ORDER BY p.created_at DESC
            "#,
            PRODUCT_COLUMNS, CATALOG_FROM
        ))
        .bind(patronista_id)
        .fetch_all(&self.db)
        .await?;

        let products = rows
            .into_iter()
            .map(CatalogRow::into_catalog_product)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PatronistaPage {
            profile: PatronistaProfile {
                id: patronista.id,
                full_name: patronista.full_name,
                bio: patronista.bio,
                product_count: products.len() as i64,
                member_since: patronista.created_at,
            },
            products,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(search: Option<&str>) -> CatalogQuery {
        CatalogQuery {
            search: search.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_search_pattern_escapes_wildcards() {
        assert_eq!(query(Some("vestido")).search_pattern().as_deref(), Some("%vestido%"));
        assert_eq!(query(Some("100%_lino")).search_pattern().as_deref(), Some("%100\\%\\_lino%"));
        assert_eq!(query(Some("   ")).search_pattern(), None);
        assert_eq!(query(None).search_pattern(), None);
    }

    #[test]
    fn test_default_pagination() {
        let pagination = query(None).pagination();
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.per_page, 12);

        let q = CatalogQuery {
            page: Some(0),
            per_page: Some(500),
            ..Default::default()
        };
        assert_eq!(q.pagination().page, 1);
        assert_eq!(q.pagination().per_page, 100);
    }

    #[test]
    fn test_query_string_parsing() {
        let q: CatalogQuery = serde_json::from_value(serde_json::json!({
            "difficulty": "avanzado",
            "sort": "price_desc",
            "min_price": "10000",
            "with_training": true
        }))
        .unwrap();
        assert_eq!(q.difficulty, Some(Difficulty::Avanzado));
        assert_eq!(q.sort, Some(CatalogSort::PriceDesc));
        assert_eq!(q.min_price, Some(Decimal::new(10_000, 0)));
        assert_eq!(q.with_training, Some(true));
    }
}
