//! Product management for patronistas: listings, pattern files and thumbnails

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    sanitize_file_name, validate_image_content_type, validate_pattern_content_type,
    validate_price, validate_training_offer, Difficulty, PaginatedResponse, Pagination, Product,
    ProductFileInfo,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::storage::FileStorage;

/// Product service
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
    storage: FileStorage,
}

/// Product row from database
#[derive(Debug, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub patronista_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub difficulty: String,
    pub sizes: Option<String>,
    pub thumbnail_path: Option<String>,
    pub training_available: bool,
    pub training_price: Option<Decimal>,
    pub training_description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    pub fn into_product(self) -> AppResult<Product> {
        Ok(Product {
            id: self.id,
            patronista_id: self.patronista_id,
            category_id: self.category_id,
            title: self.title,
            description: self.description,
            price: self.price,
            difficulty: self.difficulty.parse()?,
            sizes: self.sizes,
            has_thumbnail: self.thumbnail_path.is_some(),
            training_available: self.training_available,
            training_price: self.training_price,
            training_description: self.training_description,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Columns of `ProductRow`, qualified with the `p` alias
pub(crate) const PRODUCT_COLUMNS: &str = "p.id, p.patronista_id, p.category_id, p.title, \
     p.description, p.price, p.difficulty, p.sizes, p.thumbnail_path, p.training_available, \
     p.training_price, p.training_description, p.is_active, p.created_at, p.updated_at";

/// Pattern file metadata row
#[derive(Debug, sqlx::FromRow)]
pub struct ProductFileRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl From<ProductFileRow> for ProductFileInfo {
    fn from(row: ProductFileRow) -> Self {
        ProductFileInfo {
            id: row.id,
            product_id: row.product_id,
            file_name: row.file_name,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            created_at: row.created_at,
        }
    }
}

/// A product together with its downloadable files
#[derive(Debug, Serialize)]
pub struct ProductWithFiles {
    #[serde(flatten)]
    pub product: Product,
    pub files: Vec<ProductFileInfo>,
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 3, max = 200, message = "Title must be 3-200 characters"))]
    pub title: String,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[validate(length(max = 200, message = "Sizes must be at most 200 characters"))]
    pub sizes: Option<String>,
    #[serde(default)]
    pub training_available: bool,
    pub training_price: Option<Decimal>,
    pub training_description: Option<String>,
}

/// Input for updating a product; absent fields keep their value
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 3, max = 200, message = "Title must be 3-200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub difficulty: Option<Difficulty>,
    #[validate(length(max = 200, message = "Sizes must be at most 200 characters"))]
    pub sizes: Option<String>,
    pub training_available: Option<bool>,
    pub training_price: Option<Decimal>,
    pub training_description: Option<String>,
}

/// An uploaded file taken from a multipart body
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// What happened to a deleted product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The product had orders and was only hidden
    Deactivated,
    Deleted,
}

fn price_error(field: &str, msg: &'static str) -> AppError {
    AppError::validation(field, msg, "Precio inválido")
}

fn training_error(msg: &'static str) -> AppError {
    AppError::validation(
        "training_price",
        msg,
        "El precio de la capacitación es obligatorio y debe ser válido",
    )
}

impl ProductService {
    /// Create a new ProductService instance
    pub fn new(db: PgPool, storage: FileStorage) -> Self {
        Self { db, storage }
    }

    /// List the caller's products; admins see every product
    pub async fn list_products(
        &self,
        user: &AuthUser,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Product>> {
        let owner = if user.is_admin() { None } else { Some(user.user_id) };

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE ($1::uuid IS NULL OR patronista_id = $1)",
        )
        .bind(owner)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {}
            FROM products p
            WHERE ($1::uuid IS NULL OR p.patronista_id = $1)
            ORDER BY p.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(owner)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let products = rows
            .into_iter()
            .map(ProductRow::into_product)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(products, pagination, total.max(0) as u64))
    }

    /// Create a product owned by the caller
    pub async fn create_product(
        &self,
        user: &AuthUser,
        input: CreateProductInput,
    ) -> AppResult<Product> {
        input.validate()?;
        validate_price(input.price).map_err(|msg| price_error("price", msg))?;
        validate_training_offer(input.training_available, input.training_price)
            .map_err(training_error)?;
        if let Some(category_id) = input.category_id {
            self.ensure_category_exists(category_id).await?;
        }

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products AS p (
                patronista_id, category_id, title, description, price, difficulty, sizes,
                training_available, training_price, training_description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(user.user_id)
        .bind(input.category_id)
        .bind(input.title.trim())
        .bind(input.description.trim())
        .bind(input.price)
        .bind(input.difficulty.as_str())
        .bind(&input.sizes)
        .bind(input.training_available)
        .bind(input.training_price)
        .bind(&input.training_description)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(product_id = %row.id, patronista_id = %user.user_id, "Product created");
        row.into_product()
    }

    /// Get a product with its files, for its owner or an admin
    pub async fn get_product(&self, user: &AuthUser, product_id: Uuid) -> AppResult<ProductWithFiles> {
        let product = self.owned_product(user, product_id).await?.into_product()?;
        let files = self.list_files(product_id).await?;
        Ok(ProductWithFiles { product, files })
    }

    /// Update a product
    pub async fn update_product(
        &self,
        user: &AuthUser,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        input.validate()?;
        let current = self.owned_product(user, product_id).await?;

        if let Some(price) = input.price {
            validate_price(price).map_err(|msg| price_error("price", msg))?;
        }

        // Validate the training offer as it will look after the update
        let training_available = input.training_available.unwrap_or(current.training_available);
        let training_price = input.training_price.or(current.training_price);
        validate_training_offer(training_available, training_price).map_err(training_error)?;

        if let Some(category_id) = input.category_id {
            self.ensure_category_exists(category_id).await?;
        }

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products AS p SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                category_id = COALESCE($5, category_id),
                difficulty = COALESCE($6, difficulty),
                sizes = COALESCE($7, sizes),
                training_available = $8,
                training_price = $9,
                training_description = COALESCE($10, training_description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(input.title.as_deref().map(str::trim))
        .bind(input.description.as_deref().map(str::trim))
        .bind(input.price)
        .bind(input.category_id)
        .bind(input.difficulty.map(|d| d.as_str()))
        .bind(&input.sizes)
        .bind(training_available)
        .bind(training_price)
        .bind(&input.training_description)
        .fetch_one(&self.db)
        .await?;

        row.into_product()
    }

    /// Delete a product. Products that were ever ordered are deactivated
    /// instead so order history and buyer downloads keep working.
    pub async fn delete_product(&self, user: &AuthUser, product_id: Uuid) -> AppResult<DeleteOutcome> {
        let product = self.owned_product(user, product_id).await?;

        let ordered = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM order_items WHERE product_id = $1)",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        if ordered {
            sqlx::query("UPDATE products SET is_active = false, updated_at = NOW() WHERE id = $1")
                .bind(product_id)
                .execute(&self.db)
                .await?;
            tracing::info!(product_id = %product_id, "Product deactivated");
            return Ok(DeleteOutcome::Deactivated);
        }

        let mut paths = sqlx::query_scalar::<_, String>(
            "SELECT storage_path FROM product_files WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;
        paths.extend(product.thumbnail_path);

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&self.db)
            .await?;

        for path in paths {
            if let Err(e) = self.storage.delete(&path).await {
                tracing::warn!(path = %path, error = %e, "Failed to remove product file");
            }
        }

        tracing::info!(product_id = %product_id, "Product deleted");
        Ok(DeleteOutcome::Deleted)
    }

    /// Attach pattern files to a product
    pub async fn add_files(
        &self,
        user: &AuthUser,
        product_id: Uuid,
        files: Vec<UploadedFile>,
    ) -> AppResult<Vec<ProductFileInfo>> {
        self.owned_product(user, product_id).await?;

        if files.is_empty() {
            return Err(AppError::validation(
                "file",
                "At least one file is required",
                "Debes adjuntar al menos un archivo",
            ));
        }

        // Check everything before writing anything
        for file in &files {
            validate_pattern_content_type(&file.content_type).map_err(|msg| {
                AppError::validation("file", msg, "Tipo de archivo no permitido")
            })?;
            self.storage.check_size(file.bytes.len())?;
        }

        let folder = format!("products/{}", product_id);
        let mut stored = Vec::with_capacity(files.len());

        for file in files {
            let file_name = sanitize_file_name(&file.file_name);
            let path = self.storage.save(&folder, &file_name, &file.bytes).await?;

            let inserted = sqlx::query_as::<_, ProductFileRow>(
                r#"
                INSERT INTO product_files (product_id, file_name, content_type, size_bytes, storage_path)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, product_id, file_name, content_type, size_bytes, created_at
                "#,
            )
            .bind(product_id)
            .bind(&file_name)
            .bind(&file.content_type)
            .bind(file.bytes.len() as i64)
            .bind(&path)
            .fetch_one(&self.db)
            .await;

            match inserted {
                Ok(row) => stored.push(row.into()),
                Err(e) => {
                    let _ = self.storage.delete(&path).await;
                    return Err(e.into());
                }
            }
        }

        tracing::info!(product_id = %product_id, count = stored.len(), "Pattern files uploaded");
        Ok(stored)
    }

    /// Remove one pattern file
    pub async fn delete_file(&self, user: &AuthUser, product_id: Uuid, file_id: Uuid) -> AppResult<()> {
        self.owned_product(user, product_id).await?;

        let path = sqlx::query_scalar::<_, String>(
            "DELETE FROM product_files WHERE id = $1 AND product_id = $2 RETURNING storage_path",
        )
        .bind(file_id)
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("File".to_string()))?;

        self.storage.delete(&path).await
    }

    /// Replace the product thumbnail
    pub async fn set_thumbnail(
        &self,
        user: &AuthUser,
        product_id: Uuid,
        image: UploadedFile,
    ) -> AppResult<Product> {
        let current = self.owned_product(user, product_id).await?;

        validate_image_content_type(&image.content_type)
            .map_err(|msg| AppError::validation("file", msg, "Tipo de imagen no permitido"))?;

        let folder = format!("thumbnails/{}", product_id);
        let path = self.storage.save(&folder, &image.file_name, &image.bytes).await?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products AS p
            SET thumbnail_path = $2, thumbnail_content_type = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(&path)
        .bind(&image.content_type)
        .fetch_one(&self.db)
        .await?;

        if let Some(old) = current.thumbnail_path {
            if let Err(e) = self.storage.delete(&old).await {
                tracing::warn!(path = %old, error = %e, "Failed to remove old thumbnail");
            }
        }

        row.into_product()
    }

    /// Activate or deactivate any product (admin)
    pub async fn set_active(&self, product_id: Uuid, is_active: bool) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products AS p SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        tracing::info!(product_id = %product_id, is_active, "Product status changed");
        row.into_product()
    }

    /// File metadata of a product
    pub async fn list_files(&self, product_id: Uuid) -> AppResult<Vec<ProductFileInfo>> {
        let rows = sqlx::query_as::<_, ProductFileRow>(
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

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Load a product the caller may manage
    async fn owned_product(&self, user: &AuthUser, product_id: Uuid) -> AppResult<ProductRow> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products p WHERE p.id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        if !user.owns_or_admin(row.patronista_id) {
            return Err(AppError::InsufficientPermissions);
        }
        Ok(row)
    }

    async fn ensure_category_exists(&self, category_id: Uuid) -> AppResult<()> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
                .bind(category_id)
                .fetch_one(&self.db)
                .await?;
        if exists {
            Ok(())
        } else {
            Err(AppError::validation(
                "category_id",
                "Category does not exist",
                "La categoría no existe",
            ))
        }
    }
}
