//! Category administration

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{slugify, Category};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Category service
#[derive(Clone)]
pub struct CategoryService {
    db: PgPool,
}

/// Category row from database
#[derive(Debug, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

/// Input for creating or renaming a category
#[derive(Debug, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
}

impl CategoryInput {
    fn slug(&self) -> AppResult<String> {
        let slug = slugify(&self.name);
        if slug.is_empty() {
            return Err(AppError::validation(
                "name",
                "Name must contain letters or digits",
                "El nombre debe contener letras o números",
            ));
        }
        Ok(slug)
    }
}

impl CategoryService {
    /// Create a new CategoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, slug, description, created_at FROM categories ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn create_category(&self, input: CategoryInput) -> AppResult<Category> {
        input.validate()?;
        let slug = input.slug()?;

        let row = sqlx::query_as::<_, CategoryRow>(
            r#"
            INSERT INTO categories (name, slug, description)
            VALUES ($1, $2, $3)
            RETURNING id, name, slug, description, created_at
            "#,
        )
        .bind(input.name.trim())
        .bind(&slug)
        .bind(&input.description)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_unique_violation(e, "name"))?;

        tracing::info!(category_id = %row.id, slug = %row.slug, "Category created");
        Ok(row.into())
    }

    pub async fn update_category(&self, category_id: Uuid, input: CategoryInput) -> AppResult<Category> {
        input.validate()?;
        let slug = input.slug()?;

        let row = sqlx::query_as::<_, CategoryRow>(
            r#"
            UPDATE categories
            SET name = $2, slug = $3, description = $4
            WHERE id = $1
            RETURNING id, name, slug, description, created_at
            "#,
        )
        .bind(category_id)
        .bind(input.name.trim())
        .bind(&slug)
        .bind(&input.description)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::from_unique_violation(e, "name"))?
        .ok_or_else(|| AppError::NotFound("Category".to_string()))?;

        Ok(row.into())
    }

    /// Delete a category that no product uses
    pub async fn delete_category(&self, category_id: Uuid) -> AppResult<()> {
        let in_use = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE category_id = $1)",
        )
        .bind(category_id)
        .fetch_one(&self.db)
        .await?;

        if in_use {
            return Err(AppError::Conflict {
                resource: "category".to_string(),
                message: "Category is still used by products".to_string(),
                message_es: "La categoría todavía tiene productos".to_string(),
            });
        }

        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Category".to_string()));
        }

        tracing::info!(category_id = %category_id, "Category deleted");
        Ok(())
    }
}
