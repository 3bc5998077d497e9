//! Catalog models: categories, patterns and their files

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Sewing difficulty of a pattern
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Basico,
    Intermedio,
    Avanzado,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Basico => "basico",
            Difficulty::Intermedio => "intermedio",
            Difficulty::Avanzado => "avanzado",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Basico => write!(f, "Básico"),
            Difficulty::Intermedio => write!(f, "Intermedio"),
            Difficulty::Avanzado => write!(f, "Avanzado"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basico" => Ok(Difficulty::Basico),
            "intermedio" => Ok(Difficulty::Intermedio),
            "avanzado" => Ok(Difficulty::Avanzado),
            other => Err(DomainError::UnknownVariant {
                kind: "difficulty",
                value: other.to_string(),
            }),
        }
    }
}

/// A product category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A digital sewing pattern listed by a patronista
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub patronista_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub difficulty: Difficulty,
    pub sizes: Option<String>,
    pub has_thumbnail: bool,
    pub training_available: bool,
    pub training_price: Option<Decimal>,
    pub training_description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata of a downloadable pattern file; the storage path stays server-side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductFileInfo {
    pub id: Uuid,
    pub product_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Build a URL slug from a category name: lowercase ASCII, words joined by '-'
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        let mapped = match c {
            'á' | 'à' | 'ä' | 'â' | 'Á' | 'À' | 'Ä' | 'Â' => Some('a'),
            'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => Some('e'),
            'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => Some('i'),
            'ó' | 'ò' | 'ö' | 'ô' | 'Ó' | 'Ò' | 'Ö' | 'Ô' => Some('o'),
            'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => Some('u'),
            'ñ' | 'Ñ' => Some('n'),
            c if c.is_ascii_alphanumeric() => Some(c.to_ascii_lowercase()),
            _ => None,
        };

        match mapped {
            Some(c) => {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c);
            }
            None => pending_dash = true,
        }
    }

    slug
}
