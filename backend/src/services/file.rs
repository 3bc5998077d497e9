//! Protected pattern downloads and signed download links

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use shared::{ProductFileInfo, UserRole};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::product::ProductFileRow;
use crate::services::storage::FileStorage;

type HmacSha256 = Hmac<Sha256>;

/// File download service
#[derive(Clone)]
pub struct FileService {
    db: PgPool,
    storage: FileStorage,
    config: Arc<Config>,
}

/// A file ready to be sent to the client
#[derive(Debug)]
pub struct FileDownload {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub file: tokio::fs::File,
}

/// A time-limited download URL
#[derive(Debug, Serialize)]
pub struct SignedLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// A file from a purchased product
#[derive(Debug, Serialize)]
pub struct PurchasedFile {
    #[serde(flatten)]
    pub file: ProductFileInfo,
    pub product_title: String,
    pub order_id: Uuid,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Fields bound into a download token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadClaims {
    pub file_id: Uuid,
    pub user_id: Uuid,
    pub expires: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct StoredFile {
    file_name: String,
    content_type: String,
    storage_path: String,
    product_id: Uuid,
    patronista_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct PurchasedFileRow {
    #[sqlx(flatten)]
    file: ProductFileRow,
    product_title: String,
    order_id: Uuid,
    paid_at: Option<DateTime<Utc>>,
}

fn mac(secret: &str) -> AppResult<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Configuration(format!("Invalid download link secret: {}", e)))
}

/// Sign `file_id:user_id:expires` into `<payload>.<signature>`, both URL-safe base64
pub fn sign_download_token(secret: &str, claims: &DownloadClaims) -> AppResult<String> {
    let payload = format!("{}:{}:{}", claims.file_id, claims.user_id, claims.expires);
    let mut mac = mac(secret)?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// Check a download token's signature and expiry
pub fn verify_download_token(secret: &str, token: &str, now: DateTime<Utc>) -> AppResult<DownloadClaims> {
    let invalid = || AppError::Forbidden {
        message: "Invalid download link".to_string(),
        message_es: "El enlace de descarga no es válido".to_string(),
    };

    let (payload_b64, signature_b64) = token.split_once('.').ok_or_else(invalid)?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| invalid())?;
    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| invalid())?;

    let mut mac = mac(secret)?;
    mac.update(&payload);
    mac.verify_slice(&signature).map_err(|_| invalid())?;

    let payload = String::from_utf8(payload).map_err(|_| invalid())?;
    let mut parts = payload.splitn(3, ':');
    let (Some(file_id), Some(user_id), Some(expires)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };

    let claims = DownloadClaims {
        file_id: file_id.parse().map_err(|_| invalid())?,
        user_id: user_id.parse().map_err(|_| invalid())?,
        expires: expires.parse().map_err(|_| invalid())?,
    };

    if claims.expires <= now.timestamp() {
        return Err(AppError::Forbidden {
            message: "Download link has expired".to_string(),
            message_es: "El enlace de descarga expiró".to_string(),
        });
    }

    Ok(claims)
}

impl FileService {
    /// Create a new FileService instance
    pub fn new(db: PgPool, storage: FileStorage, config: Arc<Config>) -> Self {
        Self { db, storage, config }
    }

    /// Download a file after checking the caller may have it
    pub async fn download(&self, user: &AuthUser, file_id: Uuid) -> AppResult<FileDownload> {
        let file = self.authorized_file(user, file_id).await?;
        self.open(file).await
    }

    /// Issue a signed link for a file the caller may download
    pub async fn create_signed_link(&self, user: &AuthUser, file_id: Uuid) -> AppResult<SignedLink> {
        self.authorized_file(user, file_id).await?;

        let expires_at = Utc::now() + Duration::seconds(self.config.downloads.link_ttl_seconds);
        let token = sign_download_token(
            &self.config.downloads.link_secret,
            &DownloadClaims {
                file_id,
                user_id: user.user_id,
                expires: expires_at.timestamp(),
            },
        )?;

        let url = format!(
            "{}/api/v1/files/signed/{}",
            self.config.server.public_url.trim_end_matches('/'),
            token
        );

        Ok(SignedLink { url, expires_at })
    }

    /// Download through a signed link
    pub async fn download_signed(&self, token: &str) -> AppResult<FileDownload> {
        let claims = verify_download_token(&self.config.downloads.link_secret, token, Utc::now())?;
        let file = self.stored_file(claims.file_id).await?;
        tracing::info!(file_id = %claims.file_id, user_id = %claims.user_id, "Signed download");
        self.open(file).await
    }

    /// Every file of every product the caller has paid for
    pub async fn purchased_files(&self, user: &AuthUser) -> AppResult<Vec<PurchasedFile>> {
        let rows = sqlx::query_as::<_, PurchasedFileRow>(
            r#"
            SELECT DISTINCT ON (f.id)
                   f.id, f.product_id, f.file_name, f.content_type, f.size_bytes, f.created_at,
                   p.title AS product_title, o.id AS order_id, o.paid_at
            FROM product_files f
            JOIN products p ON p.id = f.product_id
            JOIN order_items oi ON oi.product_id = f.product_id
            JOIN orders o ON o.id = oi.order_id
            WHERE o.cliente_id = $1 AND o.status = 'paid'
            ORDER BY f.id, o.paid_at
            "#,
        )
        .bind(user.user_id)
        .fetch_all(&self.db)
        .await?;

        let mut files: Vec<PurchasedFile> = rows
            .into_iter()
            .map(|row| PurchasedFile {
                file: row.file.into(),
                product_title: row.product_title,
                order_id: row.order_id,
                paid_at: row.paid_at,
            })
            .collect();
        files.sort_by(|a, b| {
            a.product_title
                .cmp(&b.product_title)
                .then_with(|| a.file.file_name.cmp(&b.file.file_name))
        });

        Ok(files)
    }

    /// Load a file and apply the download gate: admin, the owning patronista,
    /// or a cliente with a paid order containing the product
    async fn authorized_file(&self, user: &AuthUser, file_id: Uuid) -> AppResult<StoredFile> {
        let file = self.stored_file(file_id).await?;

        if user.is_admin() || file.patronista_id == user.user_id {
            return Ok(file);
        }

        if user.role == UserRole::Cliente {
            let paid = sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM order_items oi
                    JOIN orders o ON o.id = oi.order_id
                    WHERE oi.product_id = $1 AND o.cliente_id = $2 AND o.status = 'paid'
                )
                "#,
            )
            .bind(file.product_id)
            .bind(user.user_id)
            .fetch_one(&self.db)
            .await?;

            if paid {
                return Ok(file);
            }
        }

        tracing::warn!(file_id = %file_id, user_id = %user.user_id, "Download denied");
        Err(AppError::Forbidden {
            message: "You have not purchased this pattern".to_string(),
            message_es: "No has comprado este patrón".to_string(),
        })
    }

    async fn stored_file(&self, file_id: Uuid) -> AppResult<StoredFile> {
        sqlx::query_as::<_, StoredFile>(
            r#"
            SELECT f.file_name, f.content_type, f.storage_path, f.product_id, p.patronista_id
            FROM product_files f
            JOIN products p ON p.id = f.product_id
            WHERE f.id = $1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("File".to_string()))
    }

    async fn open(&self, file: StoredFile) -> AppResult<FileDownload> {
        let (handle, size) = self.storage.open(&file.storage_path).await?;
        Ok(FileDownload {
            file_name: file.file_name,
            content_type: file.content_type,
            size,
            file: handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-link-secret";

    fn claims(expires: i64) -> DownloadClaims {
        DownloadClaims {
            file_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            expires,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let now = Utc::now();
        let claims = claims(now.timestamp() + 600);
        let token = sign_download_token(SECRET, &claims).unwrap();

        assert!(!token.contains('+') && !token.contains('/') && !token.contains('='));
        assert_eq!(verify_download_token(SECRET, &token, now).unwrap(), claims);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let now = Utc::now();
        let token = sign_download_token(SECRET, &claims(now.timestamp() - 1)).unwrap();
        assert!(matches!(
            verify_download_token(SECRET, &token, now),
            Err(AppError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let now = Utc::now();
        let token = sign_download_token("another-secret", &claims(now.timestamp() + 600)).unwrap();
        assert!(verify_download_token(SECRET, &token, now).is_err());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let now = Utc::now();
        let token = sign_download_token(SECRET, &claims(now.timestamp() + 600)).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged = format!("{}:{}:{}", Uuid::new_v4(), Uuid::new_v4(), now.timestamp() + 600);
        let forged_token = format!("{}.{}", URL_SAFE_NO_PAD.encode(forged), signature);
        assert!(verify_download_token(SECRET, &forged_token, now).is_err());
    }

    #[test]
    fn test_garbage_tokens_are_rejected() {
        let now = Utc::now();
        for token in ["", "abc", "a.b", "!!!.???"] {
            assert!(verify_download_token(SECRET, token, now).is_err());
        }
    }
}
