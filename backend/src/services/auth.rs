//! Authentication service for registration, login, and token management

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{validate_colombian_phone, validate_password, User, UserRole};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// Input for creating an account
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 2, max = 150, message = "Name must be 2-150 characters"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    /// Defaults to cliente
    pub role: Option<UserRole>,
}

/// Input for updating one's own profile
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileInput {
    #[validate(length(min = 2, max = 150, message = "Name must be 2-150 characters"))]
    pub full_name: Option<String>,
    pub phone: Option<String>,
    #[validate(length(max = 2000, message = "Bio must be at most 2000 characters"))]
    pub bio: Option<String>,
}

/// Input for changing one's password
#[derive(Debug, Deserialize)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn to_auth_user(&self) -> AppResult<AuthUser> {
        let user_id = Uuid::parse_str(&self.sub).map_err(|_| AppError::InvalidToken)?;
        Ok(AuthUser {
            user_id,
            role: self.role,
        })
    }
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Tokens plus the account they belong to
#[derive(Debug, Serialize)]
pub struct AuthSession {
    #[serde(flatten)]
    pub tokens: AuthTokens,
    pub user: User,
}

/// User row from database
#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub bio: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_user(self) -> AppResult<User> {
        Ok(User {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            phone: self.phone,
            role: self.role.parse()?,
            bio: self.bio,
            is_active: self.is_active,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) const USER_COLUMNS: &str = "id, email, password_hash, full_name, phone, role, bio, \
     is_active, last_login_at, created_at, updated_at";

/// Decode and validate an access token
pub fn decode_access_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Register a new cliente or patronista account
    pub async fn register(&self, input: RegisterInput) -> AppResult<AuthSession> {
        input.validate()?;

        let role = input.role.unwrap_or(UserRole::Cliente);
        if !role.is_self_assignable() {
            return Err(AppError::validation(
                "role",
                "This role cannot be chosen at sign-up",
                "Este rol no se puede elegir al registrarse",
            ));
        }

        validate_password(&input.password).map_err(|msg| {
            AppError::validation("password", msg, "La contraseña debe tener al menos 8 caracteres, una letra y un número")
        })?;

        if let Some(phone) = input.phone.as_deref() {
            validate_colombian_phone(phone).map_err(|msg| {
                AppError::validation("phone", msg, "Número de celular inválido")
            })?;
        }

        let email = input.email.trim().to_lowercase();

        // Hash password
        let password_hash = hash(&input.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, password_hash, full_name, phone, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&email)
        .bind(&password_hash)
        .bind(input.full_name.trim())
        .bind(&input.phone)
        .bind(role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_unique_violation(e, "email"))?;

        tracing::info!(user_id = %row.id, role = %role, "Account registered");

        let user = row.into_user()?;
        let tokens = self.issue_tokens(&user).await?;

        Ok(AuthSession { tokens, user })
    }

    /// Authenticate user with email and password
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let email = email.trim().to_lowercase();

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(&email)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        check_credentials(password, &row.password_hash, row.is_active)?;

        // Update last login
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(row.id)
            .execute(&self.db)
            .await?;

        let user = row.into_user()?;
        let tokens = self.issue_tokens(&user).await?;

        Ok(AuthSession { tokens, user })
    }

    /// Refresh access token using refresh token; the old token is revoked
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = Self::hash_token(refresh_token);

        // Revoke and read in one statement so a token cannot be used twice
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE refresh_tokens rt
            SET revoked_at = NOW()
            FROM users u
            WHERE rt.token_hash = $1
              AND u.id = rt.user_id
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.is_active = true
            RETURNING rt.user_id
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Invalid or expired refresh token".to_string(),
            message_es: "El token de actualización es inválido o expiró".to_string(),
        })?;

        let user = self.get_user(user_id).await?;
        self.issue_tokens(&user).await
    }

    /// Revoke a refresh token (logout)
    pub async fn logout(&self, refresh_token: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(Self::hash_token(refresh_token))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Get a user by ID
    pub async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?
        .into_user()
    }

    /// Update the current user's profile
    pub async fn update_profile(&self, user_id: Uuid, input: UpdateProfileInput) -> AppResult<User> {
        input.validate()?;

        if let Some(phone) = input.phone.as_deref() {
            validate_colombian_phone(phone).map_err(|msg| {
                AppError::validation("phone", msg, "Número de celular inválido")
            })?;
        }

        sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                full_name = COALESCE($2, full_name),
                phone = COALESCE($3, phone),
                bio = COALESCE($4, bio),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(input.full_name.as_deref().map(str::trim))
        .bind(&input.phone)
        .bind(&input.bio)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?
        .into_user()
    }

    /// Change password after verifying the current one; revokes all refresh tokens
    pub async fn change_password(&self, user_id: Uuid, input: ChangePasswordInput) -> AppResult<()> {
        let current_hash =
            sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let valid = verify(&input.current_password, &current_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        validate_password(&input.new_password).map_err(|msg| {
            AppError::validation("new_password", msg, "La nueva contraseña no es segura")
        })?;

        let new_hash = hash(&input.new_password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(&new_hash)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Generate and persist a token pair for a user
    async fn issue_tokens(&self, user: &User) -> AppResult<AuthTokens> {
        let tokens = self.generate_tokens(user.id, &user.email, user.role)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;
        Ok(tokens)
    }

    /// Generate access and refresh tokens
    fn generate_tokens(&self, user_id: Uuid, email: &str, role: UserRole) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        // Access token claims
        let access_claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Refresh token (random, stored hashed)
        let refresh_token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    /// Store refresh token in database
    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let token_hash = Self::hash_token(token);
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Hash a token for storage
    fn hash_token(token: &str) -> String {
        format!("{:x}", Sha256::digest(token.as_bytes()))
    }
}

/// Password first, then account status, so a wrong password never reveals
/// whether the account is disabled
fn check_credentials(password: &str, password_hash: &str, is_active: bool) -> AppResult<()> {
    let valid = verify(password, password_hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
    if !valid {
        return Err(AppError::InvalidCredentials);
    }

    if !is_active {
        return Err(AppError::Unauthorized {
            message: "Account is disabled".to_string(),
            message_es: "La cuenta está desactivada".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn service() -> AuthService {
        let config = Config::for_tests();
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .expect("lazy pool");
        AuthService::new(db, &config)
    }

    #[tokio::test]
    async fn test_generated_access_token_decodes() {
        let service = service();
        let user_id = Uuid::new_v4();
        let tokens = service
            .generate_tokens(user_id, "ana@patrones.co", UserRole::Patronista)
            .unwrap();

        let claims = decode_access_token(&tokens.access_token, "test-jwt-secret").unwrap();
        let auth_user = claims.to_auth_user().unwrap();
        assert_eq!(auth_user.user_id, user_id);
        assert_eq!(auth_user.role, UserRole::Patronista);
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.refresh_token.len(), 64);
    }

    #[tokio::test]
    async fn test_token_with_wrong_secret_is_rejected() {
        let service = service();
        let tokens = service
            .generate_tokens(Uuid::new_v4(), "ana@patrones.co", UserRole::Cliente)
            .unwrap();

        assert!(matches!(
            decode_access_token(&tokens.access_token, "other-secret"),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_disabled_account_needs_correct_password_to_be_reported() {
        let password_hash = hash("costura2024", 4).unwrap();

        assert!(matches!(
            check_credentials("otra-clave1", &password_hash, false),
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            check_credentials("costura2024", &password_hash, false),
            Err(AppError::Unauthorized { .. })
        ));
        assert!(check_credentials("costura2024", &password_hash, true).is_ok());
        assert!(matches!(
            check_credentials("otra-clave1", &password_hash, true),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_expired_token_is_reported_as_expired() {
        let past = Utc::now() - Duration::hours(2);
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: "ana@patrones.co".to_string(),
            role: UserRole::Cliente,
            exp: past.timestamp(),
            iat: (past - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-jwt-secret"),
        )
        .unwrap();

        assert!(matches!(
            decode_access_token(&token, "test-jwt-secret"),
            Err(AppError::TokenExpired)
        ));
    }

    #[test]
    fn test_token_hash_is_stable_sha256() {
        let a = AuthService::hash_token("refresh-token");
        let b = AuthService::hash_token("refresh-token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, AuthService::hash_token("refresh-token-2"));
    }
}
