//! Authentication middleware
//!
//! JWT authentication and role-based access control

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use shared::UserRole;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::auth::decode_access_token;
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Check if user has one of the given roles. Admins pass every check.
    pub fn has_any_role(&self, roles: &[UserRole]) -> bool {
        self.is_admin() || roles.contains(&self.role)
    }

    /// Role guard for use in handlers
    pub fn require_role(&self, roles: &[UserRole]) -> AppResult<()> {
        if self.has_any_role(roles) {
            Ok(())
        } else {
            Err(AppError::InsufficientPermissions)
        }
    }

    pub fn require_admin(&self) -> AppResult<()> {
        self.require_role(&[UserRole::Admin])
    }

    /// Whether the user owns the resource or is an admin
    pub fn owns_or_admin(&self, owner_id: Uuid) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}

/// Authentication middleware that validates bearer JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return AppError::Unauthorized {
            message: "Missing or invalid Authorization header".to_string(),
            message_es: "Falta el encabezado de autorización".to_string(),
        }
        .into_response();
    };

    let claims = match decode_access_token(bearer.token(), &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    let auth_user = match claims.to_auth_user() {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authentication required".to_string(),
                message_es: "Debes iniciar sesión".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_role_guard() {
        let cliente = user(UserRole::Cliente);
        assert!(cliente.require_role(&[UserRole::Cliente]).is_ok());
        assert!(cliente.require_role(&[UserRole::Patronista]).is_err());
        assert!(cliente.require_admin().is_err());
    }

    #[test]
    fn test_admin_passes_every_guard() {
        let admin = user(UserRole::Admin);
        assert!(admin.require_role(&[UserRole::Patronista]).is_ok());
        assert!(admin.require_role(&[UserRole::Cliente]).is_ok());
        assert!(admin.owns_or_admin(Uuid::new_v4()));
    }

    #[test]
    fn test_owner_check() {
        let patronista = user(UserRole::Patronista);
        assert!(patronista.owns_or_admin(patronista.user_id));
        assert!(!patronista.owns_or_admin(Uuid::new_v4()));
    }
}
