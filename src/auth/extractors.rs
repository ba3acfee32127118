use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::jwt::{Claims, JwtKeys};
use crate::{
    error::{AppError, UnauthorizedKind},
    users::repo_types::Role,
};

/// Verified session principal taken from `Authorization: Bearer <token>`.
pub struct AuthUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let missing = AppError::Unauthorized(UnauthorizedKind::Missing);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(missing)?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized(UnauthorizedKind::Missing))?;

        let claims = JwtKeys::from_ref(state)
            .verify(token)
            .map_err(AppError::Unauthorized)?;
        Ok(AuthUser(claims))
    }
}

/// Role an operation demands of its caller.
pub trait RequiredRole: Send + Sync {
    const ROLE: Role;
}

pub struct AdminOnly;
impl RequiredRole for AdminOnly {
    const ROLE: Role = Role::Admin;
}

pub struct UserOnly;
impl RequiredRole for UserOnly {
    const ROLE: Role = Role::User;
}

/// Exact match only; an admin is not implicitly a user.
pub fn authorize(claims: &Claims, required: Role) -> Result<(), AppError> {
    if claims.role == required {
        Ok(())
    } else {
        warn!(
            user_id = claims.sub,
            role = claims.role.as_str(),
            required = required.as_str(),
            "role mismatch"
        );
        Err(AppError::Forbidden)
    }
}

/// Authenticated principal whose role equals `R::ROLE`.
pub struct Authorized<R: RequiredRole> {
    pub claims: Claims,
    _role: PhantomData<R>,
}

impl<R: RequiredRole> Authorized<R> {
    /// Identity written to audit fields.
    pub fn actor(&self) -> &str {
        &self.claims.email
    }
}

#[async_trait]
impl<S, R> FromRequestParts<S> for Authorized<R>
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    R: RequiredRole,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        authorize(&claims, R::ROLE)?;
        Ok(Self {
            claims,
            _role: PhantomData,
        })
    }
}
