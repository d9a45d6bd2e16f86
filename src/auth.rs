//! Password hashing, bearer tokens and role/permission checks.

use crate::{
    errors::{internal_error, AppError},
    models::User,
    AppState,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPER_ADMIN: &str = "super_admin";

/// Permission names checked by admin endpoints.
pub mod permissions {
    pub const MANAGE_TEMPLATES: &str = "manage_templates";
    pub const MANAGE_SUPPORT: &str = "manage_support";
    pub const MODERATE_CONTENT: &str = "moderate_content";
    pub const MANAGE_USERS: &str = "manage_users";
    pub const VIEW_ANALYTICS: &str = "view_analytics";
    pub const MANAGE_SETTINGS: &str = "manage_settings";
    pub const MANAGE_ROLES: &str = "manage_roles";

    /// Seeded at startup, with descriptions.
    pub const BUILT_IN: &[(&str, &str)] = &[
        (MANAGE_TEMPLATES, "Upload, edit and retire templates and media"),
        (MANAGE_SUPPORT, "Handle contact messages and support tickets"),
        (MODERATE_CONTENT, "Hide or delete memes and review testimonials"),
        (MANAGE_USERS, "View and block user accounts"),
        (VIEW_ANALYTICS, "Read platform analytics"),
        (MANAGE_SETTINGS, "Change platform settings such as the commission rate"),
        (MANAGE_ROLES, "Manage roles, permissions and role assignments"),
    ];

    /// Granted to the built-in `admin` role.
    pub const ADMIN_DEFAULTS: &[&str] = &[
        MANAGE_TEMPLATES,
        MANAGE_SUPPORT,
        MODERATE_CONTENT,
        MANAGE_USERS,
        VIEW_ANALYTICS,
    ];
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| internal_error!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Stored password hash is not a valid PHC string");
            false
        }
    }
}

/// JWT claims for authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(secret: &str, ttl_hours: i64, user: &User) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.user_id,
        role: user.role.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(ttl_hours)).timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| internal_error!("Failed to sign token: {}", e))
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::Unauthorized("Invalid or expired token".to_string())
        })
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Unauthorized("Malformed Authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or_else(|| AppError::Unauthorized("Expected a Bearer token".to_string()))
}

async fn resolve_user(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = decode_token(&state.config.jwt_secret, token)?;
    let user = state
        .users()
        .get(&claims.sub.to_string())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;
    if user.is_blocked {
        return Err(AppError::Forbidden("Account is blocked".to_string()));
    }
    Ok(user)
}

/// The authenticated caller. Rejects the request with 401 without a valid token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;
        resolve_user(state, token).await.map(AuthUser)
    }
}

/// The caller if a token was sent. Anonymous requests pass; bad tokens do not.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<User>);

impl FromRequestParts<Arc<AppState>> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => resolve_user(state, token).await.map(|u| MaybeAuthUser(Some(u))),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}

/// Whether `user` holds `permission` through their role.
pub async fn has_permission(state: &AppState, user: &User, permission: &str) -> Result<bool, AppError> {
    if user.role == ROLE_SUPER_ADMIN {
        return Ok(true);
    }
    let role = state.roles().get(&user.role).await?;
    Ok(role.is_some_and(|r| r.permissions.iter().any(|p| p == permission)))
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0.user_id
    }

    pub fn is_super_admin(&self) -> bool {
        self.0.role == ROLE_SUPER_ADMIN
    }

    /// Fails with 403 unless the caller holds `permission`.
    pub async fn require(&self, state: &AppState, permission: &str) -> Result<(), AppError> {
        if has_permission(state, &self.0, permission).await? {
            Ok(())
        } else {
            tracing::warn!(user_id = %self.0.user_id, role = %self.0.role, permission, "Permission denied");
            Err(AppError::Forbidden(format!("Missing permission '{}'", permission)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            user_id: Uuid::new_v4(),
            username: "doge".into(),
            email: "doge@example.com".into(),
            password_hash: String::new(),
            display_name: "Doge".into(),
            bio: String::new(),
            avatar_key: None,
            is_public: true,
            role: ROLE_USER.into(),
            is_blocked: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong horse battery", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn tokens_round_trip_subject_and_role() {
        let secret = "0123456789abcdef0123";
        let u = user();
        let token = issue_token(secret, 1, &u).unwrap();
        let claims = decode_token(secret, &token).unwrap();
        assert_eq!(claims.sub, u.user_id);
        assert_eq!(claims.role, ROLE_USER);
    }

    #[test]
    fn tokens_signed_with_other_secret_are_rejected() {
        let token = issue_token("0123456789abcdef0123", 1, &user()).unwrap();
        assert!(matches!(
            decode_token("another-secret-of-length", &token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let secret = "0123456789abcdef0123";
        let token = issue_token(secret, -2, &user()).unwrap();
        assert!(decode_token(secret, &token).is_err());
    }
}
