use super::{
    file_response, memes::render_memes, parse_id, validate_email, validate_len, FormData, MemeView, IMAGE_EXTENSIONS,
};
use crate::{
    auth::{self, permissions, AuthUser, MaybeAuthUser, ROLE_USER},
    errors::{AppError, RepoError},
    models::{EmailClaim, User, UserProfile, UsernameClaim},
    visibility::OwnerIndex,
    AppState,
};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Deserialize, Debug)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

fn validate_username(username: &str) -> Result<(), AppError> {
    validate_len("username", username, 3, 32)?;
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::InvalidInput(
            "username may only contain letters, digits and underscores".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    validate_len("password", password, 8, 128)
}

fn issue(state: &AppState, user: &User) -> Result<AuthResponse, AppError> {
    Ok(AuthResponse {
        token: auth::issue_token(&state.config.jwt_secret, state.config.jwt_ttl_hours, user)?,
        user: UserProfile::from(user),
    })
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();
    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&req.password)?;
    let display_name = req
        .display_name
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| username.clone());
    validate_len("display_name", &display_name, 1, 64)?;

    if !state.platform_settings().await?.registrations_open {
        return Err(AppError::Forbidden("Registrations are currently closed".to_string()));
    }

    let password_hash = auth::hash_password(&req.password)?;
    let user_id = Uuid::new_v4();
    let username_claim = UsernameClaim { username: username.to_lowercase(), user_id };
    state.usernames().insert(&username_claim).await.map_err(|e| match e {
        RepoError::Conflict { .. } => AppError::Conflict("Username is already taken".to_string()),
        e => e.into(),
    })?;

    if let Err(e) = state.emails().insert(&EmailClaim { email: email.clone(), user_id }).await {
        // Give the username back; the e-mail belongs to someone else.
        state.usernames().delete(&username_claim.username).await?;
        return Err(match e {
            RepoError::Conflict { .. } => AppError::Conflict("Email is already registered".to_string()),
            e => e.into(),
        });
    }

    let now = Utc::now();
    let user = User {
        user_id,
        username,
        email,
        password_hash,
        display_name,
        bio: String::new(),
        avatar_key: None,
        is_public: false,
        role: ROLE_USER.to_string(),
        is_blocked: false,
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = state.users().insert(&user).await {
        tracing::error!(%user_id, error = %e, "Failed to store new user, releasing claims");
        state.usernames().delete(&username_claim.username).await?;
        state.emails().delete(&user.email).await?;
        return Err(e.into());
    }

    tracing::info!(user_id = %user.user_id, "User registered");
    Ok((StatusCode::CREATED, Json(issue(&state, &user)?)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());
    let email = req.email.trim().to_lowercase();

    let claim = state.emails().get(&email).await?.ok_or_else(invalid)?;
    let user = state
        .users()
        .get(&claim.user_id.to_string())
        .await?
        .ok_or_else(invalid)?;

    if !auth::verify_password(&req.password, &user.password_hash) {
        tracing::debug!(user_id = %user.user_id, "Login rejected: wrong password");
        return Err(invalid());
    }
    if user.is_blocked {
        return Err(AppError::Forbidden("Account is blocked".to_string()));
    }

    tracing::info!(user_id = %user.user_id, "User logged in");
    Ok(Json(issue(&state, &user)?))
}

pub async fn me(AuthUser(user): AuthUser) -> Json<UserProfile> {
    Json(UserProfile::from(&user))
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    AuthUser(mut user): AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, AppError> {
    if let Some(display_name) = req.display_name {
        let display_name = display_name.trim().to_string();
        validate_len("display_name", &display_name, 1, 64)?;
        user.display_name = display_name;
    }
    if let Some(bio) = req.bio {
        validate_len("bio", &bio, 0, 500)?;
        user.bio = bio;
    }
    if let Some(is_public) = req.is_public {
        user.is_public = is_public;
    }
    user.updated_at = Utc::now();
    state.users().save(&user).await?;

    tracing::debug!(user_id = %user.user_id, is_public = user.is_public, "Profile updated");
    Ok(Json(UserProfile::from(&user)))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    AuthUser(mut user): AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    if !auth::verify_password(&req.current_password, &user.password_hash) {
        return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
    }
    validate_password(&req.new_password)?;
    user.password_hash = auth::hash_password(&req.new_password)?;
    user.updated_at = Utc::now();
    state.users().save(&user).await?;
    tracing::info!(user_id = %user.user_id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_avatar(
    State(state): State<Arc<AppState>>,
    AuthUser(mut user): AuthUser,
    multipart: Multipart,
) -> Result<Json<UserProfile>, AppError> {
    let mut form = FormData::read(multipart).await?;
    let image = form.take_file("image")?;
    let (extension, content_type) = image.checked_type(IMAGE_EXTENSIONS)?;

    let key = format!("avatars/{}-{}.{}", user.user_id, Uuid::new_v4(), extension);
    state.file_storage.upload(&key, image.data, Some(content_type)).await?;

    if let Some(old_key) = user.avatar_key.replace(key) {
        if let Err(e) = state.file_storage.delete(&old_key).await {
            tracing::warn!(key = %old_key, error = ?e, "Failed to delete replaced avatar");
        }
    }
    user.updated_at = Utc::now();
    state.users().save(&user).await?;
    Ok(Json(UserProfile::from(&user)))
}

/// Loads a user the caller may look at: public profiles, yourself, or anyone for user managers.
async fn viewable_user(state: &AppState, viewer: Option<&User>, id: &str) -> Result<User, AppError> {
    let user_id = parse_id(id)?;
    let user = state
        .users()
        .get(&user_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;

    let allowed = match viewer {
        Some(v) if v.user_id == user.user_id => true,
        Some(v) => (user.is_public && !user.is_blocked) || auth::has_permission(state, v, permissions::MANAGE_USERS).await?,
        None => user.is_public && !user.is_blocked,
    };
    if !allowed {
        // Private profiles are indistinguishable from missing ones.
        return Err(AppError::NotFound(format!("User {}", user_id)));
    }
    Ok(user)
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, AppError> {
    let user = viewable_user(&state, viewer.as_ref(), &id).await?;
    Ok(Json(UserProfile::from(&user)))
}

pub async fn get_avatar(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let user = viewable_user(&state, viewer.as_ref(), &id).await?;
    let key = user
        .avatar_key
        .ok_or_else(|| AppError::NotFound(format!("Avatar of user {}", user.user_id)))?;
    let object = state.file_storage.download(&key).await?;
    file_response(object, &key)
}

pub async fn user_memes(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<MemeView>>, AppError> {
    let user = viewable_user(&state, viewer.as_ref(), &id).await?;
    let owners = OwnerIndex::new(vec![user.clone()]);
    let mut memes = owners.visible(state.memes().filter(|m| m.creator_id == user.user_id).await?);
    memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let views = render_memes(&state, memes, &owners, viewer.as_ref().map(|v| v.user_id), false).await?;
    Ok(Json(views))
}
