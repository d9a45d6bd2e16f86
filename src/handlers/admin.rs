//! Platform settings, account administration, roles and content moderation.

use super::{
    memes::{load_meme, render_memes},
    parse_id, validate_len, MemeView,
};
use crate::{
    auth::{permissions, AuthUser, ROLE_ADMIN, ROLE_SUPER_ADMIN, ROLE_USER},
    errors::{AppError, RepoError},
    ledger::MAX_COMMISSION_BPS,
    models::{ModerationStatus, Permission, PlatformSettings, Role, UserAccount},
    visibility::OwnerIndex,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};

// --- Settings ---

#[derive(Serialize, Debug)]
pub struct PublicSettings {
    pub commission_bps: u32,
    pub min_price_cents: u64,
    pub max_price_cents: u64,
    pub registrations_open: bool,
}

pub async fn public_settings(State(state): State<Arc<AppState>>) -> Result<Json<PublicSettings>, AppError> {
    let settings = state.platform_settings().await?;
    Ok(Json(PublicSettings {
        commission_bps: settings.commission_bps,
        min_price_cents: settings.min_price_cents,
        max_price_cents: settings.max_price_cents,
        registrations_open: settings.registrations_open,
    }))
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<PlatformSettings>, AppError> {
    auth_user.require(&state, permissions::MANAGE_SETTINGS).await?;
    Ok(Json(state.platform_settings().await?))
}

#[derive(Deserialize, Debug, Default)]
pub struct SettingsUpdate {
    pub commission_bps: Option<u32>,
    pub min_price_cents: Option<u64>,
    pub max_price_cents: Option<u64>,
    pub registrations_open: Option<bool>,
}

/// Applies `update` to `settings`, rejecting combinations that would break pricing.
pub fn apply_settings(settings: &mut PlatformSettings, update: SettingsUpdate) -> Result<(), AppError> {
    if let Some(bps) = update.commission_bps {
        if bps > MAX_COMMISSION_BPS {
            return Err(AppError::InvalidInput(format!(
                "commission_bps must be at most {}",
                MAX_COMMISSION_BPS
            )));
        }
        settings.commission_bps = bps;
    }
    if let Some(min) = update.min_price_cents {
        settings.min_price_cents = min;
    }
    if let Some(max) = update.max_price_cents {
        settings.max_price_cents = max;
    }
    if let Some(open) = update.registrations_open {
        settings.registrations_open = open;
    }
    if settings.min_price_cents < 1 {
        return Err(AppError::InvalidInput("min_price_cents must be at least 1".to_string()));
    }
    if settings.min_price_cents > settings.max_price_cents {
        return Err(AppError::InvalidInput(
            "min_price_cents cannot exceed max_price_cents".to_string(),
        ));
    }
    Ok(())
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<PlatformSettings>, AppError> {
    auth_user.require(&state, permissions::MANAGE_SETTINGS).await?;
    let mut settings = state.platform_settings().await?;
    apply_settings(&mut settings, update)?;
    settings.updated_at = Utc::now();
    settings.updated_by = Some(auth_user.id());
    state.settings().save(&settings).await?;

    tracing::info!(
        commission_bps = settings.commission_bps,
        min_price_cents = settings.min_price_cents,
        max_price_cents = settings.max_price_cents,
        updated_by = %auth_user.id(),
        "Platform settings updated"
    );
    Ok(Json(settings))
}

// --- Users ---

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<Vec<UserAccount>>, AppError> {
    auth_user.require(&state, permissions::MANAGE_USERS).await?;
    let mut users = state.users().list().await?;
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(Json(users.iter().map(UserAccount::from).collect()))
}

#[derive(Deserialize, Debug)]
pub struct BlockRequest {
    pub blocked: bool,
}

pub async fn set_blocked(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<BlockRequest>,
) -> Result<Json<UserAccount>, AppError> {
    auth_user.require(&state, permissions::MANAGE_USERS).await?;
    let user_id = parse_id(&id)?;
    if user_id == auth_user.id() {
        return Err(AppError::InvalidInput("You cannot block yourself".to_string()));
    }
    let mut user = state
        .users()
        .get(&user_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
    if user.role == ROLE_SUPER_ADMIN {
        return Err(AppError::Forbidden("Super admins cannot be blocked".to_string()));
    }

    user.is_blocked = req.blocked;
    user.updated_at = Utc::now();
    state.users().save(&user).await?;

    tracing::info!(%user_id, blocked = req.blocked, by = %auth_user.id(), "User block state changed");
    Ok(Json(UserAccount::from(&user)))
}

#[derive(Deserialize, Debug)]
pub struct RoleAssignment {
    pub role: String,
}

pub async fn set_role(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<RoleAssignment>,
) -> Result<Json<UserAccount>, AppError> {
    auth_user.require(&state, permissions::MANAGE_ROLES).await?;
    let user_id = parse_id(&id)?;
    let role = req.role.trim().to_lowercase();

    if state.roles().get(&role).await?.is_none() {
        return Err(AppError::InvalidInput(format!("Role '{}' does not exist", role)));
    }
    let mut user = state
        .users()
        .get(&user_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))?;
    // Granting or revoking the top role is reserved to holders of it.
    if (role == ROLE_SUPER_ADMIN || user.role == ROLE_SUPER_ADMIN) && !auth_user.is_super_admin() {
        return Err(AppError::Forbidden(
            "Only a super admin can change super admin assignments".to_string(),
        ));
    }

    user.role = role;
    user.updated_at = Utc::now();
    state.users().save(&user).await?;

    tracing::info!(%user_id, role = %user.role, by = %auth_user.id(), "Role assigned");
    Ok(Json(UserAccount::from(&user)))
}

// --- Roles ---

fn is_system_role(name: &str) -> bool {
    [ROLE_USER, ROLE_ADMIN, ROLE_SUPER_ADMIN].contains(&name)
}

fn validate_name(field: &str, name: &str) -> Result<(), AppError> {
    validate_len(field, name, 2, 50)?;
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(AppError::InvalidInput(format!(
            "{} may only contain lowercase letters, digits and underscores",
            field
        )));
    }
    Ok(())
}

/// Deduplicates `requested` and checks every entry names a stored permission.
async fn known_permissions(state: &AppState, requested: Vec<String>) -> Result<Vec<String>, AppError> {
    let known: HashSet<String> = state.permissions().list().await?.into_iter().map(|p| p.name).collect();
    let mut granted: Vec<String> = Vec::with_capacity(requested.len());
    for name in requested {
        let name = name.trim().to_lowercase();
        if !known.contains(&name) {
            return Err(AppError::InvalidInput(format!("Permission '{}' does not exist", name)));
        }
        if !granted.contains(&name) {
            granted.push(name);
        }
    }
    Ok(granted)
}

pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<Vec<Role>>, AppError> {
    auth_user.require(&state, permissions::MANAGE_ROLES).await?;
    let mut roles = state.roles().list().await?;
    roles.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(roles))
}

#[derive(Deserialize, Debug)]
pub struct RoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

pub async fn create_role(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(req): Json<RoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(&state, permissions::MANAGE_ROLES).await?;
    let name = req.name.trim().to_lowercase();
    validate_name("name", &name)?;
    validate_len("description", &req.description, 0, 500)?;

    let role = Role {
        permissions: known_permissions(&state, req.permissions).await?,
        name,
        description: req.description.trim().to_string(),
        is_system: false,
        created_at: Utc::now(),
    };
    state.roles().insert(&role).await.map_err(|e| match e {
        RepoError::Conflict { .. } => AppError::Conflict(format!("Role '{}' already exists", role.name)),
        e => e.into(),
    })?;

    tracing::info!(role = %role.name, "Role created");
    Ok((StatusCode::CREATED, Json(role)))
}

#[derive(Deserialize, Debug)]
pub struct RoleUpdate {
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(name): Path<String>,
    Json(req): Json<RoleUpdate>,
) -> Result<Json<Role>, AppError> {
    auth_user.require(&state, permissions::MANAGE_ROLES).await?;
    if name == ROLE_SUPER_ADMIN {
        return Err(AppError::InvalidInput("The super admin role always holds every permission".to_string()));
    }
    let mut role = state
        .roles()
        .get(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Role '{}'", name)))?;

    if let Some(description) = req.description {
        validate_len("description", &description, 0, 500)?;
        role.description = description.trim().to_string();
    }
    if let Some(requested) = req.permissions {
        role.permissions = known_permissions(&state, requested).await?;
    }
    state.roles().save(&role).await?;

    tracing::info!(role = %role.name, permissions = ?role.permissions, "Role updated");
    Ok(Json(role))
}

pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    auth_user.require(&state, permissions::MANAGE_ROLES).await?;
    let role = state
        .roles()
        .get(&name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Role '{}'", name)))?;
    if role.is_system || is_system_role(&role.name) {
        return Err(AppError::InvalidInput(format!("System role '{}' cannot be deleted", role.name)));
    }
    let holders = state.users().filter(|u| u.role == role.name).await?;
    if !holders.is_empty() {
        return Err(AppError::Conflict(format!(
            "Role '{}' is assigned to {} user(s)",
            role.name,
            holders.len()
        )));
    }
    state.roles().delete(&role.name).await?;

    tracing::info!(role = %role.name, "Role deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Permissions ---

pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<Vec<Permission>>, AppError> {
    auth_user.require(&state, permissions::MANAGE_ROLES).await?;
    let mut all = state.permissions().list().await?;
    all.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(all))
}

#[derive(Deserialize, Debug)]
pub struct PermissionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

pub async fn create_permission(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(req): Json<PermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(&state, permissions::MANAGE_ROLES).await?;
    let name = req.name.trim().to_lowercase();
    validate_name("name", &name)?;
    validate_len("description", &req.description, 0, 500)?;

    let permission = Permission {
        name,
        description: req.description.trim().to_string(),
        created_at: Utc::now(),
    };
    state.permissions().insert(&permission).await.map_err(|e| match e {
        RepoError::Conflict { .. } => {
            AppError::Conflict(format!("Permission '{}' already exists", permission.name))
        }
        e => e.into(),
    })?;
    Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn delete_permission(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    auth_user.require(&state, permissions::MANAGE_ROLES).await?;
    if state.permissions().get(&name).await?.is_none() {
        return Err(AppError::NotFound(format!("Permission '{}'", name)));
    }
    let granting_roles: Vec<String> = state
        .roles()
        .filter(|r| r.permissions.contains(&name))
        .await?
        .into_iter()
        .map(|r| r.name)
        .collect();
    if !granting_roles.is_empty() {
        return Err(AppError::Conflict(format!(
            "Permission '{}' is granted by role(s): {}",
            name,
            granting_roles.join(", ")
        )));
    }
    state.permissions().delete(&name).await?;

    tracing::info!(permission = %name, "Permission deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Moderation ---

pub async fn list_all_memes(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<Vec<MemeView>>, AppError> {
    auth_user.require(&state, permissions::MODERATE_CONTENT).await?;
    let owners = OwnerIndex::new(state.users().list().await?);
    let mut memes = state.memes().list().await?;
    memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let views = render_memes(&state, memes, &owners, Some(auth_user.id()), true).await?;
    Ok(Json(views))
}

#[derive(Deserialize, Debug)]
pub struct ModerationRequest {
    pub status: ModerationStatus,
    pub reason: Option<String>,
}

pub async fn moderate_meme(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ModerationRequest>,
) -> Result<Json<MemeView>, AppError> {
    auth_user.require(&state, permissions::MODERATE_CONTENT).await?;
    let meme_id = parse_id(&id)?;
    let mut meme = load_meme(&state, meme_id).await?;

    let reason = req.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    if let Some(reason) = &reason {
        validate_len("reason", reason, 1, 500)?;
    }
    meme.moderation = req.status;
    meme.moderation_reason = match req.status {
        ModerationStatus::Hidden => reason,
        ModerationStatus::Active => None,
    };
    meme.updated_at = Utc::now();
    state.memes().save(&meme).await?;

    tracing::info!(%meme_id, status = ?meme.moderation, moderator = %auth_user.id(), "Meme moderated");
    let owners = OwnerIndex::new(state.users().filter(|u| u.user_id == meme.creator_id).await?);
    let mut views = render_memes(&state, vec![meme], &owners, Some(auth_user.id()), true).await?;
    views
        .pop()
        .ok_or_else(|| AppError::InternalServerError("Moderated meme could not be rendered".to_string()))
        .map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_is_capped() {
        let mut settings = PlatformSettings::defaults(1_000);
        let update = SettingsUpdate { commission_bps: Some(MAX_COMMISSION_BPS + 1), ..Default::default() };
        assert!(apply_settings(&mut settings, update).is_err());
        assert_eq!(settings.commission_bps, 1_000);
    }

    #[test]
    fn price_bounds_must_be_ordered() {
        let mut settings = PlatformSettings::defaults(1_000);
        let update = SettingsUpdate { min_price_cents: Some(500), max_price_cents: Some(400), ..Default::default() };
        assert!(apply_settings(&mut settings, update).is_err());

        let mut settings = PlatformSettings::defaults(1_000);
        let update = SettingsUpdate { min_price_cents: Some(0), ..Default::default() };
        assert!(apply_settings(&mut settings, update).is_err());
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let mut settings = PlatformSettings::defaults(1_000);
        let update = SettingsUpdate { commission_bps: Some(2_500), ..Default::default() };
        apply_settings(&mut settings, update).unwrap();
        assert_eq!(settings.commission_bps, 2_500);
        assert_eq!(settings.min_price_cents, 100);
        assert!(settings.registrations_open);
    }

    #[test]
    fn role_names_are_slugs() {
        assert!(validate_name("name", "content_team").is_ok());
        assert!(validate_name("name", "Content Team").is_err());
        assert!(is_system_role("admin"));
        assert!(!is_system_role("content_team"));
    }
}
