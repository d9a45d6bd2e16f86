use super::{file_response, parse_id, validate_len, FormData, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::{
    auth::{self, permissions, AuthUser, MaybeAuthUser},
    errors::AppError,
    models::{Media, MediaKind},
    AppState,
};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub async fn list_templates(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Media>>, AppError> {
    let mut templates = state.media().filter(|m| m.is_template && m.is_active).await?;
    templates.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
    Ok(Json(templates))
}

/// Loads media readable by the caller: active media for everyone, anything for template managers.
async fn readable_media(state: &AppState, viewer: Option<&crate::models::User>, id: &str) -> Result<Media, AppError> {
    let media_id = parse_id(id)?;
    let media = state
        .media()
        .get(&media_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Media {}", media_id)))?;
    if media.is_active {
        return Ok(media);
    }
    match viewer {
        Some(v) if auth::has_permission(state, v, permissions::MANAGE_TEMPLATES).await? => Ok(media),
        _ => Err(AppError::NotFound(format!("Media {}", media_id))),
    }
}

pub async fn get_media_file(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let media = readable_media(&state, viewer.as_ref(), &id).await?;
    let object = state.file_storage.download(&media.object_key).await?;
    file_response(object, &media.object_key)
}

pub async fn get_media_thumbnail(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let media = readable_media(&state, viewer.as_ref(), &id).await?;
    // Images are their own thumbnail.
    let key = match (&media.thumbnail_key, media.kind) {
        (Some(key), _) => key.clone(),
        (None, MediaKind::Image) => media.object_key.clone(),
        (None, MediaKind::Video) => {
            return Err(AppError::NotFound(format!("Thumbnail of media {}", media.media_id)))
        }
    };
    let object = state.file_storage.download(&key).await?;
    file_response(object, &key)
}

pub async fn admin_list_media(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<Vec<Media>>, AppError> {
    auth_user.require(&state, permissions::MANAGE_TEMPLATES).await?;
    let mut media = state.media().list().await?;
    media.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(media))
}

pub async fn upload_media(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require(&state, permissions::MANAGE_TEMPLATES).await?;
    let mut form = FormData::read(multipart).await?;
    let title = form.required_text("title")?;
    validate_len("title", &title, 1, 120)?;
    let is_template = form.flag("is_template")?.unwrap_or(true);
    let file = form.take_file("file")?;

    let allowed: Vec<&str> = IMAGE_EXTENSIONS.iter().chain(VIDEO_EXTENSIONS).copied().collect();
    let (extension, content_type) = file.checked_type(&allowed)?;
    let kind = if VIDEO_EXTENSIONS.contains(&extension.as_str()) { MediaKind::Video } else { MediaKind::Image };

    let media_id = Uuid::new_v4();
    let object_key = format!("media/{}.{}", media_id, extension);

    // Thumbnailing is best effort: the media is stored either way.
    let thumbnail_key = match kind {
        MediaKind::Video => match state.thumbnailer.thumbnail(&file.data, &extension).await {
            Ok(png) => {
                let key = format!("media/{}-thumb.png", media_id);
                state.file_storage.upload(&key, png, Some("image/png".to_string())).await?;
                Some(key)
            }
            Err(e) => {
                tracing::warn!(%media_id, error = %e, "Could not create video thumbnail");
                None
            }
        },
        MediaKind::Image => None,
    };

    state
        .file_storage
        .upload(&object_key, file.data, Some(content_type.clone()))
        .await?;

    let media = Media {
        media_id,
        title,
        kind,
        object_key,
        content_type,
        thumbnail_key,
        is_template,
        is_active: true,
        uploaded_by: auth_user.id(),
        created_at: Utc::now(),
    };
    state.media().insert(&media).await?;

    tracing::info!(%media_id, kind = ?media.kind, is_template, "Media uploaded");
    Ok((StatusCode::CREATED, Json(media)))
}

#[derive(Deserialize, Debug)]
pub struct UpdateMediaRequest {
    pub title: Option<String>,
    pub is_template: Option<bool>,
    pub is_active: Option<bool>,
}

pub async fn update_media(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateMediaRequest>,
) -> Result<Json<Media>, AppError> {
    auth_user.require(&state, permissions::MANAGE_TEMPLATES).await?;
    let media_id = parse_id(&id)?;
    let mut media = state
        .media()
        .get(&media_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Media {}", media_id)))?;

    if let Some(title) = req.title {
        let title = title.trim().to_string();
        validate_len("title", &title, 1, 120)?;
        media.title = title;
    }
    if let Some(is_template) = req.is_template {
        media.is_template = is_template;
    }
    if let Some(is_active) = req.is_active {
        media.is_active = is_active;
    }
    state.media().save(&media).await?;
    Ok(Json(media))
}

pub async fn delete_media(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    auth_user.require(&state, permissions::MANAGE_TEMPLATES).await?;
    let media_id = parse_id(&id)?;
    let media = state
        .media()
        .get(&media_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Media {}", media_id)))?;

    state.file_storage.delete(&media.object_key).await?;
    if let Some(thumbnail_key) = &media.thumbnail_key {
        state.file_storage.delete(thumbnail_key).await?;
    }
    state.media().delete(&media_id.to_string()).await?;

    tracing::info!(%media_id, "Media deleted");
    Ok(StatusCode::NO_CONTENT)
}
