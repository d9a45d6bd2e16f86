use super::{file_response, parse_id, validate_len};
use crate::{auth::AuthUser, errors::AppError, models::GeneratedImage, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct GenerateRequest {
    pub prompt: String,
}

pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let prompt = req.prompt.trim().to_string();
    validate_len("prompt", &prompt, 3, 1_000)?;

    tracing::info!(user_id = %user.user_id, prompt_len = prompt.len(), "Generating image");
    let asset = state.image_generator.generate(&prompt).await?;

    let image_id = Uuid::new_v4();
    let extension = mime_guess::get_mime_extensions_str(&asset.content_type)
        .and_then(|exts| exts.first())
        .copied()
        .unwrap_or("png");
    let image_key = format!("generated/{}/{}.{}", user.user_id, image_id, extension);
    state
        .file_storage
        .upload(&image_key, asset.data, Some(asset.content_type.clone()))
        .await?;

    let generated = GeneratedImage {
        image_id,
        user_id: user.user_id,
        prompt,
        image_key,
        content_type: asset.content_type,
        created_at: Utc::now(),
    };
    state.generated_images().insert(&generated).await?;

    tracing::info!(%image_id, "Generated image stored");
    Ok((StatusCode::CREATED, Json(generated)))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<GeneratedImage>>, AppError> {
    let mut images = state
        .generated_images()
        .filter(|g| g.user_id == user.user_id)
        .await?;
    images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(images))
}

async fn owned_image(state: &AppState, user_id: Uuid, id: &str) -> Result<GeneratedImage, AppError> {
    let image_id = parse_id(id)?;
    state
        .generated_images()
        .get(&image_id.to_string())
        .await?
        .filter(|g| g.user_id == user_id)
        .ok_or_else(|| AppError::NotFound(format!("Generated image {}", image_id)))
}

pub async fn get_generated_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let image = owned_image(&state, user.user_id, &id).await?;
    let object = state.file_storage.download(&image.image_key).await?;
    file_response(object, &image.image_key)
}

pub async fn delete_generated(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let image = owned_image(&state, user.user_id, &id).await?;
    state.file_storage.delete(&image.image_key).await?;
    state.generated_images().delete(&image.image_id.to_string()).await?;
    tracing::info!(image_id = %image.image_id, "Generated image deleted");
    Ok(StatusCode::NO_CONTENT)
}
