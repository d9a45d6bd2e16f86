pub mod accounts;
pub mod admin;
pub mod analytics;
pub mod generation;
pub mod market;
pub mod media;
pub mod memes;
pub mod social;
pub mod tickets;

use crate::{
    analytics::Engagement,
    domain::StoredObject,
    errors::AppError,
    models::{Meme, MemeSource, ModerationStatus, User},
};
use axum::{
    body::Body,
    extract::Multipart,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov"];

pub fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Ok(Uuid::parse_str(raw)?)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Deserialize, Debug, Default)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Pagination {
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let limit = self.limit.unwrap_or(20).clamp(1, 100);
        items.into_iter().skip(self.offset.unwrap_or(0)).take(limit).collect()
    }
}

/// A file part of a multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    pub data: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl UploadedFile {
    /// Lowercase extension of the file name, if it has one.
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_ref()
            .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()))
    }

    /// Picks an extension from `allowed`, by file name first, then by declared content type.
    /// Returns it with the content type to store.
    pub fn checked_type(&self, allowed: &[&str]) -> Result<(String, String), AppError> {
        let by_content_type = || {
            self.content_type
                .as_deref()
                .and_then(mime_guess::get_mime_extensions_str)
                .and_then(|exts| exts.iter().find(|ext| allowed.contains(*ext)))
                .map(|ext| ext.to_string())
        };
        let extension = match self.extension() {
            Some(ext) if allowed.contains(&ext.as_str()) => ext,
            Some(_) => {
                return Err(AppError::InvalidInput(format!(
                    "Unsupported file type, expected one of: {}",
                    allowed.join(", ")
                )))
            }
            None => by_content_type().ok_or_else(|| {
                AppError::InvalidInput(format!("Unsupported file type, expected one of: {}", allowed.join(", ")))
            })?,
        };
        let content_type = mime_guess::from_ext(&extension)
            .first_raw()
            .map(|s| s.to_string())
            .or_else(|| self.content_type.clone())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok((extension, content_type))
    }
}

/// Text fields and files of a multipart form, keyed by field name.
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedFile>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await? {
            let field_name = match field.name() {
                Some(name) => name.to_string(),
                None => continue,
            };
            if field.file_name().is_some() {
                let file_name = field.file_name().map(|s| s.to_string());
                let content_type = field.content_type().map(|m| m.to_string());
                let data = field.bytes().await?.to_vec();
                form.files.insert(field_name, UploadedFile { data, file_name, content_type });
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read field '{}': {}", field_name, e)))?;
                form.fields.insert(field_name, text);
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    pub fn required_text(&self, name: &str) -> Result<String, AppError> {
        self.text(name)
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::MissingFormField(name.to_string()))
    }

    pub fn flag(&self, name: &str) -> Result<Option<bool>, AppError> {
        match self.text(name) {
            None => Ok(None),
            Some("true") | Some("1") | Some("on") => Ok(Some(true)),
            Some("false") | Some("0") | Some("off") => Ok(Some(false)),
            Some(other) => Err(AppError::InvalidInput(format!("Field '{}' must be a boolean, got '{}'", name, other))),
        }
    }

    pub fn take_file(&mut self, name: &str) -> Result<UploadedFile, AppError> {
        let file = self
            .files
            .remove(name)
            .ok_or_else(|| AppError::MissingFormField(name.to_string()))?;
        if file.data.is_empty() {
            return Err(AppError::InvalidInput(format!("{} data cannot be empty", name)));
        }
        Ok(file)
    }
}

pub fn validate_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::InvalidInput(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    validate_len("email", email, 3, 254)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !email.contains(' ') => Ok(()),
        _ => Err(AppError::InvalidInput("email is not a valid address".to_string())),
    }
}

pub fn validate_rating(rating: u8) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::InvalidInput("rating must be between 1 and 5".to_string()));
    }
    Ok(())
}

/// Splits comma separated tags, lowercased, deduplicated, at most ten.
pub fn parse_tags<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.into_iter().flat_map(|s| s.split(',')) {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && tag.len() <= 32 && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.truncate(10);
    tags
}

pub fn file_response(object: StoredObject, fallback_key: &str) -> Result<Response, AppError> {
    let content_type = object
        .content_type
        .or_else(|| mime_guess::from_path(fallback_key).first_raw().map(|s| s.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(object.data))
        .map_err(|e| AppError::InternalServerError(format!("Failed to build file response: {}", e)))
}

/// A meme as returned to clients.
#[derive(Serialize, Debug, Clone)]
pub struct MemeView {
    pub meme_id: Uuid,
    pub creator_id: Uuid,
    pub creator_username: Option<String>,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub source: MemeSource,
    pub template_id: Option<Uuid>,
    pub is_public: bool,
    pub is_premium: bool,
    pub price_cents: Option<u64>,
    pub moderation: ModerationStatus,
    pub moderation_reason: Option<String>,
    #[serde(flatten)]
    pub engagement: Engagement,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemeView {
    pub fn new(meme: Meme, creator: Option<&User>, engagement: Engagement, can_see_image: bool) -> Self {
        MemeView {
            image_url: can_see_image.then(|| format!("/memes/{}/image", meme.meme_id)),
            meme_id: meme.meme_id,
            creator_id: meme.creator_id,
            creator_username: creator.map(|u| u.username.clone()),
            title: meme.title,
            description: meme.description,
            tags: meme.tags,
            source: meme.source,
            template_id: meme.template_id,
            is_public: meme.is_public,
            is_premium: meme.is_premium,
            price_cents: meme.price_cents,
            moderation: meme.moderation,
            moderation_reason: meme.moderation_reason,
            engagement,
            created_at: meme.created_at,
            updated_at: meme.updated_at,
        }
    }
}
