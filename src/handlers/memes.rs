use super::{
    file_response, parse_id, parse_tags, validate_len, FormData, MemeView, Pagination, IMAGE_EXTENSIONS,
};
use crate::{
    analytics::{self, EngagementIndex},
    auth::{self, permissions, AuthUser, MaybeAuthUser},
    domain::Document,
    errors::AppError,
    ledger,
    models::{purchase_id, Meme, MemeSource, ModerationStatus, TargetKind, User},
    visibility::{meme_access, MemeAccess, OwnerIndex},
    AppState,
};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

/// Builds client views with engagement numbers and premium-aware image links.
pub(crate) async fn render_memes(
    state: &AppState,
    memes: Vec<Meme>,
    owners: &OwnerIndex,
    viewer: Option<Uuid>,
    viewer_moderates: bool,
) -> Result<Vec<MemeView>, AppError> {
    if memes.is_empty() {
        return Ok(Vec::new());
    }
    let likes = state.likes().list().await?;
    let reviews = state.reviews().list().await?;
    let engagement = EngagementIndex::build(TargetKind::Meme, &likes, &reviews);
    let purchased: HashSet<Uuid> = match viewer {
        Some(buyer) => state
            .transactions()
            .filter(|tx| tx.buyer_id == buyer)
            .await?
            .into_iter()
            .map(|tx| tx.meme_id)
            .collect(),
        None => HashSet::new(),
    };

    Ok(memes
        .into_iter()
        .map(|meme| {
            let owner = owners.get(&meme.creator_id);
            let access = meme_access(&meme, owner, viewer, viewer_moderates, purchased.contains(&meme.meme_id));
            let stats = engagement.for_target(&meme.meme_id);
            MemeView::new(meme, owner, stats, access.can_see_image)
        })
        .collect())
}

pub(crate) async fn load_meme(state: &AppState, meme_id: Uuid) -> Result<Meme, AppError> {
    state
        .memes()
        .get(&meme_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Meme {}", meme_id)))
}

pub(crate) async fn load_owner(state: &AppState, meme: &Meme) -> Result<Option<User>, AppError> {
    Ok(state.users().get(&meme.creator_id.to_string()).await?)
}

/// Access of `viewer` to `meme`, consulting roles and purchases as needed.
async fn resolve_access(state: &AppState, meme: &Meme, owner: Option<&User>, viewer: Option<&User>) -> Result<MemeAccess, AppError> {
    let Some(viewer) = viewer else {
        return Ok(meme_access(meme, owner, None, false, false));
    };
    let moderates = auth::has_permission(state, viewer, permissions::MODERATE_CONTENT).await?;
    let purchased = meme.is_premium
        && state
            .transactions()
            .get(&purchase_id(viewer.user_id, meme.meme_id))
            .await?
            .is_some();
    Ok(meme_access(meme, owner, Some(viewer.user_id), moderates, purchased))
}

pub async fn create_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = FormData::read(multipart).await?;
    let title = form.required_text("title")?;
    validate_len("title", &title, 1, 120)?;
    let description = form.text("description").unwrap_or_default().to_string();
    validate_len("description", &description, 0, 2_000)?;
    let tags = parse_tags(form.text("tags"));
    let is_public = form.flag("is_public")?.unwrap_or(false);

    let template_id = match form.text("template_id") {
        Some(raw) => {
            let template_id = parse_id(raw)?;
            let template = state
                .media()
                .get(&template_id.to_string())
                .await?
                .filter(|m| m.is_template && m.is_active)
                .ok_or_else(|| AppError::NotFound(format!("Template {}", template_id)))?;
            Some(template.media_id)
        }
        None => None,
    };

    let image = form.take_file("image")?;
    let (extension, content_type) = image.checked_type(IMAGE_EXTENSIONS)?;

    let meme_id = Uuid::new_v4();
    let image_key = format!("memes/{}.{}", meme_id, extension);
    tracing::debug!(s3_key = %image_key, "Uploading meme image");
    state
        .file_storage
        .upload(&image_key, image.data, Some(content_type.clone()))
        .await?;

    let now = Utc::now();
    let meme = Meme {
        meme_id,
        creator_id: user.user_id,
        title,
        description,
        tags,
        image_key,
        content_type,
        source: if template_id.is_some() { MemeSource::Template } else { MemeSource::Upload },
        template_id,
        is_public,
        is_premium: false,
        price_cents: None,
        moderation: ModerationStatus::Active,
        moderation_reason: None,
        created_at: now,
        updated_at: now,
    };
    state.memes().insert(&meme).await?;

    tracing::info!(meme_id = %meme_id, creator_id = %user.user_id, "Meme created");
    let view = MemeView::new(meme, Some(&user), Default::default(), true);
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Deserialize, Debug)]
pub struct PublishGeneratedRequest {
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub is_public: Option<bool>,
}

pub async fn create_from_generated(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(generated_id): Path<String>,
    Json(req): Json<PublishGeneratedRequest>,
) -> Result<impl IntoResponse, AppError> {
    let generated_id = parse_id(&generated_id)?;
    let generated = state
        .generated_images()
        .get(&generated_id.to_string())
        .await?
        .filter(|g| g.user_id == user.user_id)
        .ok_or_else(|| AppError::NotFound(format!("Generated image {}", generated_id)))?;

    let title = req.title.trim().to_string();
    validate_len("title", &title, 1, 120)?;
    let description = req.description.unwrap_or_default();
    validate_len("description", &description, 0, 2_000)?;

    // The meme gets its own copy so deleting the generation history keeps the meme intact.
    let object = state.file_storage.download(&generated.image_key).await?;
    let meme_id = Uuid::new_v4();
    let extension = generated.image_key.rsplit_once('.').map(|(_, e)| e).unwrap_or("png");
    let image_key = format!("memes/{}.{}", meme_id, extension);
    state
        .file_storage
        .upload(&image_key, object.data, Some(generated.content_type.clone()))
        .await?;

    let now = Utc::now();
    let meme = Meme {
        meme_id,
        creator_id: user.user_id,
        title,
        description,
        tags: parse_tags(req.tags.as_deref()),
        image_key,
        content_type: generated.content_type,
        source: MemeSource::Generated,
        template_id: None,
        is_public: req.is_public.unwrap_or(false),
        is_premium: false,
        price_cents: None,
        moderation: ModerationStatus::Active,
        moderation_reason: None,
        created_at: now,
        updated_at: now,
    };
    state.memes().insert(&meme).await?;

    tracing::info!(meme_id = %meme_id, generated_id = %generated_id, "Meme published from generated image");
    Ok((StatusCode::CREATED, Json(MemeView::new(meme, Some(&user), Default::default(), true))))
}

#[derive(Deserialize, Debug, Default)]
pub struct FeedQuery {
    pub tag: Option<String>,
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_memes(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<MemeView>>, AppError> {
    let owners = OwnerIndex::new(state.users().list().await?);
    let tag = query.tag.as_deref().map(|t| t.trim().trim_start_matches('#').to_lowercase());
    let needle = query.q.as_deref().map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());

    let mut memes: Vec<Meme> = owners
        .visible(state.memes().list().await?)
        .into_iter()
        .filter(|m| tag.as_ref().is_none_or(|t| m.tags.contains(t)))
        .filter(|m| {
            needle.as_ref().is_none_or(|n| {
                m.title.to_lowercase().contains(n) || m.description.to_lowercase().contains(n)
            })
        })
        .collect();
    memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let memes = Pagination { limit: query.limit, offset: query.offset }.apply(memes);

    tracing::debug!(count = memes.len(), "Listing community feed");
    let views = render_memes(&state, memes, &owners, viewer.map(|v| v.user_id), false).await?;
    Ok(Json(views))
}

pub async fn my_memes(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<MemeView>>, AppError> {
    let mut memes = state.memes().filter(|m| m.creator_id == user.user_id).await?;
    memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let owners = OwnerIndex::new(vec![user.clone()]);
    let views = render_memes(&state, memes, &owners, Some(user.user_id), false).await?;
    Ok(Json(views))
}

#[derive(Deserialize, Debug)]
pub struct TrendingQuery {
    pub days: Option<i64>,
    pub limit: Option<usize>,
}

pub async fn trending(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<Vec<MemeView>>, AppError> {
    let days = query.days.unwrap_or(7).clamp(1, 365);
    let limit = query.limit.unwrap_or(10).clamp(1, 50);
    let owners = OwnerIndex::new(state.users().list().await?);
    let visible = owners.visible(state.memes().list().await?);
    let likes = state.likes().list().await?;

    let ranked = analytics::trending(visible, &likes, Utc::now() - Duration::days(days), limit);
    let memes = ranked.into_iter().map(|(meme, _)| meme).collect();
    let views = render_memes(&state, memes, &owners, viewer.map(|v| v.user_id), false).await?;
    Ok(Json(views))
}

pub async fn get_meme(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Json<MemeView>, AppError> {
    let meme_id = parse_id(&id)?;
    tracing::debug!(%meme_id, "Fetching meme details");
    let meme = load_meme(&state, meme_id).await?;
    let owner = load_owner(&state, &meme).await?;
    let access = resolve_access(&state, &meme, owner.as_ref(), viewer.as_ref()).await?;
    if !access.can_view {
        return Err(AppError::NotFound(format!("Meme {}", meme_id)));
    }

    let likes = state.likes().filter(|l| l.target_id == meme_id).await?;
    let reviews = state.reviews().filter(|r| r.target_id == meme_id).await?;
    let engagement = EngagementIndex::build(TargetKind::Meme, &likes, &reviews).for_target(&meme_id);
    Ok(Json(MemeView::new(meme, owner.as_ref(), engagement, access.can_see_image)))
}

pub async fn get_meme_image(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let meme_id = parse_id(&id)?;
    let meme = load_meme(&state, meme_id).await?;
    let owner = load_owner(&state, &meme).await?;
    let access = resolve_access(&state, &meme, owner.as_ref(), viewer.as_ref()).await?;
    if !access.can_view {
        return Err(AppError::NotFound(format!("Meme {}", meme_id)));
    }
    if !access.can_see_image {
        return Err(AppError::Forbidden("Purchase this premium meme to view it".to_string()));
    }

    let object = state.file_storage.download(&meme.image_key).await?;
    file_response(object, &meme.image_key)
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateMemeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
    pub is_premium: Option<bool>,
    pub price_cents: Option<u64>,
}

pub async fn update_meme(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateMemeRequest>,
) -> Result<Json<MemeView>, AppError> {
    let meme_id = parse_id(&id)?;
    let mut meme = load_meme(&state, meme_id).await?;
    if meme.creator_id != user.user_id {
        return Err(AppError::Forbidden("Only the creator can edit this meme".to_string()));
    }

    if let Some(title) = req.title {
        let title = title.trim().to_string();
        validate_len("title", &title, 1, 120)?;
        meme.title = title;
    }
    if let Some(description) = req.description {
        validate_len("description", &description, 0, 2_000)?;
        meme.description = description;
    }
    if let Some(tags) = req.tags {
        meme.tags = parse_tags(tags.iter().map(String::as_str));
    }
    if let Some(is_public) = req.is_public {
        meme.is_public = is_public;
    }
    // Pricing is only re-checked when the request touches it.
    let pricing_changed = req.price_cents.is_some() || req.is_premium.is_some();
    if let Some(price) = req.price_cents {
        meme.price_cents = Some(price);
    }
    if let Some(is_premium) = req.is_premium {
        meme.is_premium = is_premium;
    }
    if pricing_changed && meme.is_premium {
        let price = meme
            .price_cents
            .ok_or_else(|| AppError::InvalidInput("Premium memes need price_cents".to_string()))?;
        ledger::validate_price(price, &state.platform_settings().await?)?;
    }

    meme.updated_at = Utc::now();
    state.memes().save(&meme).await?;
    tracing::info!(%meme_id, is_public = meme.is_public, is_premium = meme.is_premium, "Meme updated");

    let owners = OwnerIndex::new(vec![user.clone()]);
    let mut views = render_memes(&state, vec![meme], &owners, Some(user.user_id), false).await?;
    views
        .pop()
        .ok_or_else(|| AppError::InternalServerError("rendered no meme".to_string()))
        .map(Json)
}

/// Deletes the meme metadata, its image file and its likes and reviews.
/// Purchase records are kept.
pub async fn delete_meme(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let meme_id = parse_id(&id)?;
    let meme = load_meme(&state, meme_id).await?;
    if meme.creator_id != auth_user.id() {
        auth_user.require(&state, permissions::MODERATE_CONTENT).await?;
        tracing::info!(%meme_id, moderator = %auth_user.id(), "Moderator deleting meme");
    }
    remove_meme(&state, &meme).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn remove_meme(state: &AppState, meme: &Meme) -> Result<(), AppError> {
    let meme_id = meme.meme_id;
    state.file_storage.delete(&meme.image_key).await?;

    let likes = state
        .likes()
        .filter(|l| l.kind == TargetKind::Meme && l.target_id == meme_id)
        .await?;
    for like in &likes {
        state.likes().delete(&like.id()).await?;
    }
    let reviews = state
        .reviews()
        .filter(|r| r.kind == TargetKind::Meme && r.target_id == meme_id)
        .await?;
    for review in &reviews {
        state.reviews().delete(&review.id()).await?;
    }

    state.memes().delete(&meme_id.to_string()).await?;
    tracing::info!(%meme_id, likes = likes.len(), reviews = reviews.len(), "Meme deleted");
    Ok(())
}
