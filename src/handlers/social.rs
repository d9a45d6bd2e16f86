use super::{memes::render_memes, parse_id, validate_len, validate_rating, MemeView};
use crate::{
    analytics::average,
    auth::{AuthUser, MaybeAuthUser},
    errors::{AppError, RepoError},
    models::{engagement_id, Like, Review, TargetKind, User},
    visibility::{is_community_visible, OwnerIndex},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

fn parse_target(kind: &str, target_id: &str) -> Result<(TargetKind, Uuid), AppError> {
    let kind = kind.parse::<TargetKind>().map_err(AppError::InvalidInput)?;
    Ok((kind, parse_id(target_id)?))
}

/// Owner of the target, if it has one. Fails unless the community may engage with it.
/// Owners of a meme may always read its engagement, but `for_engagement` requires visibility.
async fn check_target(
    state: &AppState,
    kind: TargetKind,
    target_id: Uuid,
    viewer: Option<&User>,
    for_engagement: bool,
) -> Result<Option<Uuid>, AppError> {
    match kind {
        TargetKind::Meme => {
            let meme = state
                .memes()
                .get(&target_id.to_string())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Meme {}", target_id)))?;
            let owner = state.users().get(&meme.creator_id.to_string()).await?;
            let visible = is_community_visible(&meme, owner.as_ref());
            let is_owner = viewer.is_some_and(|v| v.user_id == meme.creator_id);
            if !visible {
                if for_engagement {
                    return Err(AppError::Forbidden(
                        "Only public memes by creators with public profiles accept likes and reviews".to_string(),
                    ));
                }
                if !is_owner {
                    return Err(AppError::NotFound(format!("Meme {}", target_id)));
                }
            }
            Ok(Some(meme.creator_id))
        }
        TargetKind::Template => {
            state
                .media()
                .get(&target_id.to_string())
                .await?
                .filter(|m| m.is_template && m.is_active)
                .ok_or_else(|| AppError::NotFound(format!("Template {}", target_id)))?;
            Ok(None)
        }
    }
}

pub async fn like(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, target_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let (kind, target_id) = parse_target(&kind, &target_id)?;
    check_target(&state, kind, target_id, Some(&user), true).await?;

    let like = Like {
        user_id: user.user_id,
        target_id,
        kind,
        created_at: Utc::now(),
    };
    state.likes().insert(&like).await.map_err(|e| match e {
        RepoError::Conflict { .. } => AppError::Conflict(format!("You already liked this {}", kind)),
        e => e.into(),
    })?;

    tracing::debug!(user_id = %user.user_id, %kind, %target_id, "Liked");
    Ok((StatusCode::CREATED, Json(like)))
}

pub async fn unlike(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, target_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let (kind, target_id) = parse_target(&kind, &target_id)?;
    if !state.likes().delete(&engagement_id(user.user_id, kind, target_id)).await? {
        return Err(AppError::NotFound("Like".to_string()));
    }
    tracing::debug!(user_id = %user.user_id, %kind, %target_id, "Unliked");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Debug)]
pub struct LikeSummary {
    pub count: usize,
    pub liked_by_me: bool,
}

pub async fn like_summary(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path((kind, target_id)): Path<(String, String)>,
) -> Result<Json<LikeSummary>, AppError> {
    let (kind, target_id) = parse_target(&kind, &target_id)?;
    check_target(&state, kind, target_id, viewer.as_ref(), false).await?;

    let likes = state
        .likes()
        .filter(|l| l.kind == kind && l.target_id == target_id)
        .await?;
    let liked_by_me = viewer.is_some_and(|v| likes.iter().any(|l| l.user_id == v.user_id));
    Ok(Json(LikeSummary {
        count: likes.len(),
        liked_by_me,
    }))
}

#[derive(Deserialize, Debug)]
pub struct ReviewRequest {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

fn validate_review(req: &ReviewRequest) -> Result<String, AppError> {
    validate_rating(req.rating)?;
    let comment = req.comment.trim().to_string();
    validate_len("comment", &comment, 0, 1_000)?;
    Ok(comment)
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, target_id)): Path<(String, String)>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (kind, target_id) = parse_target(&kind, &target_id)?;
    let comment = validate_review(&req)?;
    let owner = check_target(&state, kind, target_id, Some(&user), true).await?;
    if owner == Some(user.user_id) {
        return Err(AppError::InvalidInput("You cannot review your own meme".to_string()));
    }

    let now = Utc::now();
    let review = Review {
        user_id: user.user_id,
        target_id,
        kind,
        rating: req.rating,
        comment,
        created_at: now,
        updated_at: now,
    };
    state.reviews().insert(&review).await.map_err(|e| match e {
        RepoError::Conflict { .. } => AppError::Conflict(format!("You already reviewed this {}", kind)),
        e => e.into(),
    })?;

    tracing::debug!(user_id = %user.user_id, %kind, %target_id, rating = review.rating, "Reviewed");
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn update_review(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, target_id)): Path<(String, String)>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<Review>, AppError> {
    let (kind, target_id) = parse_target(&kind, &target_id)?;
    let comment = validate_review(&req)?;
    let mut review = state
        .reviews()
        .get(&engagement_id(user.user_id, kind, target_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Review".to_string()))?;
    // Edits follow the same visibility rule as new reviews.
    check_target(&state, kind, target_id, Some(&user), true).await?;

    review.rating = req.rating;
    review.comment = comment;
    review.updated_at = Utc::now();
    state.reviews().save(&review).await?;
    Ok(Json(review))
}

pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((kind, target_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let (kind, target_id) = parse_target(&kind, &target_id)?;
    if !state.reviews().delete(&engagement_id(user.user_id, kind, target_id)).await? {
        return Err(AppError::NotFound("Review".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, Debug)]
pub struct ReviewView {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct ReviewList {
    pub average_rating: Option<f64>,
    pub count: usize,
    pub reviews: Vec<ReviewView>,
}

pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path((kind, target_id)): Path<(String, String)>,
) -> Result<Json<ReviewList>, AppError> {
    let (kind, target_id) = parse_target(&kind, &target_id)?;
    check_target(&state, kind, target_id, viewer.as_ref(), false).await?;

    let mut reviews = state
        .reviews()
        .filter(|r| r.kind == kind && r.target_id == target_id)
        .await?;
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let reviewer_ids: HashSet<Uuid> = reviews.iter().map(|r| r.user_id).collect();
    let reviewers = OwnerIndex::new(state.users().filter(|u| reviewer_ids.contains(&u.user_id)).await?);
    let rating_sum: u64 = reviews.iter().map(|r| u64::from(r.rating)).sum();

    Ok(Json(ReviewList {
        average_rating: average(rating_sum, reviews.len()),
        count: reviews.len(),
        reviews: reviews
            .into_iter()
            .map(|r| ReviewView {
                username: reviewers.get(&r.user_id).map(|u| u.username.clone()),
                user_id: r.user_id,
                rating: r.rating,
                comment: r.comment,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect(),
    }))
}

pub async fn liked_memes(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<MemeView>>, AppError> {
    let liked: HashSet<Uuid> = state
        .likes()
        .filter(|l| l.user_id == user.user_id && l.kind == TargetKind::Meme)
        .await?
        .into_iter()
        .map(|l| l.target_id)
        .collect();
    let owners = OwnerIndex::new(state.users().list().await?);
    let mut memes = owners.visible(state.memes().filter(|m| liked.contains(&m.meme_id)).await?);
    memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let views = render_memes(&state, memes, &owners, Some(user.user_id), false).await?;
    Ok(Json(views))
}
