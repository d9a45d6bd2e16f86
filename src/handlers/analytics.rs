use crate::{
    analytics::{self, CreatorStats, DailyRevenue, EngagementIndex, PlatformOverview},
    auth::{permissions, AuthUser},
    errors::AppError,
    models::TargetKind,
    visibility::OwnerIndex,
    AppState,
};
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::{collections::HashSet, sync::Arc};

pub async fn my_stats(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<CreatorStats>, AppError> {
    let own = state.memes().filter(|m| m.creator_id == user.user_id).await?;
    let own_ids: HashSet<_> = own.iter().map(|m| m.meme_id).collect();
    let likes = state
        .likes()
        .filter(|l| l.kind == TargetKind::Meme && own_ids.contains(&l.target_id))
        .await?;
    let reviews = state
        .reviews()
        .filter(|r| r.kind == TargetKind::Meme && own_ids.contains(&r.target_id))
        .await?;
    let sales = state.transactions().filter(|tx| tx.seller_id == user.user_id).await?;

    let engagement = EngagementIndex::build(TargetKind::Meme, &likes, &reviews);
    Ok(Json(analytics::creator_stats(&own, &engagement, &sales)))
}

pub async fn overview(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<PlatformOverview>, AppError> {
    auth_user.require(&state, permissions::VIEW_ANALYTICS).await?;
    let owners = OwnerIndex::new(state.users().list().await?);
    let memes = state.memes().list().await?;
    let like_count = state.likes().list().await?.len();
    let review_count = state.reviews().list().await?.len();
    let transactions = state.transactions().list().await?;

    Ok(Json(analytics::platform_overview(
        &owners,
        &memes,
        like_count,
        review_count,
        &transactions,
    )))
}

#[derive(Deserialize, Debug)]
pub struct RevenueQuery {
    pub days: Option<u32>,
}

pub async fn revenue(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<Vec<DailyRevenue>>, AppError> {
    auth_user.require(&state, permissions::VIEW_ANALYTICS).await?;
    let days = query.days.unwrap_or(30).clamp(1, 365);
    let transactions = state.transactions().list().await?;
    Ok(Json(analytics::daily_revenue(&transactions, Utc::now().date_naive(), days)))
}
