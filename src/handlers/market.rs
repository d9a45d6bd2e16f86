use super::{
    memes::{load_meme, load_owner, render_memes},
    parse_id, MemeView,
};
use crate::{
    auth::{AuthUser, MaybeAuthUser},
    errors::{AppError, RepoError},
    ledger::{self, EarningsSummary},
    models::Transaction,
    visibility::{is_community_visible, OwnerIndex},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

pub async fn premium_catalogue(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(viewer): MaybeAuthUser,
) -> Result<Json<Vec<MemeView>>, AppError> {
    let owners = OwnerIndex::new(state.users().list().await?);
    let mut memes: Vec<_> = owners
        .visible(state.memes().filter(|m| m.is_premium && m.price_cents.is_some()).await?);
    memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let views = render_memes(&state, memes, &owners, viewer.map(|v| v.user_id), false).await?;
    Ok(Json(views))
}

/// Records a premium purchase at the current commission rate.
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    AuthUser(buyer): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let meme_id = parse_id(&id)?;
    let meme = load_meme(&state, meme_id).await?;
    let owner = load_owner(&state, &meme).await?;
    let price = ledger::check_purchase(buyer.user_id, &meme, is_community_visible(&meme, owner.as_ref()))?;

    let settings = state.platform_settings().await?;
    let transaction = ledger::record_sale(buyer.user_id, &meme, price, &settings, Utc::now());

    // The purchase id is (buyer, meme); a second purchase loses the conditional insert.
    state.transactions().insert(&transaction).await.map_err(|e| match e {
        RepoError::Conflict { .. } => AppError::Conflict("You already purchased this meme".to_string()),
        e => e.into(),
    })?;

    tracing::info!(
        reference = %transaction.reference,
        buyer_id = %buyer.user_id,
        seller_id = %transaction.seller_id,
        %meme_id,
        price_cents = transaction.price_cents,
        platform_cents = transaction.platform_earnings_cents,
        "Premium meme purchased"
    );
    Ok((StatusCode::CREATED, Json(transaction)))
}

async fn sorted_transactions<F>(state: &AppState, predicate: F) -> Result<Vec<Transaction>, AppError>
where
    F: Fn(&Transaction) -> bool,
{
    let mut rows = state.transactions().filter(predicate).await?;
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rows)
}

pub async fn my_purchases(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(sorted_transactions(&state, |tx| tx.buyer_id == user.user_id).await?))
}

pub async fn my_sales(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(sorted_transactions(&state, |tx| tx.seller_id == user.user_id).await?))
}

pub async fn my_earnings(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<EarningsSummary>, AppError> {
    let sales = state.transactions().filter(|tx| tx.seller_id == user.user_id).await?;
    Ok(Json(EarningsSummary::from_sales(&sales)))
}
