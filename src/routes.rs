use crate::{
    handlers::{self, accounts, admin, analytics, generation, market, media, memes, social, tickets},
    AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

fn account_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/auth/me", get(accounts::me))
        .route("/users/me", patch(accounts::update_me))
        .route("/users/me/password", put(accounts::change_password))
        .route("/users/me/avatar", post(accounts::upload_avatar))
        .route("/users/{id}", get(accounts::get_user))
        .route("/users/{id}/avatar", get(accounts::get_avatar))
        .route("/users/{id}/memes", get(accounts::user_memes))
}

fn meme_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/memes", get(memes::list_memes).post(memes::create_meme))
        .route("/memes/mine", get(memes::my_memes))
        .route("/memes/trending", get(memes::trending))
        .route("/memes/from-generated/{id}", post(memes::create_from_generated))
        .route(
            "/memes/{id}",
            get(memes::get_meme).patch(memes::update_meme).delete(memes::delete_meme),
        )
        .route("/memes/{id}/image", get(memes::get_meme_image))
        .route("/generate", post(generation::generate_image))
        .route("/generate/history", get(generation::history))
        .route("/generate/{id}", delete(generation::delete_generated))
        .route("/generate/{id}/file", get(generation::get_generated_file))
}

fn social_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/social/liked", get(social::liked_memes))
        .route(
            "/social/{kind}/{target_id}/like",
            post(social::like).delete(social::unlike),
        )
        .route("/social/{kind}/{target_id}/likes", get(social::like_summary))
        .route(
            "/social/{kind}/{target_id}/reviews",
            get(social::list_reviews).post(social::create_review),
        )
        .route(
            "/social/{kind}/{target_id}/reviews/mine",
            put(social::update_review).delete(social::delete_review),
        )
}

fn market_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/market/premium", get(market::premium_catalogue))
        .route("/market/memes/{id}/purchase", post(market::purchase))
        .route("/market/purchases", get(market::my_purchases))
        .route("/market/sales", get(market::my_sales))
        .route("/market/earnings", get(market::my_earnings))
        .route("/analytics/me", get(analytics::my_stats))
}

fn community_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/templates", get(media::list_templates))
        .route("/media/{id}/file", get(media::get_media_file))
        .route("/media/{id}/thumbnail", get(media::get_media_thumbnail))
        .route("/contact", post(tickets::create_contact))
        .route("/support", post(tickets::create_ticket))
        .route("/support/mine", get(tickets::my_tickets))
        .route(
            "/testimonials",
            get(tickets::list_testimonials).post(tickets::create_testimonial),
        )
        .route("/settings", get(admin::public_settings))
}

/// Everything under `/admin`; each handler checks its own permission.
fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/settings", get(admin::get_settings).put(admin::update_settings))
        .route("/users", get(admin::list_users))
        .route("/users/{id}/block", patch(admin::set_blocked))
        .route("/users/{id}/role", put(admin::set_role))
        .route("/roles", get(admin::list_roles).post(admin::create_role))
        .route("/roles/{name}", put(admin::update_role).delete(admin::delete_role))
        .route(
            "/permissions",
            get(admin::list_permissions).post(admin::create_permission),
        )
        .route("/permissions/{name}", delete(admin::delete_permission))
        .route("/memes", get(admin::list_all_memes))
        .route("/memes/{id}/moderation", patch(admin::moderate_meme))
        .route("/media", get(media::admin_list_media).post(media::upload_media))
        .route("/media/{id}", patch(media::update_media).delete(media::delete_media))
        .route("/contacts", get(tickets::list_contacts))
        .route(
            "/contacts/{id}",
            patch(tickets::update_contact).delete(tickets::delete_contact),
        )
        .route("/support", get(tickets::list_tickets))
        .route("/support/{id}", patch(tickets::update_ticket))
        .route("/testimonials", get(tickets::admin_list_testimonials))
        .route(
            "/testimonials/{id}",
            patch(tickets::review_testimonial).delete(tickets::delete_testimonial),
        )
        .route("/analytics/overview", get(analytics::overview))
        .route("/analytics/revenue", get(analytics::revenue))
}

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(handlers::health))
        .merge(account_routes())
        .merge(meme_routes())
        .merge(social_routes())
        .merge(market_routes())
        .merge(community_routes())
        .nest("/admin", admin_routes())
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
