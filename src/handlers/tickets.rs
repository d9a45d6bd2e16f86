//! Contact messages, support tickets and testimonials.

use super::{parse_id, validate_email, validate_len, validate_rating};
use crate::{
    auth::{permissions, AuthUser},
    errors::AppError,
    models::{Contact, ContactStatus, Support, SupportStatus, Testimonial},
    visibility::OwnerIndex,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// --- Contact ---

#[derive(Deserialize, Debug)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContactRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    let subject = req.subject.trim().to_string();
    let message = req.message.trim().to_string();
    validate_len("name", &name, 1, 100)?;
    validate_email(&email)?;
    validate_len("subject", &subject, 1, 200)?;
    validate_len("message", &message, 1, 5_000)?;

    let now = Utc::now();
    let contact = Contact {
        contact_id: Uuid::new_v4(),
        name,
        email,
        subject,
        message,
        status: ContactStatus::New,
        created_at: now,
        updated_at: now,
    };
    state.contacts().insert(&contact).await?;
    tracing::info!(contact_id = %contact.contact_id, "Contact message received");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "contact_id": contact.contact_id }))))
}

#[derive(Deserialize, Debug, Default)]
pub struct ContactFilter {
    pub status: Option<ContactStatus>,
}

pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(filter): Query<ContactFilter>,
) -> Result<Json<Vec<Contact>>, AppError> {
    auth_user.require(&state, permissions::MANAGE_SUPPORT).await?;
    let mut contacts = state
        .contacts()
        .filter(|c| filter.status.is_none_or(|s| c.status == s))
        .await?;
    contacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(contacts))
}

#[derive(Deserialize, Debug)]
pub struct ContactStatusRequest {
    pub status: ContactStatus,
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ContactStatusRequest>,
) -> Result<Json<Contact>, AppError> {
    auth_user.require(&state, permissions::MANAGE_SUPPORT).await?;
    let contact_id = parse_id(&id)?;
    let mut contact = state
        .contacts()
        .get(&contact_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Contact message {}", contact_id)))?;
    contact.status = req.status;
    contact.updated_at = Utc::now();
    state.contacts().save(&contact).await?;
    Ok(Json(contact))
}

pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    auth_user.require(&state, permissions::MANAGE_SUPPORT).await?;
    let contact_id = parse_id(&id)?;
    if !state.contacts().delete(&contact_id.to_string()).await? {
        return Err(AppError::NotFound(format!("Contact message {}", contact_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Support ---

#[derive(Deserialize, Debug)]
pub struct SupportRequest {
    pub subject: String,
    pub message: String,
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<SupportRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subject = req.subject.trim().to_string();
    let message = req.message.trim().to_string();
    validate_len("subject", &subject, 1, 200)?;
    validate_len("message", &message, 1, 5_000)?;

    let now = Utc::now();
    let ticket = Support {
        ticket_id: Uuid::new_v4(),
        user_id: user.user_id,
        subject,
        message,
        status: SupportStatus::Open,
        admin_response: None,
        responded_by: None,
        created_at: now,
        updated_at: now,
    };
    state.support_tickets().insert(&ticket).await?;
    tracing::info!(ticket_id = %ticket.ticket_id, user_id = %user.user_id, "Support ticket opened");
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn my_tickets(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Support>>, AppError> {
    let mut tickets = state
        .support_tickets()
        .filter(|t| t.user_id == user.user_id)
        .await?;
    tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(tickets))
}

#[derive(Deserialize, Debug, Default)]
pub struct SupportFilter {
    pub status: Option<SupportStatus>,
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(filter): Query<SupportFilter>,
) -> Result<Json<Vec<Support>>, AppError> {
    auth_user.require(&state, permissions::MANAGE_SUPPORT).await?;
    let mut tickets = state
        .support_tickets()
        .filter(|t| filter.status.is_none_or(|s| t.status == s))
        .await?;
    tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(tickets))
}

#[derive(Deserialize, Debug)]
pub struct SupportUpdateRequest {
    pub status: Option<SupportStatus>,
    pub response: Option<String>,
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<SupportUpdateRequest>,
) -> Result<Json<Support>, AppError> {
    auth_user.require(&state, permissions::MANAGE_SUPPORT).await?;
    let ticket_id = parse_id(&id)?;
    let mut ticket = state
        .support_tickets()
        .get(&ticket_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Support ticket {}", ticket_id)))?;

    if let Some(response) = req.response {
        let response = response.trim().to_string();
        validate_len("response", &response, 1, 5_000)?;
        ticket.admin_response = Some(response);
        ticket.responded_by = Some(auth_user.id());
        // Answering an open ticket moves it along unless a status was given.
        if req.status.is_none() && ticket.status == SupportStatus::Open {
            ticket.status = SupportStatus::InProgress;
        }
    }
    if let Some(status) = req.status {
        ticket.status = status;
    }
    ticket.updated_at = Utc::now();
    state.support_tickets().save(&ticket).await?;

    tracing::info!(%ticket_id, status = ?ticket.status, "Support ticket updated");
    Ok(Json(ticket))
}

// --- Testimonials ---

#[derive(Deserialize, Debug)]
pub struct TestimonialRequest {
    pub content: String,
    pub rating: u8,
}

pub async fn create_testimonial(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<TestimonialRequest>,
) -> Result<impl IntoResponse, AppError> {
    let content = req.content.trim().to_string();
    validate_len("content", &content, 10, 1_000)?;
    validate_rating(req.rating)?;

    let testimonial = Testimonial {
        testimonial_id: Uuid::new_v4(),
        user_id: user.user_id,
        content,
        rating: req.rating,
        is_approved: false,
        created_at: Utc::now(),
    };
    state.testimonials().insert(&testimonial).await?;
    Ok((StatusCode::CREATED, Json(testimonial)))
}

#[derive(Serialize, Debug)]
pub struct TestimonialView {
    pub testimonial_id: Uuid,
    pub username: Option<String>,
    pub content: String,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
}

pub async fn list_testimonials(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TestimonialView>>, AppError> {
    let mut approved = state.testimonials().filter(|t| t.is_approved).await?;
    approved.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let authors = OwnerIndex::new(state.users().list().await?);

    Ok(Json(
        approved
            .into_iter()
            .map(|t| TestimonialView {
                username: authors.get(&t.user_id).map(|u| u.username.clone()),
                testimonial_id: t.testimonial_id,
                content: t.content,
                rating: t.rating,
                created_at: t.created_at,
            })
            .collect(),
    ))
}

pub async fn admin_list_testimonials(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<Vec<Testimonial>>, AppError> {
    auth_user.require(&state, permissions::MODERATE_CONTENT).await?;
    let mut all = state.testimonials().list().await?;
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(all))
}

#[derive(Deserialize, Debug)]
pub struct ApprovalRequest {
    pub is_approved: bool,
}

pub async fn review_testimonial(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<ApprovalRequest>,
) -> Result<Json<Testimonial>, AppError> {
    auth_user.require(&state, permissions::MODERATE_CONTENT).await?;
    let testimonial_id = parse_id(&id)?;
    let mut testimonial = state
        .testimonials()
        .get(&testimonial_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Testimonial {}", testimonial_id)))?;
    testimonial.is_approved = req.is_approved;
    state.testimonials().save(&testimonial).await?;
    tracing::info!(%testimonial_id, approved = req.is_approved, "Testimonial reviewed");
    Ok(Json(testimonial))
}

pub async fn delete_testimonial(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    auth_user.require(&state, permissions::MODERATE_CONTENT).await?;
    let testimonial_id = parse_id(&id)?;
    if !state.testimonials().delete(&testimonial_id.to_string()).await? {
        return Err(AppError::NotFound(format!("Testimonial {}", testimonial_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

