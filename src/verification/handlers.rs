use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::{
    dto::{SendCodeRequest, SendCodeResponse, VerifyCodeRequest},
    services::{check_code, issue_code, normalize_email},
};
use crate::{
    auth::password::validate_new_password,
    error::{AppError, AppResult},
    state::AppState,
    users::{dto::AuthResponse, handlers::auth_response, services::register_verified},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/send_verification_code/", post(send_verification_code))
        .route("/users/verify_code/", post(verify_code))
}

#[instrument(skip(state, payload))]
pub async fn send_verification_code(
    State(state): State<AppState>,
    Json(payload): Json<SendCodeRequest>,
) -> AppResult<Json<SendCodeResponse>> {
    let (email, _code) = issue_code(
        state.store.as_ref(),
        state.mailer(),
        &payload.email,
        &payload.first_name,
        &payload.last_name,
    )
    .await?;
    Ok(Json(SendCodeResponse {
        message: format!("Verification code sent to {email}"),
        email,
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.code.trim().is_empty() {
        return Err(AppError::Validation("Email and code are required".into()));
    }
    validate_new_password(&payload.password)?;
    if state.store.find_active_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("This email is already registered".into()));
    }

    check_code(state.store.as_ref(), &email, &payload.code, OffsetDateTime::now_utc()).await?;
    let user = register_verified(
        state.store.as_ref(),
        &email,
        &payload.password,
        &payload.first_name,
        &payload.last_name,
    )
    .await?;
    info!(user_id = %user.id, "email verified and account created");
    Ok((StatusCode::CREATED, Json(auth_response(&state, &user)?)))
}
