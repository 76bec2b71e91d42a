use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{
        AuthResponse, CheckEmailRequest, CheckEmailResponse, GoogleAuthRequest, LoginRequest,
        MessageResponse, RefreshRequest, RegisterRequest, UpdateProfileRequest, UserView,
    },
    services,
};
use crate::{
    auth::{AuthUser, JwtKeys, MaybeAuthUser},
    db::User,
    error::{AppError, AppResult},
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register/", post(register))
        .route("/users/login/", post(login))
        .route("/users/google_auth/", post(google_auth))
        .route("/users/check_email/", post(check_email))
        .route("/users/refresh/", post(refresh))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me/", get(me))
        .route("/users/logout/", post(logout))
        .route("/users/:id/delete_account/", post(delete_account))
        .route(
            "/users/:id/",
            get(retrieve).patch(update_profile).put(update_profile),
        )
}

/// User view plus a freshly signed token pair.
pub fn auth_response(state: &AppState, user: &User) -> AppResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    Ok(AuthResponse {
        access_token: keys.sign_access(user.id)?,
        refresh_token: keys.sign_refresh(user.id)?,
        user: UserView::from(user),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let user = services::register(state.store.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(auth_response(&state, &user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user =
        services::login(state.store.as_ref(), &payload.username_or_email, &payload.password).await?;
    Ok(Json(auth_response(&state, &user)?))
}

#[instrument(skip(state, payload))]
pub async fn google_auth(
    State(state): State<AppState>,
    Json(payload): Json<GoogleAuthRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let (user, created) =
        services::google_sign_in(state.store.as_ref(), state.google.as_ref(), &payload.token)
            .await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(auth_response(&state, &user)?)))
}

pub async fn check_email(
    State(state): State<AppState>,
    Json(payload): Json<CheckEmailRequest>,
) -> AppResult<Json<CheckEmailResponse>> {
    let exists = services::email_registered(state.store.as_ref(), &payload.email).await?;
    let message = if exists {
        "This email is already registered"
    } else {
        "This email is available"
    };
    Ok(Json(CheckEmailResponse {
        exists,
        message: message.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::Unauthorized("Invalid refresh token".into())
    })?;
    let user = services::active_user(state.store.as_ref(), claims.sub).await?;
    Ok(Json(auth_response(&state, &user)?))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<UserView>> {
    let user = services::active_user(state.store.as_ref(), user_id).await?;
    Ok(Json(UserView::from(&user)))
}

pub async fn logout(AuthUser(user_id): AuthUser) -> Json<MessageResponse> {
    info!(%user_id, "user logged out");
    Json(MessageResponse {
        message: "Logged out".into(),
    })
}

#[instrument(skip(state, caller))]
pub async fn delete_account(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let user = services::resolve_subject(state.store.as_ref(), caller.0, &id).await?;
    services::soft_delete(state.store.as_ref(), user.id).await?;
    Ok(Json(MessageResponse {
        message: "Account deleted".into(),
    }))
}

#[instrument(skip(state))]
pub async fn retrieve(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<UserView>> {
    services::active_user(state.store.as_ref(), caller).await?;
    let user = services::resolve_subject(state.store.as_ref(), None, &id).await?;
    Ok(Json(UserView::from(&user)))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserView>> {
    let user = services::update_profile(state.store.as_ref(), caller, &id, &payload).await?;
    Ok(Json(UserView::from(&user)))
}
