use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{PayUtilityRequest, PaymentResponse, UpdateStatsRequest},
    payment::{self, parse_decimal, PaymentRequest},
    recycling,
};
use crate::{
    auth::{AuthUser, MaybeAuthUser},
    db::LedgerEntry,
    error::{AppError, AppResult},
    state::AppState,
    users::{dto::UserView, services::resolve_subject},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/:id/update_stats/", post(update_stats))
        .route("/users/:id/pay_utility/", post(pay_utility))
        .route("/transactions/", get(list_transactions))
        .route("/transactions/:id/", get(get_transaction))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_stats(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatsRequest>,
) -> AppResult<Json<UserView>> {
    let added_balance = parse_decimal(payload.added_balance.as_ref())
        .ok_or_else(|| AppError::Validation("added_balance must be a number".into()))?;
    let added_kg = parse_decimal(payload.added_kg.as_ref())
        .ok_or_else(|| AppError::Validation("added_kg must be a number".into()))?;

    let subject = resolve_subject(state.store.as_ref(), caller.0, &id).await?;
    let user =
        recycling::update_stats(state.store.as_ref(), subject.id, added_balance, added_kg).await?;
    Ok(Json(UserView::from(&user)))
}

#[instrument(skip(state, caller, payload))]
pub async fn pay_utility(
    State(state): State<AppState>,
    caller: MaybeAuthUser,
    Path(id): Path<String>,
    Json(payload): Json<PayUtilityRequest>,
) -> AppResult<Json<PaymentResponse>> {
    let provider = payload.provider.trim().to_string();
    if provider.is_empty() {
        return Err(AppError::Validation("provider is required".into()));
    }
    let amount = parse_decimal(payload.amount.as_ref())
        .ok_or_else(|| AppError::Validation("amount must be a number".into()))?;

    let subject = resolve_subject(state.store.as_ref(), caller.0, &id).await?;
    let request = PaymentRequest {
        provider,
        account_number: payload.account_text(),
        amount,
    };
    let message = format!("{} payment successful", request.provider);
    let user = payment::pay(state.store.as_ref(), subject.id, request).await?;
    Ok(Json(PaymentResponse {
        user: UserView::from(&user),
        success: true,
        message,
    }))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<LedgerEntry>>> {
    Ok(Json(state.store.list_transactions(user_id).await?))
}

/// One of the caller's own entries; anyone else's is reported as missing.
pub async fn get_transaction(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<LedgerEntry>> {
    let not_found = || AppError::NotFound("Transaction not found".into());
    let id = Uuid::parse_str(&id).map_err(|_| not_found())?;
    let entry = state
        .store
        .find_transaction(user_id, id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(entry))
}
