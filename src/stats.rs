use axum::{extract::State, routing::get, Json, Router};

use crate::{db::GlobalStats, error::AppResult, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/stats/", get(global_stats))
}

/// Site-wide counters. The row is created with its defaults on first read.
pub async fn global_stats(State(state): State<AppState>) -> AppResult<Json<GlobalStats>> {
    Ok(Json(state.store.global_stats().await?))
}
