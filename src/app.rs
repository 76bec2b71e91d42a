use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{ledger, stats, state::AppState, users, verification};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(users::router())
                .merge(verification::router())
                .merge(ledger::router())
                .merge(stats::router())
                .route("/", get(api_index))
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

async fn api_index() -> Json<Value> {
    Json(json!({
        "name": "EcoCash API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "register": "/api/users/register/",
            "login": "/api/users/login/",
            "google_auth": "/api/users/google_auth/",
            "send_verification_code": "/api/users/send_verification_code/",
            "verify_code": "/api/users/verify_code/",
            "check_email": "/api/users/check_email/",
            "refresh": "/api/users/refresh/",
            "logout": "/api/users/logout/",
            "me": "/api/users/me/",
            "update_stats": "/api/users/{id}/update_stats/",
            "pay_utility": "/api/users/{id}/pay_utility/",
            "delete_account": "/api/users/{id}/delete_account/",
            "user": "/api/users/{id}/",
            "transactions": "/api/transactions/",
            "transaction": "/api/transactions/{id}/",
            "stats": "/api/stats/",
        }
    }))
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
