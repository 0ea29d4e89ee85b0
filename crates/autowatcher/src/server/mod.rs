//! HTTP server wiring: the webhook surface (E), the diagnostics JSON
//! surface (H), and the internal RPC surface (§6), behind one `axum`
//! router — mirroring the reference deployment's single-server layout.

mod diagnostics;
mod rpc;
mod webhook;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::IntoResponse as _,
    routing::{get, post},
};
use reqwest::StatusCode;
use sea_orm::DatabaseConnection;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use platform_client::PlatformClient;
use token_vault::TokenVault;

use webhook::WebhookState;

pub use rpc::{DepositCodeRequest, RpcState};

/// Generous size cap on the webhook POST body (§4.E).
const WEBHOOK_BODY_LIMIT: usize = 1024 * 1024;

/// `OPERATOR_TOKEN` header-based auth, gating the diagnostics and RPC
/// surfaces — the same shared-secret-header pattern the reference
/// deployment uses for its own admin routes.
const OPERATOR_TOKEN_HEADER: &str = "x-operator-token";

async fn require_operator_token(
    State(operator_token): State<Arc<String>>,
    request: Request,
    next: Next,
) -> axum::response::Response {
    let provided = request
        .headers()
        .get(OPERATOR_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(token) if token == operator_token.as_str() => next.run(request).await,
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

pub async fn run(
    shutdown: CancellationToken,
    bind_addr: String,
    db: DatabaseConnection,
    client: PlatformClient,
    vault: Arc<TokenVault>,
    operator_token: String,
    platform_host: String,
    video_queue_notify: Arc<Notify>,
    websub_notify: Arc<Notify>,
) -> color_eyre::Result<()> {
    use color_eyre::eyre::Context as _;

    let webhook_state = WebhookState {
        db: db.clone(),
        platform_host,
        video_queue_notify,
    };

    let webhook_router = Router::new()
        .route("/webhook", get(webhook::verify).post(webhook::notify))
        .layer(RequestBodyLimitLayer::new(WEBHOOK_BODY_LIMIT))
        .with_state(webhook_state);

    let rpc_state = RpcState {
        db: db.clone(),
        client,
        vault,
        websub_notify,
    };

    let operator_token = Arc::new(operator_token);

    let diagnostics_router = Router::new()
        .route("/diagnostics/summary", get(diagnostics::summary))
        .route("/diagnostics/quota", get(diagnostics::quota))
        .route("/diagnostics/failed-jobs", get(diagnostics::failed_jobs))
        .route(
            "/diagnostics/unprocessed-events",
            get(diagnostics::unprocessed_events),
        )
        .with_state(db)
        .layer(middleware::from_fn_with_state(
            operator_token.clone(),
            require_operator_token,
        ));

    let rpc_router = Router::new()
        .route("/rpc/deposit-authorization-code", post(rpc::deposit_authorization_code))
        .route("/rpc/bootstrap-subscriptions", post(rpc::bootstrap_subscriptions))
        .with_state(rpc_state)
        .layer(middleware::from_fn_with_state(
            operator_token,
            require_operator_token,
        ));

    let router = Router::new()
        .merge(webhook_router)
        .merge(diagnostics_router)
        .merge(rpc_router)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        );

    axum::serve(
        tokio::net::TcpListener::bind(&bind_addr)
            .await
            .wrap_err_with(|| format!("unable to bind to {bind_addr}"))?,
        router.into_make_service(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .wrap_err("failed to run axum server")
}
