//! HTTP handlers for the internal RPC surface (§6); thin wrappers around
//! [`crate::rpc`]'s pass-throughs.

use std::sync::Arc;

use axum::{Json, extract::State};
use reqwest::StatusCode;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use tokio::sync::Notify;

use platform_client::{PlatformClient, PlatformError};
use token_vault::TokenVault;

#[derive(Clone)]
pub struct RpcState {
    pub db: DatabaseConnection,
    pub client: PlatformClient,
    pub vault: Arc<TokenVault>,
    pub websub_notify: Arc<Notify>,
}

#[derive(Debug, Deserialize)]
pub struct DepositCodeRequest {
    pub user_id: i64,
    pub code: String,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    pub user_id: i64,
}

fn status_for(error: &PlatformError) -> StatusCode {
    match error {
        PlatformError::Unauthorized => StatusCode::UNAUTHORIZED,
        PlatformError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        PlatformError::NotFound => StatusCode::NOT_FOUND,
        PlatformError::Malformed(_) => StatusCode::BAD_REQUEST,
        PlatformError::Transient(_) => StatusCode::BAD_GATEWAY,
    }
}

pub async fn deposit_authorization_code(
    State(state): State<RpcState>,
    Json(request): Json<DepositCodeRequest>,
) -> StatusCode {
    let result = crate::rpc::deposit_authorization_code(
        &state.db,
        &state.client,
        &state.vault,
        request.user_id,
        &request.code,
        &request.redirect_uri,
    )
    .await;

    match result {
        Ok(()) => StatusCode::OK,
        Err(error) => {
            tracing::warn!(%error, user_id = request.user_id, "deposit-authorization-code rpc failed");
            status_for(&error)
        }
    }
}

pub async fn bootstrap_subscriptions(
    State(state): State<RpcState>,
    Json(request): Json<BootstrapRequest>,
) -> StatusCode {
    let result = crate::rpc::bootstrap_subscriptions(
        &state.db,
        &state.client,
        &state.vault,
        &state.websub_notify,
        request.user_id,
    )
    .await;

    match result {
        Ok(()) => StatusCode::OK,
        Err(error) => {
            tracing::warn!(%error, user_id = request.user_id, "bootstrap-subscriptions rpc failed");
            status_for(&error)
        }
    }
}
