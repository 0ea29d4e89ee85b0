//! Webhook Receiver (§4.E) — the hub's verification GET and notification
//! POST, on a single path. Both handlers are short and synchronous with the
//! HTTP response, by design: the hub's at-least-once retry semantics depend
//! on a non-2xx reply actually triggering a retry.

use std::sync::Arc;

use axum::extract::{Query, State};
use jiff::Timestamp;
use quick_xml::DeError;
use reqwest::StatusCode;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use tokio::sync::Notify;

use entity_types::Source;

use crate::{feed::Feed, repository::webhook_events::WebhookEvents};

/// Query params the hub sends on its verification GET. `hub.topic` and
/// `hub.lease_seconds` are accepted but unused here — the lease is recorded
/// by D off the subscribe POST's own response, not by this handler (§4.E
/// implementation note / §9 open question).
#[derive(Debug, Deserialize)]
pub struct HubChallengeQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.topic")]
    pub topic: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
    #[serde(rename = "hub.lease_seconds")]
    #[allow(dead_code)]
    pub lease_seconds: Option<String>,
}

#[derive(Clone)]
pub struct WebhookState {
    pub db: DatabaseConnection,
    pub platform_host: String,
    pub video_queue_notify: Arc<Notify>,
}

/// `GET /webhook` — pure echo, no database writes (§4.E).
pub async fn verify(
    Query(query): Query<HubChallengeQuery>,
    State(state): State<WebhookState>,
) -> Result<(StatusCode, [(&'static str, &'static str); 1], String), StatusCode> {
    let (Some(_mode), Some(challenge)) = (query.mode, query.challenge) else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let topic_ok = match query.topic {
        Some(topic) => topic.contains(&state.platform_host),
        None => true,
    };
    if !topic_ok {
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok((StatusCode::OK, [("content-type", "text/plain")], challenge))
}

/// `POST /webhook` — 1 MiB body cap (enforced by a `tower` layer around this
/// router, see `server::router`), parse, insert, reply. A 500 here is
/// intentional: it makes the hub retry delivery (§4.E, §9 open question).
pub async fn notify(State(state): State<WebhookState>, body: String) -> StatusCode {
    if body.is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    let feed = match quick_xml::de::from_str::<Feed>(&body) {
        Ok(feed) => feed,
        Err(DeError::Custom(error)) => {
            tracing::warn!(%error, "webhook payload missing required fields");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        Err(error) => {
            tracing::warn!(%error, "webhook payload failed to parse");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let result = WebhookEvents::enqueue(
        &state.db,
        feed.entry.channel_id,
        feed.entry.video_id,
        feed.entry.title,
        body,
        Source::Webhook,
        Timestamp::now(),
    )
    .await;

    match result {
        Ok(_) => {
            state.video_queue_notify.notify_waiters();
            StatusCode::OK
        }
        Err(error) => {
            tracing::error!(%error, "failed to enqueue webhook event");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
