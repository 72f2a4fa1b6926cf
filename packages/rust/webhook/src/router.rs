//! Router construction and handlers for the webhook server.

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware as axum_mw};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use docenrich_core::{EnrichmentQueue, QueueStats};

use crate::auth::{JwtConfig, jwt_auth};
use crate::events::{EventPayload, WebhookEvent};

/// `{status}` acknowledgement body, with the job id when one was queued.
#[derive(Debug, Clone, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

impl StatusBody {
    pub fn new(status: &'static str) -> Self {
        Self {
            status,
            job_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    queue: QueueStats,
}

/// Build the router: `/webhook` behind the JWT gate, `/health` open.
pub fn build_router(queue: EnrichmentQueue, jwt: JwtConfig) -> Router {
    let protected = Router::new()
        .route("/webhook", post(webhook))
        .layer(axum_mw::from_fn(jwt_auth))
        .layer(Extension(jwt));

    let public = Router::new().route("/health", get(health));

    public.merge(protected).layer(Extension(queue))
}

async fn webhook(
    Extension(queue): Extension<EnrichmentQueue>,
    body: Bytes,
) -> (StatusCode, Json<StatusBody>) {
    let event = match WebhookEvent::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejected webhook event");
            return (StatusCode::BAD_REQUEST, Json(StatusBody::new("bad request")));
        }
    };

    info!(
        event = event.name(),
        instance_id = event.instance_id.as_deref().unwrap_or(""),
        "received webhook event"
    );

    match event.payload {
        EventPayload::Ping => (StatusCode::OK, Json(StatusBody::new("ok"))),
        EventPayload::BatchCreated(batch) => match queue.submit(batch) {
            Ok(ticket) => (
                StatusCode::ACCEPTED,
                Json(StatusBody {
                    status: "accepted",
                    job_id: Some(ticket.job_id),
                }),
            ),
            Err(e) => {
                warn!(error = %e, "could not queue batch");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(StatusBody::new("unavailable")),
                )
            }
        },
    }
}

async fn health(Extension(queue): Extension<EnrichmentQueue>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        queue: queue.stats(),
    })
}
