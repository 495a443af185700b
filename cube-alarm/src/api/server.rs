//! Server setup and shared handler state.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use super::commands::CubeCommand;
use super::{events, v0};
use crate::broadcast::EventBroadcaster;
use crate::machine::MachineInput;
use crate::store::AlarmStore;
use crate::tracing::prelude::*;

/// State shared by every handler.
pub struct ApiState {
    pub store: Arc<AlarmStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub machine_tx: mpsc::Sender<MachineInput>,
    pub cube_cmd_tx: mpsc::Sender<CubeCommand>,

    /// Ends open push streams so graceful shutdown can complete.
    pub shutdown: CancellationToken,

    pub started: Instant,
}

pub type SharedState = Arc<ApiState>;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "cube-alarm",
        description = "Wake-up alarms dismissed by solving a smart cube",
    ),
    tags(
        (name = "alarms", description = "Alarm definitions and the active session"),
        (name = "cube", description = "Smart cube link"),
        (name = "status", description = "Daemon state and push channel"),
        (name = "health", description = "Liveness"),
    ),
)]
struct ApiDoc;

/// Build the application router with OpenAPI docs and request tracing.
pub fn router(state: SharedState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(v0::routes())
        .merge(events::routes())
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server failed")?;

    debug!("API server stopped");
    Ok(())
}
