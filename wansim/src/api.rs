use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::instrument;
use wansim_tc::{Engine, Interface};

use crate::error::Result;

/// State shared by all handlers.
pub type AppState = Arc<Engine>;

/// Builds the control-plane router over `engine`.
pub fn router(engine: AppState) -> Router {
    Router::new()
        .route("/", get(handle_default))
        .route("/api/listInterfaces", get(list_interfaces))
        .route("/api/showInterface/{iface}", get(show_interface))
        .route("/api/showInterfaces", get(show_interfaces))
        .route("/api/impairInterface/{iface}/{loss}/{delay}", post(impair_interface))
        .route("/api/clearInterface/{iface}", post(clear_interface))
        .route("/api/clearInterfaces", post(clear_interfaces))
        .route("/api/randomizeImpair", post(randomize_impair))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("authorization"),
        ])
}

async fn handle_default() -> &'static str {
    "nothing to see here..."
}

#[instrument(skip_all)]
async fn list_interfaces(State(engine): State<AppState>) -> Json<Vec<String>> {
    Json(engine.list_interfaces().await)
}

#[instrument(skip(engine))]
async fn show_interface(
    State(engine): State<AppState>,
    Path(iface): Path<String>,
) -> Result<Json<Interface>> {
    Ok(Json(engine.show_interface(&iface).await?))
}

#[instrument(skip_all)]
async fn show_interfaces(State(engine): State<AppState>) -> Result<Json<Vec<Interface>>> {
    Ok(Json(engine.show_interfaces().await?))
}

#[instrument(skip(engine))]
async fn impair_interface(
    State(engine): State<AppState>,
    Path((iface, loss, delay)): Path<(String, i64, i64)>,
) -> Result<impl IntoResponse> {
    engine.impair_interface(&iface, loss, delay).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(engine))]
async fn clear_interface(
    State(engine): State<AppState>,
    Path(iface): Path<String>,
) -> Result<impl IntoResponse> {
    engine.clear_interface(&iface).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all)]
async fn clear_interfaces(State(engine): State<AppState>) -> Result<impl IntoResponse> {
    engine.clear_interfaces().await?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all)]
async fn randomize_impair(State(engine): State<AppState>) -> Result<impl IntoResponse> {
    let control = engine.randomize_impair().await?;
    tracing::debug!(left = %control.left, right = %control.right, "control pair left clean");
    Ok(StatusCode::OK)
}
