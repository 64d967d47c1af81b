use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::coordinator;
use crate::coordinator::CoordinatorHandle;
use crate::coordinator::TheaterState;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// Current theater state plus the choices a UI needs to offer.
#[derive(Serialize)]
struct StateResponse {
    #[serde(flatten)]
    state: TheaterState,
    source_list: Vec<String>,
    scene_names: Vec<String>,
    has_screen_stop: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct PowerRequest {
    on: bool,
}

#[derive(Debug, Deserialize)]
struct MuteRequest {
    muted: bool,
}

#[derive(Debug, Deserialize)]
struct VolumeRequest {
    volume_level: f64,
}

#[derive(Debug, Deserialize)]
struct SourceRequest {
    source: String,
}

#[derive(Debug, Deserialize)]
struct SceneRequest {
    scene_name: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    theater: CoordinatorHandle,
}

enum ApiError {
    BadRequest(String),
    Coordinator(coordinator::Error),
}

impl From<coordinator::Error> for ApiError {
    fn from(e: coordinator::Error) -> Self {
        ApiError::Coordinator(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Coordinator(e @ coordinator::Error::Stopped) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ApiError::Coordinator(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

type ApiResult = Result<Json<StateResponse>, ApiError>;

fn state_response(theater: &CoordinatorHandle) -> Json<StateResponse> {
    Json(StateResponse {
        state: TheaterState::clone(&theater.state()),
        source_list: theater.source_list(),
        scene_names: theater.scene_names(),
        has_screen_stop: theater.has_screen_stop(),
    })
}

fn check_volume(volume_level: f64) -> Result<f64, ApiError> {
    if (0.0..=1.0).contains(&volume_level) {
        Ok(volume_level)
    } else {
        Err(ApiError::BadRequest(format!(
            "volume_level must be between 0.0 and 1.0, got {}",
            volume_level
        )))
    }
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    state_response(&state.theater)
}

#[tracing::instrument(skip(state))]
async fn amp_power(State(state): State<Arc<AppState>>, Json(req): Json<PowerRequest>) -> ApiResult {
    if req.on {
        state.theater.power_on().await?;
    } else {
        state.theater.power_off().await?;
    }
    Ok(state_response(&state.theater))
}

async fn volume_up(State(state): State<Arc<AppState>>) -> ApiResult {
    state.theater.volume_up().await?;
    Ok(state_response(&state.theater))
}

async fn volume_down(State(state): State<Arc<AppState>>) -> ApiResult {
    state.theater.volume_down().await?;
    Ok(state_response(&state.theater))
}

async fn mute_toggle(State(state): State<Arc<AppState>>) -> ApiResult {
    state.theater.mute_toggle().await?;
    Ok(state_response(&state.theater))
}

#[tracing::instrument(skip(state))]
async fn set_muted(State(state): State<Arc<AppState>>, Json(req): Json<MuteRequest>) -> ApiResult {
    state.theater.set_muted(req.muted).await?;
    Ok(state_response(&state.theater))
}

#[tracing::instrument(skip(state))]
async fn set_volume(State(state): State<Arc<AppState>>, Json(req): Json<VolumeRequest>) -> ApiResult {
    let level = check_volume(req.volume_level)?;
    state.theater.set_volume_level(level).await?;
    Ok(state_response(&state.theater))
}

#[tracing::instrument(skip(state))]
async fn sync_volume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VolumeRequest>,
) -> ApiResult {
    let level = check_volume(req.volume_level)?;
    state.theater.sync_volume(level).await?;
    Ok(state_response(&state.theater))
}

#[tracing::instrument(skip(state))]
async fn select_source(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SourceRequest>,
) -> ApiResult {
    state.theater.select_source(req.source).await?;
    Ok(state_response(&state.theater))
}

async fn screen_up(State(state): State<Arc<AppState>>) -> ApiResult {
    state.theater.screen_up().await?;
    Ok(state_response(&state.theater))
}

async fn screen_down(State(state): State<Arc<AppState>>) -> ApiResult {
    state.theater.screen_down().await?;
    Ok(state_response(&state.theater))
}

async fn screen_stop(State(state): State<Arc<AppState>>) -> ApiResult {
    state.theater.screen_stop().await?;
    Ok(state_response(&state.theater))
}

#[tracing::instrument(skip(state))]
async fn activate_scene(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SceneRequest>,
) -> ApiResult {
    state.theater.activate_scene(req.scene_name).await?;
    Ok(state_response(&state.theater))
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/state", get(get_state))
        .route("/v1/amp/power", post(amp_power))
        .route("/v1/amp/volume_up", post(volume_up))
        .route("/v1/amp/volume_down", post(volume_down))
        .route("/v1/amp/mute_toggle", post(mute_toggle))
        .route("/v1/amp/mute", post(set_muted))
        .route("/v1/amp/volume", post(set_volume))
        .route("/v1/amp/volume/sync", post(sync_volume))
        .route("/v1/source", post(select_source))
        .route("/v1/screen/up", post(screen_up))
        .route("/v1/screen/down", post(screen_down))
        .route("/v1/screen/stop", post(screen_stop))
        .route("/v1/scenes/activate", post(activate_scene))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Serves until `shutdown_rx` fires. Requests are forwarded to the theater
/// coordinator behind `theater`.
pub async fn serve(
    config: ApiConfig,
    theater: CoordinatorHandle,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, theater });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
