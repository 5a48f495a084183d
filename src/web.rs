use crate::config::AppConfig;
use crate::error::{ErrorKind, PollError};
use crate::poller::{PollState, ScanPoller};
use crate::ui;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    http::{StatusCode, header},
    response::{Html, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub poller: Arc<ScanPoller>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/dashboard", get(dashboard))
        .route("/api/scan", post(scan))
        .route("/api/poll", post(poll))
        .route("/download/csv", get(download_csv))
        .route("/ws/dashboard", get(ws_dashboard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = state.config.http_bind.parse()?;
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("UI listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(graceful_shutdown())
        .await?;

    Ok(())
}

async fn graceful_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down http server");
}

async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let dash = state.poller.dashboard().await;
    Html(ui::render_html(&state.config.backend_url, &dash))
}

#[derive(Serialize)]
struct DashboardResponse {
    state: PollState,
    #[serde(flatten)]
    snapshot: crate::dashboard::DashboardSnapshot,
}

async fn dashboard(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.poller.dashboard().await.snapshot();
    Json(DashboardResponse {
        state: state.poller.state(),
        snapshot,
    })
}

/// Form fields arrive as text from the page but may be numbers from scripts.
#[derive(Deserialize)]
#[serde(untagged)]
enum CoordinateInput {
    Number(f64),
    Text(String),
}

impl CoordinateInput {
    fn into_text(self) -> String {
        match self {
            CoordinateInput::Number(n) => n.to_string(),
            CoordinateInput::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct ScanBody {
    latitude: Option<CoordinateInput>,
    longitude: Option<CoordinateInput>,
}

async fn scan(
    State(state): State<AppState>,
    Json(body): Json<ScanBody>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let lat = body.latitude.map(CoordinateInput::into_text).unwrap_or_default();
    let lon = body.longitude.map(CoordinateInput::into_text).unwrap_or_default();
    let snapshot = state
        .poller
        .scan_input(&lat, &lon)
        .await
        .map_err(error_response)?;
    Ok(Json(snapshot))
}

async fn poll(State(state): State<AppState>) -> Result<impl IntoResponse, (StatusCode, String)> {
    let snapshot = state.poller.poll().await.map_err(error_response)?;
    Ok(Json(snapshot))
}

async fn download_csv(State(state): State<AppState>) -> impl IntoResponse {
    let csv = state.poller.dashboard().await.table.to_csv();
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"devices.csv\""),
        ],
        csv,
    )
}

fn error_response(err: PollError) -> (StatusCode, String) {
    let status = match err.kind() {
        ErrorKind::Input => StatusCode::BAD_REQUEST,
        ErrorKind::Network | ErrorKind::Decode => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}

async fn ws_dashboard(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_dashboard(socket, state))
}

async fn handle_ws_dashboard(mut socket: WebSocket, state: AppState) {
    let mut rx = state.poller.subscribe();
    if send_fragment(&mut socket, &state).await.is_err() {
        return;
    }
    loop {
        match rx.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
        if send_fragment(&mut socket, &state).await.is_err() {
            break;
        }
    }
}

async fn send_fragment(socket: &mut WebSocket, state: &AppState) -> Result<(), ()> {
    let payload = {
        let dash = state.poller.dashboard().await;
        ui::render_live(&dash)
    };
    socket.send(Message::Text(payload)).await.map_err(|_| ())
}
