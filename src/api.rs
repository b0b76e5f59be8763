use std::path::PathBuf;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::spawn;
use tracing::{error, info, warn};

use crate::{
    app_state::{AppState, Status},
    assembler,
    host::{StatusProgress, WorkspaceRoot},
    protocol::{InboundMessage, OutboundMessage},
    scanner::Scanner,
};

type ApiError = (StatusCode, Json<Value>);

fn api_error(code: StatusCode, message: impl Into<String>) -> ApiError {
    (code, Json(json!({ "error": message.into() })))
}

// --- Payloads ---

#[derive(Deserialize)]
pub struct SelectPathPayload {
    path: String,
}

#[derive(Deserialize)]
pub struct ActiveDocumentPayload {
    #[serde(default)]
    path: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/panel/messages", post(panel_message_handler))
        .route("/api/panel/events", get(panel_events_handler))
        .route("/api/analyze-project", post(analyze_project_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/select-workspace", post(select_workspace_handler))
        .route("/api/active-document", post(active_document_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers del panel ---

#[axum::debug_handler]
async fn panel_message_handler(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Result<StatusCode, ApiError> {
    state
        .panel
        .send_ui(InboundMessage::decode(raw))
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn panel_events_handler(State(state): State<AppState>) -> Json<Vec<OutboundMessage>> {
    Json(state.panel.drain_events())
}

// --- Órdenes del anfitrión ---

#[axum::debug_handler]
async fn analyze_project_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let root = state.host.workspace_root().ok_or_else(|| {
        api_error(StatusCode::BAD_REQUEST, "No hay una carpeta de trabajo abierta.")
    })?;

    {
        let mut status = state.status();
        if status.is_busy {
            return Err(api_error(StatusCode::CONFLICT, "Ya hay un análisis en curso."));
        }
        status.is_busy = true;
        status.message = "Analizando el proyecto...".to_string();
        status.progress = 0.0;
    }

    spawn(async move {
        let scanner = Scanner::new(state.config.exclusions.clone());
        let progress = StatusProgress::new(state.status.clone());
        let task_root = root.clone();
        let result = tokio::task::spawn_blocking(move || {
            assembler::analyze_project(&scanner, &task_root, &progress)
        })
        .await;

        let message = match result {
            Ok(Ok(project)) => {
                let files = project.snapshot.file_count();
                match state.panel.project_analyzed(project) {
                    Ok(()) => {
                        info!("Proyecto {} analizado ({} ficheros).", root.display(), files);
                        "Análisis del proyecto completado.".to_string()
                    }
                    Err(e) => format!("Error en el análisis: {e}"),
                }
            }
            Ok(Err(e)) => {
                error!("Error analizando {}: {e:#}", root.display());
                format!("Error en el análisis: {e:#}")
            }
            Err(e) => {
                error!("La tarea de análisis terminó de forma inesperada: {e}");
                format!("Error en el análisis: {e}")
            }
        };

        let mut status = state.status();
        status.is_busy = false;
        status.progress = 0.0;
        status.message = message;
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn reset_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.panel.reset().await {
        Ok(message) => Ok(Json(json!({ "message": message }))),
        Err(e) => {
            warn!("No se pudo reiniciar la conversación: {e:#}");
            Err(api_error(
                StatusCode::BAD_GATEWAY,
                format!("No se pudo reiniciar la conversación: {e:#}"),
            ))
        }
    }
}

#[axum::debug_handler]
async fn select_workspace_handler(
    State(state): State<AppState>,
    Json(payload): Json<SelectPathPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let path = PathBuf::from(&payload.path);
    if !path.is_dir() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "La ruta proporcionada no es un directorio válido.",
        ));
    }

    state.host.set_workspace(Some(path));
    Ok((StatusCode::OK, Json(json!({ "message": "Carpeta de trabajo fijada." }))))
}

#[axum::debug_handler]
async fn active_document_handler(
    State(state): State<AppState>,
    Json(payload): Json<ActiveDocumentPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let path = payload.path.filter(|p| !p.trim().is_empty()).map(PathBuf::from);
    if let Some(path) = &path {
        if !path.is_file() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "La ruta proporcionada no es un fichero válido.",
            ));
        }
    }

    let message = if path.is_some() { "Documento activo fijado." } else { "Sin documento activo." };
    state.host.set_document(path);
    Ok((StatusCode::OK, Json(json!({ "message": message }))))
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status().clone())
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    let sender = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    StatusCode::OK
}
