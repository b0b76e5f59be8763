// Módulos de la aplicación
mod api;
mod app_state;
mod assembler;
mod client;
mod config;
mod formatter;
mod history;
mod host;
mod models;
mod panel;
mod protocol;
mod scanner;

use crate::app_state::{AppState, Status};
use crate::client::ChatClient;
use crate::history::{ConversationStore, HistoryFile};
use crate::host::HostSelection;
use crate::panel::{PanelController, PanelHandle, PanelSettings};
use anyhow::{Context, Result};
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;
    info!(
        "Servicio de chat en {}, modo de contexto {:?}.",
        cfg.endpoint.chat_url()?,
        cfg.context_mode
    );

    // 3. Cliente del servicio de chat e historial
    let client = ChatClient::new(cfg.endpoint.clone())?;
    let mut store = ConversationStore::new(cfg.history.max_turns);
    if let Some(path) = &cfg.history.file {
        store = store.with_file(HistoryFile::new(path));
    }

    // 4. Capacidades del anfitrión y actor del panel
    let host = HostSelection::new(cfg.workspace_root.clone(), cfg.active_document.clone());
    let controller = PanelController::new(
        PanelSettings::from_config(&cfg),
        store,
        Arc::new(client),
        Arc::new(host.clone()),
        Arc::new(host.clone()),
    );
    let panel = PanelHandle::spawn(controller);

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        panel,
        host,
        status: Arc::new(Mutex::new(Status {
            is_busy: false,
            message: "Servidor listo.".to_string(),
            progress: 0.0,
        })),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    // Abrir el panel en el navegador por defecto
    if app_state.config.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
