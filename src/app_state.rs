use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use crate::{config::AppConfig, host::HostSelection, panel::PanelHandle};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub panel: PanelHandle,
    pub host: HostSelection,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn status(&self) -> std::sync::MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
