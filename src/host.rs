//! Servicios del entorno anfitrión expuestos como capacidades: documento
//! activo, raíz del proyecto y avance de tareas largas.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::app_state::Status;
use crate::models::ActiveDocument;

pub trait DocumentSource: Send + Sync {
    /// `None` cuando no hay ningún documento abierto.
    fn active_document(&self) -> Option<ActiveDocument>;
}

pub trait WorkspaceRoot: Send + Sync {
    fn workspace_root(&self) -> Option<PathBuf>;
}

pub trait ProgressSink: Send + Sync {
    /// `increment` en puntos porcentuales (0..=100).
    fn report(&self, increment: f32, message: &str);
}

/// Selección hecha desde la interfaz: carpeta de trabajo y fichero abierto.
#[derive(Clone, Default)]
pub struct HostSelection {
    workspace: Arc<Mutex<Option<PathBuf>>>,
    document: Arc<Mutex<Option<PathBuf>>>,
}

impl HostSelection {
    pub fn new(workspace: Option<PathBuf>, document: Option<PathBuf>) -> Self {
        Self {
            workspace: Arc::new(Mutex::new(workspace)),
            document: Arc::new(Mutex::new(document)),
        }
    }

    pub fn set_workspace(&self, path: Option<PathBuf>) {
        *self.workspace.lock().unwrap_or_else(PoisonError::into_inner) = path;
    }

    pub fn set_document(&self, path: Option<PathBuf>) {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = path;
    }
}

impl WorkspaceRoot for HostSelection {
    fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl DocumentSource for HostSelection {
    fn active_document(&self) -> Option<ActiveDocument> {
        let path = self.document.lock().unwrap_or_else(PoisonError::into_inner).clone()?;
        match fs::read_to_string(&path) {
            Ok(text) => Some(ActiveDocument { path, text }),
            Err(e) => {
                warn!("No se pudo leer el documento activo {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Vuelca el avance en el estado que consulta el frontend.
#[derive(Clone)]
pub struct StatusProgress {
    status: Arc<Mutex<Status>>,
}

impl StatusProgress {
    pub fn new(status: Arc<Mutex<Status>>) -> Self {
        Self { status }
    }
}

impl ProgressSink for StatusProgress {
    fn report(&self, increment: f32, message: &str) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.progress = (status.progress + increment / 100.0).min(1.0);
        status.message = message.to_string();
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _increment: f32, _message: &str) {}
}
