//! Modelos de dominio: entradas del proyecto, turnos de conversación y
//! documento activo.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fichero regular descubierto bajo la raíz del proyecto.
/// El contenido se lee bajo demanda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
}

/// Elemento de un escaneo, en orden de recorrido.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEntry {
    Directory(PathBuf),
    File(FileEntry),
}

/// Resultado de un escaneo completo. Se reconstruye entero en cada análisis.
#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    pub root: PathBuf,
    pub entries: Vec<ProjectEntry>,
}

impl ProjectSnapshot {
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter_map(|e| match e {
            ProjectEntry::File(f) => Some(f),
            ProjectEntry::Directory(_) => None,
        })
    }

    pub fn file_count(&self) -> usize {
        self.files().count()
    }
}

/// Snapshot junto con el texto completo ya ensamblado a partir de él.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub snapshot: ProjectSnapshot,
    pub blob: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// Un mensaje registrado en la conversación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub sender: Sender,
    pub message: String,
}

impl ChatTurn {
    pub fn user(message: impl Into<String>) -> Self {
        Self { sender: Sender::User, message: message.into() }
    }

    pub fn bot(message: impl Into<String>) -> Self {
        Self { sender: Sender::Bot, message: message.into() }
    }
}

/// Documento con el foco en el editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDocument {
    pub path: PathBuf,
    pub text: String,
}

/// Resultado de la búsqueda por palabra clave sobre el contenido del proyecto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    pub file: String,
    pub content: String,
}
