//! Historial de la conversación: registro ordenado de turnos con un límite
//! de retención y, opcionalmente, persistido en disco.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::ChatTurn;

/// Fichero JSON con el historial bajo la clave fija `chatHistory`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedHistory {
    chat_history: Vec<ChatTurn>,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Devuelve una lista vacía si el fichero aún no existe.
    pub fn load(&self) -> Result<Vec<ChatTurn>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path)
            .with_context(|| format!("No se pudo leer {}", self.path.display()))?;
        let persisted: PersistedHistory = serde_json::from_slice(&data)
            .with_context(|| format!("Historial corrupto en {}", self.path.display()))?;
        Ok(persisted.chat_history)
    }

    pub fn save(&self, turns: &[ChatTurn]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("No se pudo crear {}", dir.display()))?;
        }
        let persisted = PersistedHistory { chat_history: turns.to_vec(), saved_at: Utc::now() };
        let bytes = serde_json::to_vec_pretty(&persisted)?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes)
            .with_context(|| format!("No se pudo escribir {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("No se pudo reemplazar {}", self.path.display()))?;
        Ok(())
    }
}

/// Registro de la conversación. Al superar `max_turns` se descartan los
/// turnos más antiguos.
pub struct ConversationStore {
    turns: VecDeque<ChatTurn>,
    max_turns: usize,
    file: Option<HistoryFile>,
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self { turns: VecDeque::new(), max_turns: max_turns.max(1), file: None }
    }

    /// Carga el historial previo del fichero. Un fichero ilegible se registra
    /// y se empieza con la conversación vacía.
    pub fn with_file(mut self, file: HistoryFile) -> Self {
        match file.load() {
            Ok(turns) => {
                self.turns = turns.into();
                self.trim_if_needed();
                info!("Historial cargado de {} ({} mensajes).", file.path().display(), self.len());
            }
            Err(e) => warn!("Se ignora el historial guardado: {e:#}"),
        }
        self.file = Some(file);
        self
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push_back(turn);
        self.trim_if_needed();
        self.persist();
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.persist();
    }

    /// Copia de todos los turnos retenidos, en orden de llegada.
    pub fn replay(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn trim_if_needed(&mut self) {
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    fn persist(&self) {
        if let Some(file) = &self.file {
            let turns: Vec<ChatTurn> = self.turns.iter().cloned().collect();
            if let Err(e) = file.save(&turns) {
                warn!("No se pudo guardar el historial: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sender;
    use tempfile::TempDir;

    #[test]
    fn keeps_order_and_caps_oldest_first() {
        let mut store = ConversationStore::new(3);
        for i in 0..5 {
            store.push(ChatTurn::user(format!("m{i}")));
        }
        let messages: Vec<String> = store.replay().into_iter().map(|t| t.message).collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn persisted_under_fixed_key_and_reloaded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("history.json");

        let mut store = ConversationStore::new(10).with_file(HistoryFile::new(&path));
        store.push(ChatTurn::user("hola"));
        store.push(ChatTurn::bot("<strong>hola</strong>"));

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["chatHistory"][0]["sender"], "user");
        assert_eq!(raw["chatHistory"][1]["message"], "<strong>hola</strong>");
        assert!(raw["savedAt"].is_string());

        let reloaded = ConversationStore::new(10).with_file(HistoryFile::new(&path));
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.replay()[1].sender, Sender::Bot);
    }

    #[test]
    fn corrupt_file_starts_empty_and_clear_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.json");
        fs::write(&path, "no es json").unwrap();

        let mut store = ConversationStore::new(10).with_file(HistoryFile::new(&path));
        assert!(store.is_empty());

        store.push(ChatTurn::user("a"));
        store.clear();
        assert!(HistoryFile::new(&path).load().unwrap().is_empty());
    }
}
