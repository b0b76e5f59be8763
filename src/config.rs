//! Carga y gestión de configuración de la aplicación (endpoint de chat,
//! modo de contexto, exclusiones e historial).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::scanner::ExclusionSet;

/// Cómo se construye el contexto que acompaña a cada pregunta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextMode {
    FullProject,
    ActiveDocument,
    Keyword,
}

impl ContextMode {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "full-project" => Ok(Self::FullProject),
            "active-document" => Ok(Self::ActiveDocument),
            "keyword" => Ok(Self::Keyword),
            other => Err(anyhow!("Modo de contexto no soportado: {other}")),
        }
    }
}

/// Entrega del contenido completo del proyecto al servicio de chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectDelivery {
    /// Todo el proyecto viaja como contexto de cada pregunta.
    Single,
    /// Se envía por lotes como mensajes previos tras el análisis.
    Batched,
}

impl ProjectDelivery {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "batched" => Ok(Self::Batched),
            other => Err(anyhow!("Modo de entrega del proyecto no soportado: {other}")),
        }
    }
}

/// Origen de la lista de ficheros relacionados con el documento activo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelatedFilesSource {
    Off,
    Endpoint,
    Prompt,
}

impl RelatedFilesSource {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "endpoint" => Ok(Self::Endpoint),
            "prompt" => Ok(Self::Prompt),
            other => Err(anyhow!("Origen de ficheros relacionados no soportado: {other}")),
        }
    }
}

/// Dirección del servicio de chat remoto.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    base: Url,
    pub timeout: Option<Duration>,
}

impl EndpointConfig {
    pub fn new(base: &str) -> Result<Self> {
        let mut base = Url::parse(base)
            .with_context(|| format!("URL del servicio de chat inválida: {base}"))?;
        // `Url::join` sustituye el último segmento si no acaba en '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base, timeout: None })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn chat_url(&self) -> Result<Url> {
        Ok(self.base.join("chat")?)
    }

    pub fn reset_url(&self) -> Result<Url> {
        Ok(self.base.join("reset")?)
    }

    pub fn related_files_url(&self) -> Result<Url> {
        Ok(self.base.join("related-files")?)
    }
}

/// Política de retención y persistencia del historial.
#[derive(Clone, Debug)]
pub struct HistoryConfig {
    pub max_turns: usize,
    pub file: Option<PathBuf>,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub open_browser: bool,

    pub endpoint: EndpointConfig,
    pub workspace_root: Option<PathBuf>,
    pub active_document: Option<PathBuf>,

    pub context_mode: ContextMode,
    pub project_delivery: ProjectDelivery,
    pub priming_batch_size: usize,
    pub related_files: RelatedFilesSource,
    pub exclusions: ExclusionSet,

    pub history: HistoryConfig,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3323".to_string());
        let open_browser = parse_bool("OPEN_BROWSER", true)?;

        let endpoint_str =
            env::var("CHAT_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:5000".to_string());
        let timeout = match env::var("CHAT_TIMEOUT_SECS") {
            Ok(v) => Some(Duration::from_secs(
                v.parse().with_context(|| format!("CHAT_TIMEOUT_SECS inválido: {v}"))?,
            )),
            Err(_) => None,
        };
        let endpoint = EndpointConfig::new(&endpoint_str)?.with_timeout(timeout);

        let workspace_root = env::var("WORKSPACE_ROOT").ok().map(PathBuf::from);
        let active_document = env::var("ACTIVE_DOCUMENT").ok().map(PathBuf::from);

        let context_mode =
            ContextMode::from_str(&env::var("CONTEXT_MODE").unwrap_or_else(|_| "keyword".into()))?;
        let project_delivery = ProjectDelivery::from_str(
            &env::var("PROJECT_DELIVERY").unwrap_or_else(|_| "single".into()),
        )?;
        let priming_batch_size = parse_usize("PRIMING_BATCH_SIZE", 10)?;
        if priming_batch_size == 0 {
            return Err(anyhow!("PRIMING_BATCH_SIZE debe ser mayor que cero"));
        }
        let related_files = RelatedFilesSource::from_str(
            &env::var("RELATED_FILES").unwrap_or_else(|_| "off".into()),
        )?;

        let exclusions = match env::var("EXCLUDED_NAMES") {
            Ok(list) => ExclusionSet::from_names(
                list.split(',').map(str::trim).filter(|s| !s.is_empty()),
            ),
            Err(_) => ExclusionSet::default(),
        };

        let max_turns = parse_usize("HISTORY_MAX_TURNS", 200)?;
        let file = if parse_bool("HISTORY_PERSIST", false)? {
            match env::var("HISTORY_FILE") {
                Ok(path) => Some(PathBuf::from(path)),
                Err(_) => Some(default_history_file()?),
            }
        } else {
            None
        };

        Ok(Self {
            server_addr,
            open_browser,
            endpoint,
            workspace_root,
            active_document,
            context_mode,
            project_delivery,
            priming_batch_size,
            related_files,
            exclusions,
            history: HistoryConfig { max_turns, file },
        })
    }
}

fn default_history_file() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| anyhow!("No se pudo determinar el directorio de datos del usuario."))?;
    Ok(base.join("contexto_chat").join("history.json"))
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} inválido: {v}")),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "si" | "sí" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(anyhow!("{key} debe ser booleano, recibido: {other}")),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls_keep_base_path() {
        let cfg = EndpointConfig::new("http://127.0.0.1:5000/api").unwrap();
        assert_eq!(cfg.chat_url().unwrap().as_str(), "http://127.0.0.1:5000/api/chat");
        assert_eq!(cfg.reset_url().unwrap().as_str(), "http://127.0.0.1:5000/api/reset");

        let root = EndpointConfig::new("http://127.0.0.1:5000").unwrap();
        assert_eq!(
            root.related_files_url().unwrap().as_str(),
            "http://127.0.0.1:5000/related-files"
        );
    }

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!(ContextMode::from_str("Full-Project").unwrap(), ContextMode::FullProject);
        assert_eq!(ProjectDelivery::from_str("BATCHED").unwrap(), ProjectDelivery::Batched);
        assert_eq!(RelatedFilesSource::from_str("prompt").unwrap(), RelatedFilesSource::Prompt);
        assert!(ContextMode::from_str("vector").is_err());
    }
}
