//! Ensamblado del texto de contexto que acompaña a cada pregunta.
//!
//! Tres modos:
//!   - Proyecto completo: cabeceras `Directory:`/`File:` y contenido de cada
//!     fichero, en un único bloque o por lotes.
//!   - Documento activo: registro `{file, content}` más los ficheros
//!     relacionados que indique el servicio de chat.
//!   - Palabra clave: localiza en el bloque del proyecto la primera sección
//!     que contiene un archivo, clase o función mencionados en la pregunta.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use crate::client::ChatBackend;
use crate::config::RelatedFilesSource;
use crate::host::ProgressSink;
use crate::models::{
    ActiveDocument, FileEntry, KeywordMatch, ProjectContext, ProjectEntry, ProjectSnapshot,
};
use crate::scanner::Scanner;

const RELATED_FILES_PROMPT: &str = "Indica los nombres de los ficheros del proyecto relacionados \
con el siguiente archivo. Responde únicamente con los nombres separados por comas.";

static FILE_TRIGGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)archivo\s+(\S+)").expect("regex válida"));
static CLASS_TRIGGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)clase\s+(\S+)").expect("regex válida"));
static FUNCTION_TRIGGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)función\s+(\S+)").expect("regex válida"));

// ---------------------------------------------------------------------
// PROYECTO COMPLETO
// ---------------------------------------------------------------------

/// Escanea `root` y ensambla el contenido completo del proyecto.
pub fn analyze_project(
    scanner: &Scanner,
    root: &Path,
    progress: &dyn ProgressSink,
) -> Result<ProjectContext> {
    let snapshot = scanner.scan(root)?;
    let blob = assemble_project(&snapshot, progress);
    Ok(ProjectContext { snapshot, blob })
}

/// Concatena todo el proyecto en un único bloque de texto.
pub fn assemble_project(snapshot: &ProjectSnapshot, progress: &dyn ProgressSink) -> String {
    let total = snapshot.file_count().max(1) as f32;
    let mut blob = String::new();

    for entry in &snapshot.entries {
        match entry {
            ProjectEntry::Directory(path) => {
                let _ = writeln!(blob, "Directory: {}", path.display());
            }
            ProjectEntry::File(file) => {
                blob.push_str(&file_section(file));
                progress.report(100.0 / total, &format!("Analizando: {}", file.path.display()));
            }
        }
    }
    blob
}

/// Divide los ficheros del proyecto en lotes de `batch_size`, cada uno con
/// su propio bloque de texto.
pub fn project_batches(snapshot: &ProjectSnapshot, batch_size: usize) -> Vec<String> {
    let files: Vec<&FileEntry> = snapshot.files().collect();
    files
        .chunks(batch_size.max(1))
        .map(|batch| batch.iter().map(|f| file_section(f)).collect())
        .collect()
}

fn file_section(file: &FileEntry) -> String {
    match fs::read_to_string(&file.path) {
        Ok(content) => format!("File: {}\nContent:\n{}\n\n", file.path.display(), content),
        Err(e) => {
            debug!("No se pudo leer {}: {}", file.path.display(), e);
            format!("File: {}\nError reading file: {}\n\n", file.path.display(), e)
        }
    }
}

// ---------------------------------------------------------------------
// PALABRA CLAVE
// ---------------------------------------------------------------------

/// Busca la primera sección `File:` del bloque cuyo contenido acumulado
/// contiene `needle`.
pub fn find_content_in_project(blob: &str, needle: &str) -> Option<KeywordMatch> {
    let mut current_file = "";
    let mut content = String::new();
    let mut found = false;

    for line in blob.split('\n') {
        if let Some(name) = line.strip_prefix("File: ") {
            if found {
                break;
            }
            current_file = name;
            content.clear();
        } else if line.starts_with("Content:") {
            continue;
        } else {
            content.push_str(line);
            content.push('\n');
        }

        if content.contains(needle) {
            found = true;
        }
    }

    found.then(|| KeywordMatch {
        file: current_file.to_string(),
        content: content.trim().to_string(),
    })
}

/// Contexto para una pregunta que menciona `archivo`, `clase` o `función`.
/// Vacío si no hay mención o si nada coincide.
pub fn keyword_context(blob: &str, message: &str) -> String {
    if let Some(name) = capture(&FILE_TRIGGER, message) {
        return find_content_in_project(blob, name)
            .map(|m| format!("Contenido del archivo {}:\n{}", name, m.content))
            .unwrap_or_default();
    }
    if let Some(name) = capture(&CLASS_TRIGGER, message) {
        return find_content_in_project(blob, &format!("class {name}"))
            .map(|m| format!("Definición de la clase {}:\n{}", name, m.content))
            .unwrap_or_default();
    }
    if let Some(name) = capture(&FUNCTION_TRIGGER, message) {
        return find_content_in_project(blob, &format!("def {name}"))
            .map(|m| format!("Definición de la función {}:\n{}", name, m.content))
            .unwrap_or_default();
    }
    String::new()
}

fn capture<'a>(re: &Regex, message: &'a str) -> Option<&'a str> {
    re.captures(message).and_then(|c| c.get(1)).map(|m| m.as_str())
}

// ---------------------------------------------------------------------
// DOCUMENTO ACTIVO Y FICHEROS RELACIONADOS
// ---------------------------------------------------------------------

/// Registro mínimo `{file, content}` del documento con el foco.
pub fn document_record(doc: &ActiveDocument) -> String {
    json!({
        "file": doc.path.to_string_lossy(),
        "content": doc.text,
    })
    .to_string()
}

/// Interpreta una respuesta del tipo `a.js, src/b.rs, "c.py"`.
pub fn parse_related_names(reply: &str) -> Vec<String> {
    reply
        .split(',')
        .map(|name| name.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resuelve cada nombre contra la lista de ficheros por coincidencia de
/// sufijo (por componentes). Los nombres sin coincidencia se descartan.
pub fn resolve_related<'a>(names: &[String], snapshot: &'a ProjectSnapshot) -> Vec<&'a FileEntry> {
    let mut resolved: Vec<&FileEntry> = Vec::new();
    for name in names {
        let suffix = Path::new(name.as_str());
        match snapshot.files().find(|f| f.path.ends_with(suffix)) {
            Some(file) if !resolved.iter().any(|r| r.path == file.path) => resolved.push(file),
            Some(_) => {}
            None => debug!("Fichero relacionado sin coincidencia: {}", name),
        }
    }
    resolved
}

/// Añade al contexto base cada fichero envuelto entre delimitadores.
pub fn append_related(base: &str, root: &Path, files: &[&FileEntry]) -> String {
    let mut context = base.to_string();
    for file in files {
        let label = file.path.strip_prefix(root).unwrap_or(&file.path).display().to_string();
        let content = fs::read_to_string(&file.path)
            .unwrap_or_else(|e| format!("Error reading file: {e}"));
        let _ = write!(
            context,
            "\n\n[Inicio del archivo \"{label}\"]\n{content}\n[Fin del archivo \"{label}\"]"
        );
    }
    context
}

/// Pide al servicio de chat los nombres de los ficheros relacionados con el
/// documento activo. Cualquier fallo se registra y deja la lista vacía.
pub async fn related_file_names(
    backend: &dyn ChatBackend,
    source: RelatedFilesSource,
    doc: &ActiveDocument,
) -> Vec<String> {
    let result = match source {
        RelatedFilesSource::Off => return Vec::new(),
        RelatedFilesSource::Endpoint => backend.related_files(&doc.text).await,
        RelatedFilesSource::Prompt => backend
            .try_send(RELATED_FILES_PROMPT, &doc.text)
            .await
            .map(|reply| parse_related_names(&reply)),
    };
    result.unwrap_or_else(|e| {
        warn!("No se pudieron obtener los ficheros relacionados: {e:#}");
        Vec::new()
    })
}
