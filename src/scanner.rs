//! Recorrido recursivo del proyecto, excluyendo ficheros ocultos y los
//! directorios de la lista de exclusión.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::models::{FileEntry, ProjectEntry, ProjectSnapshot};

const DEFAULT_EXCLUDED: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "out",
    "coverage",
    "target",
    "__pycache__",
    "venv",
];

/// Nombres que nunca se recorren. Cualquier nombre que empiece por `.`
/// queda excluido además de los de la lista.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionSet {
    names: HashSet<String>,
}

impl ExclusionSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }

    pub fn is_excluded(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        name.starts_with('.') || self.names.contains(name.as_ref())
    }
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self::from_names(DEFAULT_EXCLUDED.iter().copied())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scanner {
    exclusions: ExclusionSet,
}

impl Scanner {
    pub fn new(exclusions: ExclusionSet) -> Self {
        Self { exclusions }
    }

    /// Recorre `root` en profundidad (preorden, hermanos ordenados por nombre).
    ///
    /// Un directorio que no se puede listar o una entrada sin metadatos hace
    /// fallar el escaneo completo; la lectura del contenido de cada fichero
    /// ocurre después y no forma parte de él.
    pub fn scan(&self, root: &Path) -> Result<ProjectSnapshot> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("No se pudo resolver la raíz {}", root.display()))?;

        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.exclusions.is_excluded(e.file_name()));

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry.with_context(|| format!("Error recorriendo {}", root.display()))?;
            if entry.depth() == 0 {
                continue;
            }
            let file_type = entry.file_type();
            if file_type.is_dir() {
                entries.push(ProjectEntry::Directory(entry.into_path()));
            } else if file_type.is_file() {
                entries.push(ProjectEntry::File(FileEntry { path: entry.into_path() }));
            } else {
                debug!("Ignorando entrada especial: {}", entry.path().display());
            }
        }

        let snapshot = ProjectSnapshot { root, entries };
        info!(
            "Escaneo de {} completado: {} ficheros.",
            snapshot.root.display(),
            snapshot.file_count()
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/main.js", "console.log(1)");
        write(tmp.path(), "src/util/helpers.js", "export {}");
        write(tmp.path(), "README.md", "# hola");
        write(tmp.path(), "node_modules/axios/index.js", "x");
        write(tmp.path(), ".git/HEAD", "ref");
        write(tmp.path(), ".env", "SECRET=1");
        write(tmp.path(), "dist/bundle.js", "x");
        write(tmp.path(), "src/.cache/tmp.txt", "x");
        tmp
    }

    fn rel_files(snapshot: &ProjectSnapshot) -> Vec<String> {
        snapshot
            .files()
            .map(|f| {
                f.path
                    .strip_prefix(&snapshot.root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn skips_excluded_and_hidden_names() {
        let tmp = fixture();
        let snapshot = Scanner::default().scan(tmp.path()).unwrap();

        assert_eq!(
            rel_files(&snapshot),
            vec!["README.md", "src/main.js", "src/util/helpers.js"]
        );
        for entry in &snapshot.entries {
            let path = match entry {
                ProjectEntry::Directory(p) => p,
                ProjectEntry::File(f) => &f.path,
            };
            let rel = path.strip_prefix(&snapshot.root).unwrap();
            for component in rel.components() {
                let name = component.as_os_str();
                assert!(!ExclusionSet::default().is_excluded(name), "{rel:?}");
            }
        }
    }

    #[test]
    fn paths_are_absolute_and_directories_precede_contents() {
        let tmp = fixture();
        let snapshot = Scanner::default().scan(tmp.path()).unwrap();

        assert!(snapshot.files().all(|f| f.path.is_absolute()));
        let src_dir = snapshot
            .entries
            .iter()
            .position(|e| matches!(e, ProjectEntry::Directory(p) if p.ends_with("src")))
            .unwrap();
        let main_js = snapshot
            .entries
            .iter()
            .position(|e| matches!(e, ProjectEntry::File(f) if f.path.ends_with("main.js")))
            .unwrap();
        assert!(src_dir < main_js);
    }

    #[test]
    fn repeated_scans_are_identical() {
        let tmp = fixture();
        let scanner = Scanner::default();
        let first = scanner.scan(tmp.path()).unwrap();
        let second = scanner.scan(tmp.path()).unwrap();
        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn custom_exclusions_replace_defaults() {
        let tmp = fixture();
        let scanner = Scanner::new(ExclusionSet::from_names(["src"]));
        let files = rel_files(&scanner.scan(tmp.path()).unwrap());

        assert!(files.contains(&"dist/bundle.js".to_string()));
        assert!(files.contains(&"node_modules/axios/index.js".to_string()));
        assert!(!files.iter().any(|f| f.starts_with("src")));
        // La regla del punto se mantiene siempre.
        assert!(!files.iter().any(|f| f.starts_with(".git")));
    }

    #[test]
    fn missing_root_fails_the_scan() {
        let result = Scanner::default().scan(&PathBuf::from("/no/existe/en/absoluto"));
        assert!(result.is_err());
    }
}
