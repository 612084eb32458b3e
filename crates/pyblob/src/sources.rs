//! Source units and lookup of dependency sources by module name

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};

use crate::error::{BlobError, Result};

/// A named piece of Python source text. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Module name, e.g. `six` or `pkg.util`
    pub name: String,
    pub text: String,
    /// Where the text came from: a file path or a descriptive label
    pub origin: String,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, text: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            origin: origin.into(),
        }
    }

    /// Read a source file. The module name defaults to the file stem.
    pub fn from_path(path: &Path, name: Option<&str>) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| BlobError::io(path, err))?;
        let name = match name {
            Some(name) => name.to_owned(),
            None => module_name_from_path(path)?,
        };
        Ok(Self::new(name, text, path.display().to_string()))
    }
}

/// Module name for a file: its stem, or the directory name for `__init__.py`
pub fn module_name_from_path(path: &Path) -> Result<String> {
    let stem = path.file_stem().and_then(|s| s.to_str());
    let name = match stem {
        Some("__init__") => path
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str()),
        other => other,
    };
    name.map(str::to_owned).ok_or_else(|| {
        BlobError::Configuration(format!(
            "can not derive a module name from {}; pass one explicitly",
            path.display()
        ))
    })
}

/// Supplies the source text of a dependency by module name
pub trait SourceProvider {
    fn source_of(&self, module_name: &str) -> Result<SourceUnit>;
}

/// In-memory sources, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemorySources {
    units: IndexMap<String, SourceUnit>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut Self {
        let name = name.into();
        let unit = SourceUnit::new(name.clone(), text, format!("<memory:{name}>"));
        self.units.insert(name, unit);
        self
    }
}

impl SourceProvider for MemorySources {
    fn source_of(&self, module_name: &str) -> Result<SourceUnit> {
        self.units
            .get(module_name)
            .cloned()
            .ok_or_else(|| BlobError::Lookup(format!("no source registered for '{module_name}'")))
    }
}

/// Resolves dotted module names against an ordered list of directories,
/// preferring packages (`name/__init__.py`) over plain modules (`name.py`)
#[derive(Debug, Clone, Default)]
pub struct SearchPathSources {
    search_dirs: IndexSet<PathBuf>,
}

impl SearchPathSources {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut sources = Self::default();
        for dir in dirs {
            sources.add_search_dir(dir);
        }
        sources
    }

    /// Append a directory; duplicates (after canonicalization) are ignored
    pub fn add_search_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        let dir = dir.canonicalize().unwrap_or(dir);
        self.search_dirs.insert(dir);
    }

    pub fn search_dirs(&self) -> impl Iterator<Item = &Path> {
        self.search_dirs.iter().map(PathBuf::as_path)
    }

    /// Find the file implementing `module_name`, if any
    pub fn resolve(&self, module_name: &str) -> Option<PathBuf> {
        let parts: Vec<&str> = module_name.split('.').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return None;
        }

        for dir in &self.search_dirs {
            let base = parts.iter().fold(dir.clone(), |path, part| path.join(part));
            let package_init = base.join("__init__.py");
            trace!("Trying {}", package_init.display());
            if package_init.is_file() {
                return Some(package_init);
            }
            let module_file = base.with_extension("py");
            trace!("Trying {}", module_file.display());
            if module_file.is_file() {
                return Some(module_file);
            }
        }
        None
    }
}

impl SourceProvider for SearchPathSources {
    fn source_of(&self, module_name: &str) -> Result<SourceUnit> {
        let path = self.resolve(module_name).ok_or_else(|| {
            let dirs: Vec<String> = self
                .search_dirs
                .iter()
                .map(|dir| dir.display().to_string())
                .collect();
            BlobError::Lookup(format!(
                "module '{module_name}' not found in search paths [{}]",
                dirs.join(", ")
            ))
        })?;
        debug!("Resolved '{module_name}' to {}", path.display());
        SourceUnit::from_path(&path, Some(module_name))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_module_name_from_path() {
        assert_eq!(module_name_from_path(Path::new("src/six.py")).unwrap(), "six");
        assert_eq!(
            module_name_from_path(Path::new("pkg/localimport/__init__.py")).unwrap(),
            "localimport"
        );
    }

    #[test]
    fn test_memory_sources() {
        let mut sources = MemorySources::new();
        sources.insert("six", "PY2 = False\n");
        let unit = sources.source_of("six").unwrap();
        assert_eq!(unit.name, "six");
        assert_eq!(unit.text, "PY2 = False\n");
        assert!(matches!(
            sources.source_of("missing"),
            Err(BlobError::Lookup(_))
        ));
    }

    #[test]
    fn test_search_path_resolution_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();

        fs::write(second.path().join("six.py"), "# second").unwrap();
        fs::create_dir_all(first.path().join("pkg")).unwrap();
        fs::write(first.path().join("pkg").join("__init__.py"), "# package").unwrap();
        fs::write(first.path().join("pkg.py"), "# shadowed").unwrap();
        fs::write(first.path().join("pkg").join("util.py"), "# util").unwrap();

        let sources = SearchPathSources::new([first.path(), second.path()]);

        assert_eq!(sources.source_of("six").unwrap().text, "# second");
        assert_eq!(sources.source_of("pkg").unwrap().text, "# package");
        let util = sources.source_of("pkg.util").unwrap();
        assert_eq!(util.name, "pkg.util");
        assert_eq!(util.text, "# util");
        assert!(sources.resolve("pkg..util").is_none());
        assert!(matches!(
            sources.source_of("localimport"),
            Err(BlobError::Lookup(_))
        ));
    }

    #[test]
    fn test_duplicate_search_dirs_ignored() {
        let dir = TempDir::new().unwrap();
        let sources = SearchPathSources::new([dir.path(), dir.path()]);
        assert_eq!(sources.search_dirs().count(), 1);
    }
}
