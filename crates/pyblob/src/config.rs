//! Configuration loading
//!
//! Settings are layered, later layers winning: built-in defaults, the user
//! config (`<config dir>/pyblob/pyblob.toml`), `pyblob.toml` in the working
//! directory, an explicit `--config` file, the `PYBLOB_MINIFIER` environment
//! variable, and finally command-line flags applied by the binary.

use std::{
    fs,
    path::{Path, PathBuf},
};

use etcetera::BaseStrategy;
use log::debug;
use serde::Deserialize;

use crate::{
    error::{BlobError, Result},
    options::{DEFAULT_LINE_WIDTH, DEFAULT_REGISTRY, EncodingOptions, StoreMethod},
    stdlib_detection::DEFAULT_PYTHON_VERSION,
    transform::{DEFAULT_MINIFIER, TransformKind},
};

/// File name looked up in the working and user config directories
pub const CONFIG_FILE_NAME: &str = "pyblob.toml";

/// Environment variable overriding the external minifier program
pub const MINIFIER_ENV: &str = "PYBLOB_MINIFIER";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub line_width: usize,
    pub compress: bool,
    pub minify: bool,
    pub obfuscate: bool,
    pub emit_as_literal: bool,
    pub store_method: Option<StoreMethod>,
    /// Python expression naming the module registry
    pub registry: String,
    pub transform: TransformKind,
    /// Program run by the external transform
    pub minifier: String,
    /// Directories searched for dependency sources, in order
    pub search_paths: Vec<PathBuf>,
    /// Python 3 minor version used for stdlib detection
    pub python_version: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            line_width: DEFAULT_LINE_WIDTH,
            compress: false,
            minify: false,
            obfuscate: false,
            emit_as_literal: false,
            store_method: None,
            registry: DEFAULT_REGISTRY.to_owned(),
            transform: TransformKind::default(),
            minifier: DEFAULT_MINIFIER.to_owned(),
            search_paths: Vec::new(),
            python_version: DEFAULT_PYTHON_VERSION,
        }
    }
}

/// One configuration file; unset keys leave the lower layer untouched
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    line_width: Option<usize>,
    compress: Option<bool>,
    minify: Option<bool>,
    obfuscate: Option<bool>,
    emit_as_literal: Option<bool>,
    store_method: Option<StoreMethod>,
    registry: Option<String>,
    transform: Option<TransformKind>,
    minifier: Option<String>,
    search_paths: Option<Vec<PathBuf>>,
    python_version: Option<u8>,
}

impl Config {
    /// Load the layered configuration. `explicit` must exist when given.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_file) = user_config_file() {
            if user_file.is_file() {
                config.merge_file(&user_file)?;
            }
        }

        let project_file = Path::new(CONFIG_FILE_NAME);
        if project_file.is_file() {
            config.merge_file(project_file)?;
        }

        if let Some(path) = explicit {
            config.merge_file(path)?;
        }

        if let Ok(minifier) = std::env::var(MINIFIER_ENV) {
            if !minifier.is_empty() {
                debug!("Using minifier from {MINIFIER_ENV}: {minifier}");
                config.minifier = minifier;
            }
        }

        Ok(config)
    }

    /// Merge the settings of one TOML file over this configuration. Relative
    /// search paths are resolved against the file's directory.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path).map_err(|err| BlobError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        self.merge_str(&text, base_dir).map_err(|message| BlobError::Config {
            path: path.to_path_buf(),
            message,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(())
    }

    fn merge_str(&mut self, text: &str, base_dir: &Path) -> Result<(), String> {
        let file: ConfigFile = toml::from_str(text).map_err(|err| err.to_string())?;

        if let Some(line_width) = file.line_width {
            self.line_width = line_width;
        }
        if let Some(compress) = file.compress {
            self.compress = compress;
        }
        if let Some(minify) = file.minify {
            self.minify = minify;
        }
        if let Some(obfuscate) = file.obfuscate {
            self.obfuscate = obfuscate;
        }
        if let Some(emit_as_literal) = file.emit_as_literal {
            self.emit_as_literal = emit_as_literal;
        }
        if file.store_method.is_some() {
            self.store_method = file.store_method;
        }
        if let Some(registry) = file.registry {
            self.registry = registry;
        }
        if let Some(transform) = file.transform {
            self.transform = transform;
        }
        if let Some(minifier) = file.minifier {
            self.minifier = minifier;
        }
        if let Some(search_paths) = file.search_paths {
            self.search_paths = search_paths
                .into_iter()
                .map(|path| {
                    if path.is_relative() {
                        base_dir.join(path)
                    } else {
                        path
                    }
                })
                .collect();
        }
        if let Some(python_version) = file.python_version {
            self.python_version = python_version;
        }
        Ok(())
    }

    /// Encoding options described by this configuration
    pub fn encoding_options(&self) -> EncodingOptions {
        EncodingOptions {
            compress: self.compress,
            minify: self.minify,
            obfuscate: self.obfuscate,
            line_width: self.line_width,
            store_method: self.store_method,
            export_symbol: None,
            emit_as_literal: self.emit_as_literal,
            registry: self.registry.clone(),
        }
    }
}

fn user_config_file() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("pyblob").join(CONFIG_FILE_NAME))
}
