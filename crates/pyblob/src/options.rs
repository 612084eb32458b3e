//! Encoding options and their eager validation

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::{
    error::{BlobError, Result},
    store::StoreStrategy,
};

/// Default width of the wrapped payload literal
pub const DEFAULT_LINE_WIDTH: usize = 79;

/// Default Python expression naming the process-wide module registry
pub const DEFAULT_REGISTRY: &str = "__import__('sys').modules";

/// How the reconstructed module is exposed to the scope executing the stub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreMethod {
    /// Register the module in the process-wide registry under its name
    Default,
    /// Bind the module to a variable carrying its name
    Direct,
}

impl FromStr for StoreMethod {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(Self::Default),
            "direct" => Ok(Self::Direct),
            other => Err(BlobError::Configuration(format!(
                "unknown store method '{other}' (expected 'direct' or 'default')"
            ))),
        }
    }
}

impl fmt::Display for StoreMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// Options controlling a single encode call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingOptions {
    /// zlib-compress the source before base64 encoding
    pub compress: bool,
    /// Run the source transform before encoding
    pub minify: bool,
    /// Ask the source transform for aggressive obfuscation
    pub obfuscate: bool,
    /// Maximum number of payload characters per line
    pub line_width: usize,
    /// `None` behaves like [`StoreMethod::Default`]
    pub store_method: Option<StoreMethod>,
    /// Attribute of the module to bind in the invoking scope
    pub export_symbol: Option<String>,
    /// Embed uncompressed source as an escaped string literal instead of base64
    pub emit_as_literal: bool,
    /// Python expression naming the module registry used by the default and
    /// export strategies
    pub registry: String,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            compress: false,
            minify: false,
            obfuscate: false,
            line_width: DEFAULT_LINE_WIDTH,
            store_method: None,
            export_symbol: None,
            emit_as_literal: false,
            registry: DEFAULT_REGISTRY.to_owned(),
        }
    }
}

impl EncodingOptions {
    /// Validate the options for encoding a module called `name` and resolve
    /// the store strategy.
    ///
    /// This performs no I/O and must run before any transform or encoding work.
    pub fn validate(&self, name: &str) -> Result<StoreStrategy> {
        if self.line_width == 0 {
            return Err(BlobError::Configuration(
                "line width must be greater than zero".to_owned(),
            ));
        }
        if self.registry.trim().is_empty() {
            return Err(BlobError::Configuration(
                "registry expression must not be empty".to_owned(),
            ));
        }
        StoreStrategy::resolve(name, self)
    }
}
