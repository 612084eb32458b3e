//! Store-method resolution
//!
//! Decides how a reconstructed module is exposed to the scope that executes
//! its decoder stub, and renders the matching Python statement(s).

use std::fmt;

use log::debug;
use ruff_python_stdlib::identifiers::is_identifier;

use crate::{
    error::{BlobError, Result},
    options::{EncodingOptions, StoreMethod},
    stub::quote,
};

/// The single strategy a stub uses to install its module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreStrategy {
    /// `registry['name'] = m`
    Default,
    /// `name = m`, no registry entry
    Direct,
    /// Registry entry plus `symbol = getattr(m, 'symbol')`
    Export(String),
}

impl StoreStrategy {
    /// Pick the strategy for `name` from `options`, rejecting conflicting or
    /// unrenderable combinations.
    pub fn resolve(name: &str, options: &EncodingOptions) -> Result<Self> {
        let strategy = match (&options.export_symbol, options.store_method) {
            (Some(_), Some(StoreMethod::Direct)) => {
                return Err(BlobError::Configuration(
                    "an export symbol can not be combined with the 'direct' store method"
                        .to_owned(),
                ));
            }
            (Some(symbol), _) => {
                if !is_identifier(symbol) {
                    return Err(BlobError::Configuration(format!(
                        "export symbol '{symbol}' is not a valid Python identifier"
                    )));
                }
                Self::Export(symbol.clone())
            }
            (None, Some(StoreMethod::Direct)) => {
                if !is_identifier(name) {
                    return Err(BlobError::Configuration(format!(
                        "module name '{name}' can not be bound directly: not a valid Python identifier"
                    )));
                }
                Self::Direct
            }
            (None, Some(StoreMethod::Default) | None) => Self::Default,
        };
        debug!("Store strategy for '{name}': {strategy}");
        Ok(strategy)
    }

    /// Render the store statement(s) for module `name`. The reconstructed
    /// module is bound to `m` when this runs.
    pub fn render(&self, name: &str, registry: &str) -> String {
        match self {
            Self::Default => format!("{registry}[{}]=m", quote(name)),
            Self::Direct => format!("{name}=m"),
            Self::Export(symbol) => format!(
                "{registry}[{}]=m;{symbol}=getattr(m,{})",
                quote(name),
                quote(symbol)
            ),
        }
    }

    /// Whether the strategy leaves an entry in the module registry
    pub fn registers(&self) -> bool {
        !matches!(self, Self::Direct)
    }
}

impl fmt::Display for StoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Direct => write!(f, "direct"),
            Self::Export(symbol) => write!(f, "export({symbol})"),
        }
    }
}
