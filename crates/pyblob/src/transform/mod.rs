//! Source transforms applied before encoding when minification is requested
//!
//! A transform rewrites Python source into a smaller but behaviorally
//! equivalent form. Which implementation runs is a configuration choice.

mod external;
mod in_process;

use std::fmt;

use serde::Deserialize;

pub use self::{external::ExternalProcessTransform, in_process::InProcessTransform};
use crate::error::Result;

/// Default external minifier program
pub const DEFAULT_MINIFIER: &str = "pyminifier";

/// A source-to-source rewrite of Python text
pub trait SourceTransform: fmt::Debug {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Rewrite `source`. `obfuscate` requests the most aggressive mode the
    /// transform supports.
    fn transform(&self, source: &str, obfuscate: bool) -> Result<String>;
}

/// Returns the source unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl SourceTransform for IdentityTransform {
    fn name(&self) -> &str {
        "identity"
    }

    fn transform(&self, source: &str, _obfuscate: bool) -> Result<String> {
        Ok(source.to_owned())
    }
}

/// Which transform implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformKind {
    Identity,
    /// Run an external minifier such as pyminifier
    #[default]
    External,
    /// Re-emit the module from its syntax tree without comments
    InProcess,
}

impl std::str::FromStr for TransformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(Self::Identity),
            "external" => Ok(Self::External),
            "in-process" => Ok(Self::InProcess),
            other => Err(format!(
                "unknown transform '{other}' (expected 'identity', 'external' or 'in-process')"
            )),
        }
    }
}

/// Build the transform selected by `kind`
pub fn create_transform(kind: TransformKind, minifier: &str) -> Box<dyn SourceTransform> {
    match kind {
        TransformKind::Identity => Box::new(IdentityTransform),
        TransformKind::External => Box::new(ExternalProcessTransform::new(minifier)),
        TransformKind::InProcess => Box::new(InProcessTransform),
    }
}

/// Normalize Windows line endings in transform output
pub(crate) fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}
