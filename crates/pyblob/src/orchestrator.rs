//! Build orchestrator: assembles a single-file distribution by replacing
//! dependency imports in a host module with decoder stubs

use log::{debug, info, warn};

use crate::{
    encoder::Encoder,
    error::{BlobError, Result},
    import_locator::locate_import,
    options::EncodingOptions,
    sources::{SourceProvider, SourceUnit},
    stdlib_detection::{DEFAULT_PYTHON_VERSION, is_stdlib_module},
};

/// Inputs of one build besides the host itself
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    /// Dependencies to inline, in substitution order
    pub dependencies: &'a [String],
    pub options: &'a EncodingOptions,
    /// Wrap the whole assembled text in one outer stub
    pub full_blob: bool,
}

/// Drives the encoder over a host module and its dependencies
pub struct BuildOrchestrator<'a> {
    encoder: Encoder<'a>,
    sources: &'a dyn SourceProvider,
    python_version: u8,
}

impl std::fmt::Debug for BuildOrchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("encoder", &self.encoder)
            .field("python_version", &self.python_version)
            .finish_non_exhaustive()
    }
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(encoder: Encoder<'a>, sources: &'a dyn SourceProvider) -> Self {
        Self {
            encoder,
            sources,
            python_version: DEFAULT_PYTHON_VERSION,
        }
    }

    /// Python 3 minor version used to flag standard library dependencies
    #[must_use]
    pub fn with_python_version(mut self, python_version: u8) -> Self {
        self.python_version = python_version;
        self
    }

    /// Build the distribution for `host`.
    ///
    /// For each dependency in order, the first module-level `import <dep>`
    /// statement in the working text is replaced by the dependency's stub.
    /// Later imports of the same dependency are left as they are. With
    /// `full_blob`, the assembled text is then encoded once more under the
    /// host's name.
    pub fn build(&self, host: &SourceUnit, request: &BuildRequest<'_>) -> Result<SourceUnit> {
        let options = request.options;

        // Validate every encode up front so nothing is looked up or
        // transformed when the options are unusable
        let mut strategies = Vec::with_capacity(request.dependencies.len());
        for dependency in request.dependencies {
            strategies.push(options.validate(dependency)?);
        }
        let host_strategy = if request.full_blob {
            Some(options.validate(&host.name)?)
        } else {
            None
        };

        info!(
            "Building '{}' with {} inlined dependencies",
            host.name,
            request.dependencies.len()
        );

        let mut working = host.text.clone();
        for (dependency, strategy) in request.dependencies.iter().zip(&strategies) {
            if is_stdlib_module(dependency, self.python_version) {
                warn!("'{dependency}' is a standard library module; inlining it anyway");
            }

            let unit = self.sources.source_of(dependency)?;
            let site = locate_import(&working, dependency).ok_or_else(|| {
                BlobError::Lookup(format!(
                    "no module-level 'import {dependency}' statement found in '{}'",
                    host.name
                ))
            })?;
            debug!(
                "Replacing 'import {dependency}' at {:?} ({:?}) with source from {}",
                site.range, site.method, unit.origin
            );

            let stub = self
                .encoder
                .encode_validated(dependency, &unit.text, options, strategy)?;
            working.replace_range(site.range, &stub);
        }

        if let Some(strategy) = host_strategy {
            debug!("Wrapping '{}' into a single blob", host.name);
            working = self
                .encoder
                .encode_validated(&host.name, &working, options, &strategy)?;
        }

        Ok(SourceUnit::new(host.name.clone(), working, host.origin.clone()))
    }
}
