//! Encoder: turns `(name, source, options)` into decoder stub text

use log::debug;

use crate::{
    blob::Blob,
    error::Result,
    options::EncodingOptions,
    store::StoreStrategy,
    stub::StubTemplate,
    transform::{IdentityTransform, SourceTransform, normalize_newlines},
};

/// Produces decoder stubs. Holds the transform used when minifying.
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'t> {
    transform: &'t dyn SourceTransform,
}

impl Default for Encoder<'static> {
    fn default() -> Self {
        Self {
            transform: &IdentityTransform,
        }
    }
}

impl<'t> Encoder<'t> {
    pub fn new(transform: &'t dyn SourceTransform) -> Self {
        Self { transform }
    }

    pub fn transform(&self) -> &'t dyn SourceTransform {
        self.transform
    }

    /// Encode `source` as a stub installing module `name`.
    ///
    /// Options are validated before the transform runs, so a configuration
    /// error never spawns a process or touches the filesystem.
    pub fn encode(&self, name: &str, source: &str, options: &EncodingOptions) -> Result<String> {
        let strategy = options.validate(name)?;
        self.encode_validated(name, source, options, &strategy)
    }

    pub(crate) fn encode_validated(
        &self,
        name: &str,
        source: &str,
        options: &EncodingOptions,
        strategy: &StoreStrategy,
    ) -> Result<String> {
        let transformed;
        let source = if options.minify {
            debug!(
                "Transforming '{name}' with {} (obfuscate: {})",
                self.transform.name(),
                options.obfuscate
            );
            transformed = normalize_newlines(&self.transform.transform(source, options.obfuscate)?);
            transformed.as_str()
        } else {
            source
        };

        let blob = Blob::encode(source, options)?;
        debug!(
            "Encoded '{name}': {} source bytes -> {} payload bytes ({})",
            source.len(),
            blob.payload.len(),
            blob.decode_kind
        );

        let template = StubTemplate {
            module_name: name.to_owned(),
            payload_literal: blob.literal(options.line_width),
            decode_expression: blob.decode_kind.expression().to_owned(),
            store_expression: strategy.render(name, &options.registry),
        };
        Ok(template.render())
    }
}
