//! Embeds Python modules as self-decoding blobs and assembles single-file
//! distributions from a host module and its dependencies.

pub mod blob;
pub mod config;
pub mod encoder;
pub mod error;
pub mod import_locator;
pub mod inspect;
pub mod loader;
pub mod module_registry;
pub mod options;
pub mod orchestrator;
pub mod output;
pub mod sources;
pub mod stdlib_detection;
pub mod store;
pub mod stub;
pub mod transform;

pub use crate::{
    encoder::Encoder,
    error::{BlobError, Result},
    options::{EncodingOptions, StoreMethod},
    orchestrator::{BuildOrchestrator, BuildRequest},
    sources::SourceUnit,
};
