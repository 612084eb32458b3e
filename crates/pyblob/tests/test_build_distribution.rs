use std::fs;

use pretty_assertions::assert_eq;
use pyblob::{
    BlobError, BuildOrchestrator, BuildRequest, Encoder, EncodingOptions, SourceUnit, StoreMethod,
    loader::read_stubs,
    sources::{MemorySources, SearchPathSources, SourceProvider},
};
use tempfile::TempDir;

const HOST: &str = "\
#!/usr/bin/env python
\"\"\"nodepy entry point\"\"\"
import os
import six
import localimport

def main():
    import six
    return six.PY3, localimport.localimport
";

const SIX: &str = "PY3 = True\nstring_types = (str,)\n";
const LOCALIMPORT: &str = "class localimport(object):\n    def __init__(self, path):\n        self.path = path\n";

fn direct() -> EncodingOptions {
    EncodingOptions {
        store_method: Some(StoreMethod::Direct),
        ..EncodingOptions::default()
    }
}

fn dependencies() -> Vec<String> {
    vec!["six".to_owned(), "localimport".to_owned()]
}

fn memory_sources() -> MemorySources {
    let mut sources = MemorySources::new();
    sources.insert("six", SIX).insert("localimport", LOCALIMPORT);
    sources
}

fn build(
    sources: &dyn SourceProvider,
    options: &EncodingOptions,
    full_blob: bool,
) -> pyblob::Result<SourceUnit> {
    let host = SourceUnit::new("nodepy", HOST, "nodepy.py");
    let dependencies = dependencies();
    BuildOrchestrator::new(Encoder::default(), sources).build(
        &host,
        &BuildRequest {
            dependencies: &dependencies,
            options,
            full_blob,
        },
    )
}

#[test]
fn test_dependencies_replaced_in_order_and_rest_untouched() {
    let sources = memory_sources();
    let options = direct();
    let dist = build(&sources, &options, false).unwrap();

    let stubs = read_stubs(&dist.text).unwrap();
    let names: Vec<&str> = stubs.iter().map(|stub| stub.module_name.as_str()).collect();
    assert_eq!(names, ["six", "localimport"]);
    assert_eq!(stubs[0].decode().unwrap(), SIX);
    assert_eq!(stubs[1].decode().unwrap(), LOCALIMPORT);

    // Putting the import statements back yields the host byte for byte
    let mut restored = dist.text.clone();
    for stub in stubs.iter().rev() {
        restored.replace_range(stub.range.clone(), &format!("import {}", stub.module_name));
    }
    assert_eq!(restored, HOST);

    // The nested import is not a module-level statement
    assert!(dist.text.contains("    import six\n"));
}

#[test]
fn test_full_blob_wraps_the_plain_build() {
    let sources = memory_sources();
    let options = EncodingOptions {
        compress: true,
        ..direct()
    };
    let plain = build(&sources, &options, false).unwrap();
    let full = build(&sources, &options, true).unwrap();

    let expected = Encoder::default()
        .encode("nodepy", &plain.text, &options)
        .unwrap();
    assert_eq!(full.text, expected);

    let outer = read_stubs(&full.text).unwrap();
    assert_eq!(outer.len(), 1);
    assert_eq!(outer[0].module_name, "nodepy");
    assert_eq!(outer[0].decode().unwrap(), plain.text);
}

#[test]
fn test_sources_found_on_search_paths() {
    let dir = TempDir::new().unwrap();
    let vendor = dir.path().join("vendor");
    fs::create_dir_all(vendor.join("localimport")).unwrap();
    fs::write(vendor.join("six.py"), SIX).unwrap();
    fs::write(vendor.join("localimport").join("__init__.py"), LOCALIMPORT).unwrap();

    let sources = SearchPathSources::new([dir.path().join("missing"), vendor]);
    let from_disk = build(&sources, &direct(), false).unwrap();
    let from_memory = build(&memory_sources(), &direct(), false).unwrap();
    assert_eq!(from_disk.text, from_memory.text);
}

#[test]
fn test_missing_dependency_is_a_lookup_error() {
    let mut sources = MemorySources::new();
    sources.insert("six", SIX);
    let err = build(&sources, &direct(), false).unwrap_err();
    assert!(
        matches!(&err, BlobError::Lookup(message) if message.contains("localimport")),
        "unexpected error: {err}"
    );
    assert!(!err.is_usage_error());
}

#[test]
fn test_direct_store_needs_identifier_names() {
    let mut sources = MemorySources::new();
    sources.insert("six", SIX);
    let host = SourceUnit::new("nodepy", "import six.moves\n", "nodepy.py");
    let dependencies = vec!["six.moves".to_owned()];
    let err = BuildOrchestrator::new(Encoder::default(), &sources)
        .build(
            &host,
            &BuildRequest {
                dependencies: &dependencies,
                options: &direct(),
                full_blob: false,
            },
        )
        .unwrap_err();
    assert!(matches!(err, BlobError::Configuration(_)));
}
