//! Reading decoder stubs back and reconstructing their modules
//!
//! [`read_stubs`] recognizes rendered stubs in Python text, [`Loader`]
//! turns decoded source into a module, and [`execute_stub`] applies a stub's
//! store strategy against an explicit [`ModuleRegistry`] and [`Scope`].

use std::ops::Range;

use indexmap::IndexSet;
use log::{debug, trace};
use ruff_python_ast::{Expr, ExprCall, Stmt, StmtAssign, StmtImport};
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;

use crate::{
    blob::{Blob, DecodeKind},
    error::{BlobError, Result},
    module_registry::{Binding, LoadedModule, ModuleId, ModuleRegistry, Scope},
    store::StoreStrategy,
    stub::STUB_TEMPORARIES,
};

/// Longest statement run a stub renders to (import through del)
const MAX_STUB_STATEMENTS: usize = 9;

/// A decoder stub found in Python text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedStub {
    pub module_name: String,
    pub decode_kind: DecodeKind,
    pub store: StoreStrategy,
    /// Registry expression, for strategies that register the module
    pub registry: Option<String>,
    /// Byte range of the stub in the text it was read from
    pub range: Range<usize>,
    /// Value of the payload literal as the interpreter sees it
    payload: Vec<u8>,
}

impl EmbeddedStub {
    /// Decode the payload into the embedded source text
    pub fn decode(&self) -> Result<String> {
        Blob::decode_payload(&self.module_name, &self.payload, self.decode_kind)
    }

    /// Size of the payload literal value in bytes
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Find every module-level decoder stub in `source`, in source order
pub fn read_stubs(source: &str) -> Result<Vec<EmbeddedStub>> {
    let parsed = parse_module(source)
        .map_err(|err| BlobError::malformed("<input>", format!("text does not parse: {err}")))?;
    let body = &parsed.syntax().body;

    let mut stubs = Vec::new();
    let mut index = 0;
    while index < body.len() {
        let Stmt::Import(import) = &body[index] else {
            index += 1;
            continue;
        };
        if !is_stub_prelude(import) {
            index += 1;
            continue;
        }

        let window_end = (index + MAX_STUB_STATEMENTS).min(body.len());
        let Some(offset) = body[index..window_end]
            .iter()
            .position(is_stub_epilogue)
        else {
            index += 1;
            continue;
        };
        let statements = &body[index..=index + offset];
        let stub = read_stub(source, statements)?;
        trace!("Found stub for '{}' at {:?}", stub.module_name, stub.range);
        stubs.push(stub);
        index += offset + 1;
    }
    Ok(stubs)
}

/// `import base64 as b, types as t, zlib as z`
fn is_stub_prelude(import: &StmtImport) -> bool {
    let expected = [("base64", "b"), ("types", "t"), ("zlib", "z")];
    import.names.len() == expected.len()
        && import.names.iter().zip(expected).all(|(alias, (module, name))| {
            alias.name.as_str() == module
                && alias.asname.as_ref().is_some_and(|asname| asname.as_str() == name)
        })
}

/// `del blob, b, t, z, m`
fn is_stub_epilogue(stmt: &Stmt) -> bool {
    let Stmt::Delete(delete) = stmt else {
        return false;
    };
    delete.targets.len() == STUB_TEMPORARIES.len()
        && delete
            .targets
            .iter()
            .zip(STUB_TEMPORARIES)
            .all(|(target, name)| is_name(target, name))
}

fn is_name(expr: &Expr, name: &str) -> bool {
    matches!(expr, Expr::Name(expr_name) if expr_name.id.as_str() == name)
}

fn string_value(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::StringLiteral(literal) => Some(literal.value.to_str()),
        _ => None,
    }
}

/// Store statements seen in one stub
#[derive(Debug, Default)]
struct StoreParts {
    direct: Option<String>,
    registry: Option<(String, String)>,
    export: Option<String>,
}

fn read_stub(source: &str, statements: &[Stmt]) -> Result<EmbeddedStub> {
    let first = statements.first().map_or(0, |stmt| stmt.start().to_usize());
    let last = statements.last().map_or(0, |stmt| stmt.end().to_usize());
    // The closing ';' lies outside the statement range
    let last = last + usize::from(source[last..].starts_with(';'));

    let mut module_name = None;
    let mut payload = None;
    let mut decode_kind = None;
    let mut store = StoreParts::default();

    for stmt in statements {
        match stmt {
            Stmt::Assign(assign) => {
                read_assignment(source, assign, &mut module_name, &mut payload, &mut store);
            }
            Stmt::Expr(expr_stmt) => {
                if let Expr::Call(call) = expr_stmt.value.as_ref() {
                    if is_name(&call.func, "exec") {
                        decode_kind = call.arguments.args.first().and_then(decode_kind_of);
                    }
                }
            }
            _ => {}
        }
    }

    let module_name =
        module_name.ok_or_else(|| BlobError::malformed("<unknown>", "no module creation found"))?;
    let payload = payload.ok_or_else(|| BlobError::malformed(&module_name, "no payload found"))?;
    let decode_kind = decode_kind
        .ok_or_else(|| BlobError::malformed(&module_name, "unrecognized decode expression"))?;

    if let Some((_, key)) = &store.registry {
        if *key != module_name {
            return Err(BlobError::malformed(
                &module_name,
                format!("registered under a different key '{key}'"),
            ));
        }
    }

    let (strategy, registry) = match (store.export, store.registry, store.direct) {
        (Some(symbol), Some((registry, _)), None) => {
            (StoreStrategy::Export(symbol), Some(registry))
        }
        (None, Some((registry, _)), None) => (StoreStrategy::Default, Some(registry)),
        (None, None, Some(target)) => {
            if target != module_name {
                return Err(BlobError::malformed(
                    &module_name,
                    format!("bound to a different name '{target}'"),
                ));
            }
            (StoreStrategy::Direct, None)
        }
        _ => {
            return Err(BlobError::malformed(
                &module_name,
                "unrecognized store statements",
            ));
        }
    };

    Ok(EmbeddedStub {
        module_name,
        decode_kind,
        store: strategy,
        registry,
        range: first..last,
        payload,
    })
}

fn read_assignment(
    source: &str,
    assign: &StmtAssign,
    module_name: &mut Option<String>,
    payload: &mut Option<Vec<u8>>,
    store: &mut StoreParts,
) {
    let [target] = assign.targets.as_slice() else {
        return;
    };
    let value = assign.value.as_ref();

    match target {
        // m=t.ModuleType('name')
        Expr::Name(name) if name.id.as_str() == "m" => {
            if let Expr::Call(call) = value {
                if is_attribute_call(call, "ModuleType") {
                    *module_name = call
                        .arguments
                        .args
                        .first()
                        .and_then(string_value)
                        .map(str::to_owned);
                }
            }
        }
        // blob=<literal>
        Expr::Name(name) if name.id.as_str() == "blob" => {
            *payload = match value {
                Expr::BytesLiteral(literal) => Some(literal.value.bytes().collect()),
                Expr::StringLiteral(literal) => Some(literal.value.to_str().as_bytes().to_vec()),
                _ => None,
            };
        }
        // name=m  or  symbol=getattr(m,'symbol')
        Expr::Name(name) => {
            if is_name(value, "m") {
                store.direct = Some(name.id.to_string());
            } else if let Expr::Call(call) = value {
                if let [module, attribute] = &*call.arguments.args {
                    if is_name(&call.func, "getattr") && is_name(module, "m") {
                        if string_value(attribute) == Some(name.id.as_str()) {
                            store.export = Some(name.id.to_string());
                        }
                    }
                }
            }
        }
        // registry['name']=m
        Expr::Subscript(subscript) if is_name(value, "m") => {
            if let Some(key) = string_value(&subscript.slice) {
                let registry = source[subscript.value.range()].to_owned();
                store.registry = Some((registry, key.to_owned()));
            }
        }
        _ => {}
    }
}

fn is_attribute_call(call: &ExprCall, attribute: &str) -> bool {
    matches!(call.func.as_ref(), Expr::Attribute(attr) if attr.attr.as_str() == attribute)
}

fn decode_kind_of(expr: &Expr) -> Option<DecodeKind> {
    match expr {
        Expr::Name(name) if name.id.as_str() == "blob" => Some(DecodeKind::Raw),
        Expr::Call(call) if is_attribute_call(call, "b64decode") => Some(DecodeKind::Base64),
        Expr::Call(call) if is_attribute_call(call, "decompress") => {
            Some(DecodeKind::Base64Inflate)
        }
        _ => None,
    }
}

/// Turns decoded source into a module object
pub trait Loader {
    fn load(&self, name: &str, file: Option<&str>, source: &str) -> Result<LoadedModule>;
}

/// Reconstructs modules without running them: the members of the module are
/// the names its top-level statements bind
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticLoader;

impl Loader for StaticLoader {
    fn load(&self, name: &str, file: Option<&str>, source: &str) -> Result<LoadedModule> {
        let parsed = parse_module(source)
            .map_err(|err| BlobError::malformed(name, format!("payload does not parse: {err}")))?;

        let mut members = IndexSet::new();
        for stmt in &parsed.syntax().body {
            collect_bindings(stmt, &mut members);
        }
        debug!("Loaded '{name}' with {} members", members.len());

        Ok(LoadedModule {
            name: name.to_owned(),
            file: file.map(str::to_owned),
            source: source.to_owned(),
            members,
        })
    }
}

fn collect_bindings(stmt: &Stmt, members: &mut IndexSet<String>) {
    match stmt {
        Stmt::FunctionDef(func_def) => {
            members.insert(func_def.name.to_string());
        }
        Stmt::ClassDef(class_def) => {
            members.insert(class_def.name.to_string());
        }
        Stmt::Assign(assign) => {
            for target in &assign.targets {
                collect_target(target, members);
            }
        }
        Stmt::AnnAssign(ann_assign) if ann_assign.value.is_some() => {
            collect_target(&ann_assign.target, members);
        }
        Stmt::Import(import) => {
            for alias in &import.names {
                let bound = match &alias.asname {
                    Some(asname) => asname.as_str(),
                    None => alias.name.as_str().split('.').next().unwrap_or_default(),
                };
                members.insert(bound.to_owned());
            }
        }
        Stmt::ImportFrom(import_from) => {
            for alias in &import_from.names {
                if alias.name.as_str() != "*" {
                    let bound = alias.asname.as_ref().unwrap_or(&alias.name);
                    members.insert(bound.to_string());
                }
            }
        }
        Stmt::Delete(delete) => {
            for target in &delete.targets {
                if let Expr::Name(name) = target {
                    members.shift_remove(name.id.as_str());
                }
            }
        }
        _ => {}
    }
}

fn collect_target(target: &Expr, members: &mut IndexSet<String>) {
    match target {
        Expr::Name(name) => {
            members.insert(name.id.to_string());
        }
        Expr::Tuple(tuple) => {
            for element in &tuple.elts {
                collect_target(element, members);
            }
        }
        Expr::List(list) => {
            for element in &list.elts {
                collect_target(element, members);
            }
        }
        Expr::Starred(starred) => collect_target(&starred.value, members),
        _ => {}
    }
}

/// Execute `stub` as the consuming interpreter would: decode, load into a
/// fresh module instance, then apply the store strategy.
///
/// Only the store strategy's bindings reach `scope`; the stub's temporaries
/// never do. Executing the same stub twice yields two distinct instances.
pub fn execute_stub(
    stub: &EmbeddedStub,
    file: Option<&str>,
    loader: &dyn Loader,
    registry: &mut ModuleRegistry,
    scope: &mut Scope,
) -> Result<ModuleId> {
    let source = stub.decode()?;
    let module = loader.load(&stub.module_name, file, &source)?;

    if let StoreStrategy::Export(symbol) = &stub.store {
        if !module.has_member(symbol) {
            return Err(BlobError::Lookup(format!(
                "module '{}' has no attribute '{symbol}'",
                stub.module_name
            )));
        }
    }

    let id = registry.allocate(module);
    match &stub.store {
        StoreStrategy::Default => {
            registry.register(&stub.module_name, id);
        }
        StoreStrategy::Direct => scope.bind(stub.module_name.clone(), Binding::Module(id)),
        StoreStrategy::Export(symbol) => {
            registry.register(&stub.module_name, id);
            scope.bind(
                symbol.clone(),
                Binding::Attribute {
                    module: id,
                    attribute: symbol.clone(),
                },
            );
        }
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        encoder::Encoder,
        options::{DEFAULT_REGISTRY, EncodingOptions, StoreMethod},
    };

    const SOURCE: &str = "import os\n\ndef greet():\n    return 'hi'\n\nVERSION, _tmp = 1, 2\ndel _tmp\n";

    fn stub_for(options: &EncodingOptions) -> EmbeddedStub {
        let text = Encoder::default().encode("greeter", SOURCE, options).unwrap();
        let mut stubs = read_stubs(&text).unwrap();
        assert_eq!(stubs.len(), 1);
        let stub = stubs.remove(0);
        assert_eq!(stub.range, 0..text.len());
        stub
    }

    #[test]
    fn test_read_default_stub() {
        let stub = stub_for(&EncodingOptions::default());
        assert_eq!(stub.module_name, "greeter");
        assert_eq!(stub.decode_kind, DecodeKind::Base64);
        assert_eq!(stub.store, StoreStrategy::Default);
        assert_eq!(stub.registry.as_deref(), Some(DEFAULT_REGISTRY));
        assert_eq!(stub.decode().unwrap(), SOURCE);
    }

    #[test]
    fn test_read_compressed_direct_stub() {
        let stub = stub_for(&EncodingOptions {
            compress: true,
            store_method: Some(StoreMethod::Direct),
            line_width: 16,
            ..EncodingOptions::default()
        });
        assert_eq!(stub.decode_kind, DecodeKind::Base64Inflate);
        assert_eq!(stub.store, StoreStrategy::Direct);
        assert_eq!(stub.registry, None);
        assert_eq!(stub.decode().unwrap(), SOURCE);
    }

    #[test]
    fn test_read_raw_export_stub() {
        let stub = stub_for(&EncodingOptions {
            emit_as_literal: true,
            export_symbol: Some("greet".to_owned()),
            line_width: 10,
            ..EncodingOptions::default()
        });
        assert_eq!(stub.decode_kind, DecodeKind::Raw);
        assert_eq!(stub.store, StoreStrategy::Export("greet".to_owned()));
        assert_eq!(stub.decode().unwrap(), SOURCE);
    }

    #[test]
    fn test_registry_key_must_match_module_name() {
        for options in [
            EncodingOptions::default(),
            EncodingOptions {
                export_symbol: Some("greet".to_owned()),
                ..EncodingOptions::default()
            },
        ] {
            let text = Encoder::default()
                .encode("greeter", SOURCE, &options)
                .unwrap()
                .replace("modules['greeter']=m", "modules['other']=m");
            let err = read_stubs(&text).unwrap_err();
            assert!(
                matches!(&err, BlobError::MalformedStub { message, .. } if message.contains("'other'")),
                "unexpected error: {err}"
            );
        }
    }

    #[test]
    fn test_unrelated_code_is_not_a_stub() {
        let stubs = read_stubs("import base64 as b\nx = b.b64decode(b'')\n").unwrap();
        assert!(stubs.is_empty());
    }

    #[test]
    fn test_static_loader_members() {
        let module = StaticLoader.load("greeter", Some("greeter.py"), SOURCE).unwrap();
        assert_eq!(
            module.members.iter().map(String::as_str).collect::<Vec<_>>(),
            ["os", "greet", "VERSION"]
        );
        assert_eq!(module.file.as_deref(), Some("greeter.py"));
    }

    #[test]
    fn test_execute_default_registers_without_binding() {
        let stub = stub_for(&EncodingOptions::default());
        let mut registry = ModuleRegistry::new();
        let mut scope = Scope::new();
        let id = execute_stub(&stub, None, &StaticLoader, &mut registry, &mut scope).unwrap();
        assert_eq!(registry.lookup("greeter").unwrap().0, id);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_execute_direct_binds_without_registering() {
        let stub = stub_for(&EncodingOptions {
            store_method: Some(StoreMethod::Direct),
            ..EncodingOptions::default()
        });
        let mut registry = ModuleRegistry::new();
        let mut scope = Scope::new();
        let id = execute_stub(&stub, None, &StaticLoader, &mut registry, &mut scope).unwrap();
        assert!(!registry.is_registered("greeter"));
        assert_eq!(scope.get("greeter"), Some(&Binding::Module(id)));
        assert_eq!(scope.names().collect::<Vec<_>>(), ["greeter"]);
    }

    #[test]
    fn test_execute_export_binds_symbol() {
        let stub = stub_for(&EncodingOptions {
            export_symbol: Some("greet".to_owned()),
            ..EncodingOptions::default()
        });
        let mut registry = ModuleRegistry::new();
        let mut scope = Scope::new();
        let id = execute_stub(&stub, None, &StaticLoader, &mut registry, &mut scope).unwrap();
        assert!(registry.is_registered("greeter"));
        assert_eq!(
            scope.get("greet"),
            Some(&Binding::Attribute {
                module: id,
                attribute: "greet".to_owned()
            })
        );
    }

    #[test]
    fn test_execute_export_of_missing_member() {
        let stub = stub_for(&EncodingOptions {
            export_symbol: Some("_tmp".to_owned()),
            ..EncodingOptions::default()
        });
        let mut registry = ModuleRegistry::new();
        let mut scope = Scope::new();
        let err = execute_stub(&stub, None, &StaticLoader, &mut registry, &mut scope).unwrap_err();
        assert!(matches!(err, BlobError::Lookup(_)));
        assert_eq!(registry.instance_count(), 0);
    }

    #[test]
    fn test_reexecution_creates_independent_instance() {
        let stub = stub_for(&EncodingOptions::default());
        let mut registry = ModuleRegistry::new();
        let mut scope = Scope::new();
        let first = execute_stub(&stub, None, &StaticLoader, &mut registry, &mut scope).unwrap();
        let second = execute_stub(&stub, None, &StaticLoader, &mut registry, &mut scope).unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.instance_count(), 2);
        assert_eq!(registry.lookup("greeter").unwrap().0, second);
    }
}
