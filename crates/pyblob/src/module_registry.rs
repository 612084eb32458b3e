//! Module registry for modules reconstructed from decoder stubs
//!
//! Stubs installed with the `default` or `export` strategies register their
//! module in a process-wide registry of the consuming interpreter. This is the
//! explicit counterpart of that registry: it is passed by reference to
//! whatever executes stubs, and every execution allocates a new module
//! instance.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;

/// Type alias for FxHasher-based IndexMap
type FxIndexMap<K, V> = IndexMap<K, V, std::hash::BuildHasherDefault<FxHasher>>;

/// Identity of one reconstructed module instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A module reconstructed from a stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub name: String,
    /// Origin metadata attached by the stub (its `__file__`)
    pub file: Option<String>,
    /// Decoded source text
    pub source: String,
    /// Names bound at module level once the source has run
    pub members: IndexSet<String>,
}

impl LoadedModule {
    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains(name)
    }
}

/// Central registry of reconstructed modules
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    /// Every instance ever created, registered or not
    instances: FxIndexMap<ModuleId, LoadedModule>,
    /// Registry key to the most recently registered instance
    name_to_id: FxIndexMap<String, ModuleId>,
    next_id: u32,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            instances: FxIndexMap::default(),
            name_to_id: FxIndexMap::default(),
            next_id: 0,
        }
    }

    /// Take ownership of a new module instance without registering it
    pub fn allocate(&mut self, module: LoadedModule) -> ModuleId {
        let id = ModuleId(self.next_id);
        self.next_id += 1;
        self.instances.insert(id, module);
        id
    }

    /// Point registry key `name` at instance `id`, returning the instance it
    /// previously pointed at
    pub fn register(&mut self, name: &str, id: ModuleId) -> Option<ModuleId> {
        log::debug!("Registering module '{name}' as {id}");
        self.name_to_id.insert(name.to_owned(), id)
    }

    pub fn get(&self, id: ModuleId) -> Option<&LoadedModule> {
        self.instances.get(&id)
    }

    /// Instance currently registered under `name`
    pub fn lookup(&self, name: &str) -> Option<(ModuleId, &LoadedModule)> {
        let id = *self.name_to_id.get(name)?;
        self.instances.get(&id).map(|module| (id, module))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.name_to_id.contains_key(name)
    }

    /// Registered names in registration order
    pub fn registered_names(&self) -> impl Iterator<Item = &str> {
        self.name_to_id.keys().map(String::as_str)
    }

    /// Number of instances created, including unregistered ones
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

/// A binding created in the invoking scope by a stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// The module object itself
    Module(ModuleId),
    /// An attribute extracted from a module
    Attribute { module: ModuleId, attribute: String },
}

/// Variables of the scope that executes stubs
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: IndexMap<String, Binding>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        self.bindings.insert(name.into(), binding);
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str) -> LoadedModule {
        LoadedModule {
            name: name.to_owned(),
            file: None,
            source: String::new(),
            members: IndexSet::new(),
        }
    }

    #[test]
    fn test_allocate_does_not_register() {
        let mut registry = ModuleRegistry::new();
        let id = registry.allocate(module("foo"));
        assert!(!registry.is_registered("foo"));
        assert_eq!(registry.get(id).unwrap().name, "foo");
    }

    #[test]
    fn test_reregistration_replaces_entry() {
        let mut registry = ModuleRegistry::new();
        let first = registry.allocate(module("foo"));
        let second = registry.allocate(module("foo"));
        assert_ne!(first, second);

        assert_eq!(registry.register("foo", first), None);
        assert_eq!(registry.register("foo", second), Some(first));
        assert_eq!(registry.lookup("foo").unwrap().0, second);
        // The replaced instance still exists independently
        assert!(registry.get(first).is_some());
        assert_eq!(registry.instance_count(), 2);
        assert_eq!(registry.registered_names().collect::<Vec<_>>(), ["foo"]);
    }

    #[test]
    fn test_scope_bindings() {
        let mut scope = Scope::new();
        assert!(scope.is_empty());
        scope.bind("six", Binding::Module(ModuleId(0)));
        scope.bind(
            "localimport",
            Binding::Attribute {
                module: ModuleId(1),
                attribute: "localimport".to_owned(),
            },
        );
        assert_eq!(scope.get("six"), Some(&Binding::Module(ModuleId(0))));
        assert_eq!(scope.names().collect::<Vec<_>>(), ["six", "localimport"]);
    }
}
