//! Listing the modules embedded in a distribution

use std::fmt;

use log::debug;

use crate::{
    blob::DecodeKind,
    error::Result,
    loader::{StaticLoader, execute_stub, read_stubs},
    module_registry::{ModuleRegistry, Scope},
    store::StoreStrategy,
};

/// One embedded module found by [`inspect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubReport {
    /// 0 for stubs in the inspected text, 1 for stubs inside their payloads, ...
    pub depth: usize,
    pub module_name: String,
    pub decode_kind: DecodeKind,
    pub store: StoreStrategy,
    pub payload_len: usize,
    pub source_len: usize,
    pub members: Vec<String>,
}

impl fmt::Display for StubReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:indent$}{} [{}, store: {}] payload {} bytes, source {} bytes",
            "",
            self.module_name,
            self.decode_kind,
            self.store,
            self.payload_len,
            self.source_len,
            indent = self.depth * 2
        )?;
        if !self.members.is_empty() {
            write!(f, "; members: {}", self.members.join(", "))?;
        }
        Ok(())
    }
}

/// Decode every stub in `text`, recursing into decoded payloads
pub fn inspect(text: &str) -> Result<Vec<StubReport>> {
    let mut registry = ModuleRegistry::new();
    let mut reports = Vec::new();
    inspect_level(text, 0, &mut registry, &mut reports)?;
    Ok(reports)
}

fn inspect_level(
    text: &str,
    depth: usize,
    registry: &mut ModuleRegistry,
    reports: &mut Vec<StubReport>,
) -> Result<()> {
    let stubs = match read_stubs(text) {
        Ok(stubs) => stubs,
        // Payload sources are not required to parse
        Err(err) if depth > 0 => {
            debug!("Not descending into payload: {err}");
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    for stub in stubs {
        let source = stub.decode()?;
        let mut scope = Scope::new();
        let id = execute_stub(&stub, None, &StaticLoader, registry, &mut scope)?;
        let members = registry
            .get(id)
            .map(|module| module.members.iter().cloned().collect())
            .unwrap_or_default();

        reports.push(StubReport {
            depth,
            module_name: stub.module_name.clone(),
            decode_kind: stub.decode_kind,
            store: stub.store.clone(),
            payload_len: stub.payload_len(),
            source_len: source.len(),
            members,
        });
        inspect_level(&source, depth + 1, registry, reports)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encoder::Encoder, options::EncodingOptions};

    #[test]
    fn test_nested_stubs_are_reported() {
        let encoder = Encoder::default();
        let options = EncodingOptions::default();
        let inner = encoder.encode("six", "PY3 = True\n", &options).unwrap();
        let host = format!("{inner}\ndef main():\n    pass\n");
        let outer = encoder.encode("app", &host, &options).unwrap();

        let reports = inspect(&outer).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].module_name, "app");
        assert_eq!(reports[0].depth, 0);
        assert_eq!(reports[0].members, ["main"]);
        assert_eq!(reports[1].module_name, "six");
        assert_eq!(reports[1].depth, 1);
        assert_eq!(reports[1].members, ["PY3"]);
        assert!(reports[1].to_string().starts_with("  six [base64, store: default]"));
    }
}
