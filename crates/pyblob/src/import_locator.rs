//! Locating the import statement a dependency stub replaces

use std::ops::Range;

use log::{trace, warn};
use ruff_python_ast::{Stmt, StmtImport};
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;

/// How an import statement was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateMethod {
    /// From the parsed syntax tree
    Syntax,
    /// Line scan, used when the host text does not parse
    Textual,
}

/// Byte range of the statement to replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSite {
    pub range: Range<usize>,
    pub method: LocateMethod,
}

/// Find the first module-level `import <module_name>` statement in `source`.
///
/// Only statements importing exactly that module, without an alias, qualify:
/// replacing them with a stub that binds the module name keeps the binding
/// the statement created. Imports nested in blocks are not considered, since
/// a stub is not indented.
pub fn locate_import(source: &str, module_name: &str) -> Option<ImportSite> {
    match parse_module(source) {
        Ok(parsed) => parsed
            .syntax()
            .body
            .iter()
            .find(|stmt| match stmt {
                Stmt::Import(import) => imports_exactly(import, module_name),
                _ => false,
            })
            .map(|stmt| {
                let range = stmt.range();
                trace!("Found 'import {module_name}' at {range:?}");
                let start = range.start().to_usize();
                ImportSite {
                    range: start..through_semicolon(source, range.end().to_usize()),
                    method: LocateMethod::Syntax,
                }
            }),
        Err(err) => {
            warn!("Host text does not parse ({err}); scanning lines for 'import {module_name}'");
            locate_textually(source, module_name)
        }
    }
}

fn imports_exactly(import: &StmtImport, module_name: &str) -> bool {
    matches!(
        import.names.as_slice(),
        [alias] if alias.asname.is_none() && alias.name.as_str() == module_name
    )
}

/// Extend a statement ending at `end` over a `;` that separates it from the
/// next statement on the same line. A stub supplies its own closing `;`.
fn through_semicolon(source: &str, end: usize) -> usize {
    let rest = &source[end..];
    let gap = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    if rest[gap..].starts_with(';') {
        end + gap + 1
    } else {
        end
    }
}

/// First line that reads exactly `import <module_name>`, ignoring trailing
/// whitespace
fn locate_textually(source: &str, module_name: &str) -> Option<ImportSite> {
    let wanted = format!("import {module_name}");
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        let content = line.trim_end();
        if content == wanted {
            return Some(ImportSite {
                range: offset..offset + wanted.len(),
                method: LocateMethod::Textual,
            });
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replaced<'a>(source: &'a str, site: &ImportSite) -> &'a str {
        &source[site.range.clone()]
    }

    #[test]
    fn test_first_module_level_import() {
        let source = "\"\"\"Mentions import six in a docstring.\"\"\"\nimport os\nimport six\nimport six\n";
        let site = locate_import(source, "six").unwrap();
        assert_eq!(site.method, LocateMethod::Syntax);
        assert_eq!(replaced(source, &site), "import six");
        assert_eq!(site.range.start, source.find("import six\n").unwrap());
    }

    #[test]
    fn test_aliases_and_multi_imports_do_not_match() {
        let source = "import six as s\nimport os, six\nfrom six import moves\n";
        assert!(locate_import(source, "six").is_none());
    }

    #[test]
    fn test_nested_imports_are_ignored() {
        let source = "try:\n    import six\nexcept ImportError:\n    six = None\n";
        assert!(locate_import(source, "six").is_none());
    }

    #[test]
    fn test_dotted_module() {
        let source = "import os.path\nimport pkg.util\n";
        let site = locate_import(source, "pkg.util").unwrap();
        assert_eq!(replaced(source, &site), "import pkg.util");
    }

    #[test]
    fn test_statement_after_semicolon() {
        let source = "import os; import six\n";
        let site = locate_import(source, "six").unwrap();
        assert_eq!(replaced(source, &site), "import six");
    }

    #[test]
    fn test_statement_before_semicolon() {
        let source = "import six ; x = 1\nimport os\n";
        let site = locate_import(source, "six").unwrap();
        assert_eq!(replaced(source, &site), "import six ;");
        assert_eq!(&source[site.range.end..], " x = 1\nimport os\n");

        let source = "import six  # ; not a separator\n";
        let site = locate_import(source, "six").unwrap();
        assert_eq!(replaced(source, &site), "import six");
    }

    #[test]
    fn test_textual_fallback_for_unparsable_host() {
        let source = "print 'python 2'\nimport six  \nimport six\n";
        let site = locate_import(source, "six").unwrap();
        assert_eq!(site.method, LocateMethod::Textual);
        assert_eq!(site.range, 17..27);
        assert_eq!(replaced(source, &site), "import six");
    }
}
