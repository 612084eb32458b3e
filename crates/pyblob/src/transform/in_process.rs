use log::debug;
use ruff_python_ast::{
    self as ast, AtomicNodeIndex, ExceptHandler, ModModule, Stmt, helpers::is_docstring_stmt,
};
use ruff_python_codegen::{Generator, Stylist};
use ruff_python_parser::parse_module;
use ruff_text_size::TextRange;

use super::SourceTransform;
use crate::error::{BlobError, Result};

/// Re-emits the module from its syntax tree.
///
/// Regeneration drops comments and normalizes formatting. With `obfuscate`,
/// docstrings of the module, its classes and its functions are dropped too.
/// Identifiers are never renamed.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessTransform;

impl SourceTransform for InProcessTransform {
    fn name(&self) -> &str {
        "in-process"
    }

    fn transform(&self, source: &str, obfuscate: bool) -> Result<String> {
        let parsed = parse_module(source).map_err(|err| BlobError::ToolExecution {
            program: self.name().to_owned(),
            code: None,
            output: format!("failed to parse source: {err}"),
        })?;
        let stylist = Stylist::from_tokens(parsed.tokens(), source);

        let mut module = parsed.syntax().clone();
        if obfuscate {
            strip_docstrings(&mut module);
        }

        let mut output = String::with_capacity(source.len());
        for stmt in &module.body {
            output.push_str(&Generator::from(&stylist).stmt(stmt));
            output.push('\n');
        }
        debug!(
            "In-process transform: {} -> {} bytes",
            source.len(),
            output.len()
        );
        Ok(output)
    }
}

/// Remove docstrings from the module and every class or function in it
fn strip_docstrings(module: &mut ModModule) {
    process_body(&mut module.body);
}

fn process_body(body: &mut Vec<Stmt>) {
    if body.first().is_some_and(is_docstring_stmt) {
        body.remove(0);
        if body.is_empty() {
            body.push(Stmt::Pass(ast::StmtPass {
                range: TextRange::default(),
                node_index: AtomicNodeIndex::dummy(),
            }));
        }
    }

    for stmt in body.iter_mut() {
        match stmt {
            Stmt::FunctionDef(func_def) => process_body(&mut func_def.body),
            Stmt::ClassDef(class_def) => process_body(&mut class_def.body),
            Stmt::If(if_stmt) => {
                process_nested(&mut if_stmt.body);
                for clause in &mut if_stmt.elif_else_clauses {
                    process_nested(&mut clause.body);
                }
            }
            Stmt::While(while_stmt) => {
                process_nested(&mut while_stmt.body);
                process_nested(&mut while_stmt.orelse);
            }
            Stmt::For(for_stmt) => {
                process_nested(&mut for_stmt.body);
                process_nested(&mut for_stmt.orelse);
            }
            Stmt::With(with_stmt) => process_nested(&mut with_stmt.body),
            Stmt::Try(try_stmt) => {
                process_nested(&mut try_stmt.body);
                for handler in &mut try_stmt.handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    process_nested(&mut handler.body);
                }
                process_nested(&mut try_stmt.orelse);
                process_nested(&mut try_stmt.finalbody);
            }
            _ => {}
        }
    }
}

/// Visit definitions inside a block that has no docstring of its own
fn process_nested(body: &mut [Stmt]) {
    for stmt in body.iter_mut() {
        match stmt {
            Stmt::FunctionDef(func_def) => process_body(&mut func_def.body),
            Stmt::ClassDef(class_def) => process_body(&mut class_def.body),
            _ => {}
        }
    }
}
