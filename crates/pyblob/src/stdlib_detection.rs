//! Standard library detection for dependency names
//!
//! Inlining a standard library module into a distribution is almost always a
//! mistake, so the build orchestrator uses this to warn about it.

use ruff_python_stdlib::sys;

/// Default Python minor version used for stdlib classification (3.10)
pub const DEFAULT_PYTHON_VERSION: u8 = 10;

/// Check if a module name represents a Python standard library module
///
/// Both direct matches and submodules are recognized (e.g., "os" and
/// "os.path").
///
/// # Arguments
/// * `module_name` - The module name to check
/// * `python_version` - The Python 3 minor version (e.g., 10 for Python 3.10)
pub fn is_stdlib_module(module_name: &str, python_version: u8) -> bool {
    // __future__ is not part of ruff's stdlib table
    if module_name == "__future__" {
        return true;
    }

    if sys::is_known_standard_library(python_version, module_name) {
        return true;
    }

    module_name
        .split('.')
        .next()
        .is_some_and(|top_level| sys::is_known_standard_library(python_version, top_level))
}
