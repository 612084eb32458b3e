//! Decoder stub template
//!
//! A stub is Python text that, when executed, creates a fresh module object,
//! decodes the embedded payload into it, installs the module according to the
//! store strategy and removes every temporary binding it introduced.

use std::fmt::Write;

/// Temporaries bound by a stub and deleted by its last statement
pub const STUB_TEMPORARIES: [&str; 5] = ["blob", "b", "t", "z", "m"];

/// Every input needed to render a stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubTemplate {
    pub module_name: String,
    /// Wrapped payload literal, including its quotes and prefix
    pub payload_literal: String,
    pub decode_expression: String,
    pub store_expression: String,
}

impl StubTemplate {
    /// Render the stub. The output has no leading or trailing newline so it
    /// can replace a single statement in place.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.payload_literal.len() + 256);
        let _ = writeln!(
            out,
            "import base64 as b, types as t, zlib as z; m=t.ModuleType({});",
            quote(&self.module_name)
        );
        let _ = writeln!(out, "m.__file__ = __file__; blob={}", self.payload_literal);
        let _ = writeln!(
            out,
            "exec({}, vars(m)); {}",
            self.decode_expression, self.store_expression
        );
        let _ = write!(out, "del {};", STUB_TEMPORARIES.join(", "));
        out
    }
}

/// Render `value` as a single-quoted Python string literal
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_render_template() {
        let template = StubTemplate {
            module_name: "foo".to_owned(),
            payload_literal: "b'\\\ncHJpbnQoMSk='".to_owned(),
            decode_expression: "b.b64decode(blob)".to_owned(),
            store_expression: "foo=m".to_owned(),
        };
        assert_eq!(
            template.render(),
            "import base64 as b, types as t, zlib as z; m=t.ModuleType('foo');\n\
             m.__file__ = __file__; blob=b'\\\ncHJpbnQoMSk='\n\
             exec(b.b64decode(blob), vars(m)); foo=m\n\
             del blob, b, t, z, m;"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = StubTemplate {
            module_name: "six".to_owned(),
            payload_literal: "b''".to_owned(),
            decode_expression: "blob".to_owned(),
            store_expression: "six=m".to_owned(),
        };
        assert_eq!(template.render(), template.clone().render());
    }

    #[test]
    fn test_quote() {
        insta::assert_snapshot!(quote("it's"), @r"'it\'s'");
        insta::assert_snapshot!(quote("a\\b\n"), @r"'a\\b\n'");
        insta::assert_snapshot!(quote("\u{1}"), @r"'\x01'");
    }
}
