use std::{
    ffi::OsString,
    io::Write,
    process::{Command, Stdio},
};

use log::debug;
use tempfile::NamedTempFile;

use super::{SourceTransform, normalize_newlines};
use crate::error::{BlobError, Result};

/// Hands the source to an external minifier through a temporary file.
///
/// The program is invoked as `<program> [-O] <file>` and its stdout is the
/// transformed source. The temporary file is removed when this call returns,
/// whether it succeeded or not.
#[derive(Debug, Clone)]
pub struct ExternalProcessTransform {
    program: OsString,
    display_name: String,
}

impl ExternalProcessTransform {
    pub fn new(program: impl Into<OsString>) -> Self {
        let program = program.into();
        let display_name = program.to_string_lossy().into_owned();
        Self {
            program,
            display_name,
        }
    }

    fn tool_error(&self, code: Option<i32>, output: String) -> BlobError {
        BlobError::ToolExecution {
            program: self.display_name.clone(),
            code,
            output,
        }
    }
}

impl SourceTransform for ExternalProcessTransform {
    fn name(&self) -> &str {
        &self.display_name
    }

    fn transform(&self, source: &str, obfuscate: bool) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("pyblob-")
            .suffix(".py")
            .tempfile()
            .map_err(|err| BlobError::io(std::env::temp_dir(), err))?;
        write_source(&mut file, source)?;

        let mut command = Command::new(&self.program);
        if obfuscate {
            command.arg("-O");
        }
        command
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!("Running {command:?}");

        let output = command
            .output()
            .map_err(|err| self.tool_error(None, format!("could not be started: {err}")))?;
        // `file` is still alive here and is removed when it drops below

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(self.tool_error(output.status.code(), combined));
        }

        let stdout = String::from_utf8(output.stdout).map_err(|err| {
            self.tool_error(
                output.status.code(),
                format!("produced output that is not UTF-8: {err}"),
            )
        })?;
        drop(file);
        Ok(normalize_newlines(&stdout))
    }
}

fn write_source(file: &mut NamedTempFile, source: &str) -> Result<()> {
    file.write_all(source.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| BlobError::io(file.path(), err))
}
