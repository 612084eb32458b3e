//! Writing finished output
//!
//! Output is always fully assembled in memory first. File destinations are
//! written through a temporary file in the same directory that replaces the
//! destination only once everything has been written.

use std::{
    io::{self, Write},
    path::Path,
};

use log::debug;
use tempfile::NamedTempFile;

use crate::error::{BlobError, Result};

/// Write `text` to `destination`, or to stdout when it is `None`
pub fn write_output(destination: Option<&Path>, text: &str) -> Result<()> {
    match destination {
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(text.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|err| BlobError::io("<stdout>", err))
        }
        Some(path) => write_file_atomically(path, text),
    }
}

fn write_file_atomically(path: &Path, text: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(|err| BlobError::io(dir, err))?;
    file.write_all(text.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| BlobError::io(file.path(), err))?;
    file.persist(path)
        .map_err(|err| BlobError::io(path, err.error))?;
    debug!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dist.py");
        fs::write(&path, "old").unwrap();

        write_output(Some(&path), "new contents\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new contents\n");
        // Only the destination remains
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unwritable_destination_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("dist.py");
        let err = write_output(Some(&path), "text").unwrap_err();
        assert!(matches!(err, BlobError::Io { .. }));
        assert!(!path.exists());
    }
}
