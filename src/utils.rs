//! Utility functions for the annotator.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AnnotatorError, Result};

/// Expand `~` and substitute `{username}` in a configured path.
pub fn expand_path(template: &str, username: &str) -> PathBuf {
    let expanded = shellexpand::tilde(template);
    PathBuf::from(expanded.replace("{username}", &encode_file_component(username.trim())))
}

/// Make a username safe to embed in a file name.
///
/// ASCII letters, digits, `-` and `_` pass through; every other byte becomes
/// `%XX`. Distinct names always give distinct components.
pub fn encode_file_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Replace `path` with `contents` in one step: write a uniquely named temp
/// file in the same directory, flush it to disk, then rename it over the
/// destination. The temp file is removed if any step fails.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| AnnotatorError::io(parent, e))?;
            parent
        }
        None => Path::new("."),
    };

    let write = || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    };

    write().map_err(|e| AnnotatorError::io(path, e))
}
