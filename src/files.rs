use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{MailError, Result};

/// Separator placed between the attachment directory and a saved file name.
pub const PATH_SEPARATOR: &str = "/";

/// Resolves `path` to an existing regular file.
pub fn get_file(path: &str) -> Result<PathBuf> {
    let file = PathBuf::from(path);
    if file.is_file() {
        Ok(file)
    } else {
        Err(MailError::ResourceMissing(file))
    }
}

pub fn read_file(path: &str) -> Result<Vec<u8>> {
    let file = get_file(path)?;
    fs::read(&file).map_err(|e| {
        debug!("Reading {} failed: {}", file.display(), e);
        MailError::ResourceMissing(file)
    })
}

/// Bare file name of `path`, without any directory part.
pub fn file_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

/// Writes `content` to `destination`. Failures are logged, not returned.
pub fn save_file(content: &[u8], destination: &str) -> bool {
    let destination = Path::new(destination);
    if let Some(parent) = destination.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Cannot create {}: {}", parent.display(), e);
            return false;
        }
    }
    match fs::write(destination, content) {
        Ok(()) => true,
        Err(e) => {
            warn!("Cannot save {}: {}", destination.display(), e);
            false
        }
    }
}
