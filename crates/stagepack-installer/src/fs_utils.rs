use std::fs;
use std::io;
use std::path::Path;

pub fn remove_dir_all_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Removes `path` only when it is an empty directory. Returns whether it was
/// removed; a missing or non-empty directory is not an error.
pub fn remove_dir_if_empty(path: &Path) -> io::Result<bool> {
    if !dir_is_empty(path)? {
        return Ok(false);
    }

    match fs::remove_dir(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => {
            if dir_is_empty(path)? {
                Err(err)
            } else {
                Ok(false)
            }
        }
    }
}

fn dir_is_empty(path: &Path) -> io::Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
