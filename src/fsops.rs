//! Filesystem primitives used by staging and templating.
//!
//! Everything that touches the disk goes through [`FileOps`] so the copy
//! pipeline can be layered on top of the plain primitives (see
//! [`crate::transform::TransformingFs`]) without the packaging code knowing
//! whether a file is converted on the way.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

pub trait FileOps {
    /// Copy a file byte-for-byte or a directory tree, merging into an
    /// existing destination and creating missing parents.
    fn copy_recursive(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Delete a file, or a directory and everything below it.
    fn remove(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> Result<String>;

    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Create a directory (and its parents) when missing.
    fn create_dir(&self, path: &Path) -> Result<()>;

    fn extension(&self, path: &Path) -> String {
        file_extension(path)
    }
}

/// Suffix after the last period of the file name, period included, or an
/// empty string. Leading periods are skipped, so `.bashrc` and `..foo` have
/// no extension, while `file.` has `.`.
pub fn file_extension(path: &Path) -> String {
    let name = basename(path);
    let stem_start = name.len() - name.trim_start_matches('.').len();
    match name[stem_start..].rfind('.') {
        Some(dot) => name[stem_start + dot..].to_string(),
        None => String::new(),
    }
}

/// Final component of `path` as a string, empty when there is none.
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The real filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostFs;

impl FileOps for HostFs {
    fn copy_recursive(&self, source: &Path, destination: &Path) -> Result<()> {
        let metadata =
            fs::metadata(source).map_err(|err| Error::io("reading metadata of", source, err))?;
        if metadata.is_dir() {
            debug!(from = %source.display(), to = %destination.display(), "copying tree");
            copy_tree(source, destination)
        } else {
            debug!(from = %source.display(), to = %destination.display(), "copying file");
            copy_file(source, destination)
        }
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let metadata =
            fs::symlink_metadata(path).map_err(|err| Error::io("reading metadata of", path, err))?;
        if metadata.is_dir() {
            fs::remove_dir_all(path).map_err(|err| Error::io("removing", path, err))
        } else {
            fs::remove_file(path).map_err(|err| Error::io("removing", path, err))
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|err| Error::io("reading", path, err))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        fs::write(path, contents).map_err(|err| Error::io("writing", path, err))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|err| Error::io("creating directory", path, err))
    }
}

fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::io("creating directory", parent, err))?;
        }
    }
    fs::copy(source, destination).map_err(|err| Error::io("copying", source, err))?;
    Ok(())
}

fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination)
        .map_err(|err| Error::io("creating directory", destination, err))?;
    let entries = fs::read_dir(source).map_err(|err| Error::io("listing", source, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| Error::io("listing", source, err))?;
        let from = entry.path();
        let to = destination.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|err| Error::io("reading metadata of", &from, err))?;
        // Links are followed; a dangling one fails here with its own path.
        let is_dir = if file_type.is_symlink() {
            fs::metadata(&from)
                .map_err(|err| Error::io("following link", &from, err))?
                .is_dir()
        } else {
            file_type.is_dir()
        };
        if is_dir {
            copy_tree(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }
    Ok(())
}
