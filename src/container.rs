//! Staging directory for a training container.
//!
//! A [`CodeContainer`] owns the list of user files to ship and knows how to
//! lay out `<path>/` from the bundled container template: the template tree
//! itself, the user files under `model/user/`, and the three small text files
//! the entrypoint reads at run time.

use crate::fsops::{FileOps, HostFs, basename};
use crate::transform::{FileTransformer, NotebookExtractor, TransformingFs};
use anyhow::{Context, Result, bail};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_TRAIN_SCRIPT: &str = "train.py";

const PYTHON_PATH_FILE: &str = "append_python_path.txt";
const WORKING_DIR_FILE: &str = "working_directory.txt";
const TRAIN_SCRIPT_FILE: &str = "train_script_location.txt";

/// One file (or directory) to stage, and its name under `model/user/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMapping {
    pub from: PathBuf,
    pub to: String,
}

impl FileMapping {
    /// Stage `from` under its own file name.
    pub fn keep_name(from: impl Into<PathBuf>) -> Self {
        let from = from.into();
        let to = basename(&from);
        Self { from, to }
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

pub struct CodeContainer {
    pub name: String,
    pub path: PathBuf,
    pub files: Vec<FileMapping>,
    pub pip_packages: Vec<String>,
    pub train_script: String,
    pub working_dir: String,
    pub python_path: String,
    fs: Box<dyn FileOps>,
}

impl fmt::Debug for CodeContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeContainer")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("files", &self.files)
            .field("pip_packages", &self.pip_packages)
            .field("train_script", &self.train_script)
            .field("working_dir", &self.working_dir)
            .field("python_path", &self.python_path)
            .finish_non_exhaustive()
    }
}

impl CodeContainer {
    /// A container staged at `./<name>.container` that copies files verbatim.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let path = PathBuf::from(".").join(format!("{name}.container"));
        Self {
            name,
            path,
            files: Vec::new(),
            pip_packages: Vec::new(),
            train_script: DEFAULT_TRAIN_SCRIPT.to_string(),
            working_dir: String::new(),
            python_path: String::new(),
            fs: Box::new(HostFs),
        }
    }

    pub fn with_fs(mut self, fs: impl FileOps + 'static) -> Self {
        self.fs = Box::new(fs);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn fs(&self) -> &dyn FileOps {
        self.fs.as_ref()
    }

    /// `<path>/model`, the tree that ends up in `/opt/program`.
    pub fn model_dir(&self) -> PathBuf {
        self.path.join("model")
    }

    pub fn user_dir(&self) -> PathBuf {
        self.model_dir().join("user")
    }

    /// Copy every configured file to `model/user/<to>`.
    pub fn copy_files_to_container(&self) -> Result<()> {
        let user_dir = self.user_dir();
        for mapping in &self.files {
            let target = user_dir.join(&mapping.to);
            self.fs
                .copy_recursive(&mapping.from, &target)
                .with_context(|| {
                    format!(
                        "staging {} as {}",
                        mapping.from.display(),
                        target.display()
                    )
                })?;
        }
        Ok(())
    }

    pub fn write_config_files(&self) -> Result<()> {
        let model_dir = self.model_dir();
        self.fs.create_dir(&model_dir)?;
        for (file, value) in [
            (PYTHON_PATH_FILE, &self.python_path),
            (WORKING_DIR_FILE, &self.working_dir),
            (TRAIN_SCRIPT_FILE, &self.train_script),
        ] {
            self.fs.write_file(&model_dir.join(file), value)?;
        }
        Ok(())
    }

    /// Rebuild the staging directory from `template`.
    pub fn package(&self, template: &Path) -> Result<()> {
        if !self.fs.exists(template) {
            bail!(
                "Could not find the container template directory {}; check SAGEPACK_RESOURCES",
                template.display()
            );
        }

        if self.fs.exists(&self.path) {
            self.fs
                .remove(&self.path)
                .with_context(|| format!("clearing previous container {}", self.path.display()))?;
        }
        self.fs
            .copy_recursive(template, &self.path)
            .with_context(|| format!("copying container template to {}", self.path.display()))?;
        self.copy_files_to_container()?;
        self.write_config_files()?;
        info!(container = %self.name, path = %self.path.display(), files = self.files.len(), "packaged");
        Ok(())
    }
}

/// Like [`CodeContainer::new`], but `.ipynb` files staged under a `.py` name
/// are reduced to their tagged code.
pub fn notebook_container(name: impl Into<String>) -> CodeContainer {
    CodeContainer::new(name).with_fs(notebook_fs())
}

/// Host filesystem with the notebook extractor registered.
pub fn notebook_fs() -> TransformingFs {
    TransformingFs::with_transformers(
        HostFs,
        [Box::new(NotebookExtractor::new()) as Box<dyn FileTransformer>],
    )
}
