//! Locating the bundled container and Dockerfile templates.
//!
//! Lookup order: `SAGEPACK_RESOURCES`, then a `resources/` directory found by
//! walking up from the running executable, then the path baked in by
//! `build.rs` at compile time.

use anyhow::{Result, bail};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const RESOURCES_DIR: &str = "resources";
const ROOT_SENTINEL: &str = "docker-template/Dockerfile.template";
const CONTAINER_TEMPLATE_DIR: &str = "container-template";
const DOCKER_TEMPLATE_DIR: &str = "docker-template";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resources {
    root: PathBuf,
}

impl Resources {
    /// Use `root` as-is, without checking that it holds the templates.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn discover() -> Result<Self> {
        find_resource_root().map(Self::at)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tree copied into every staged container.
    pub fn container_template(&self) -> PathBuf {
        self.root.join(CONTAINER_TEMPLATE_DIR)
    }

    pub fn docker_template(&self) -> PathBuf {
        self.root.join(DOCKER_TEMPLATE_DIR)
    }

    pub fn dockerfile_template(&self) -> PathBuf {
        self.docker_template().join("Dockerfile.template")
    }
}

fn is_resource_root(candidate: &Path) -> bool {
    candidate.join(ROOT_SENTINEL).is_file() && candidate.join(CONTAINER_TEMPLATE_DIR).is_dir()
}

fn root_from_hint(hint: &str) -> Option<PathBuf> {
    if hint.is_empty() {
        return None;
    }
    let hint_path = PathBuf::from(hint);
    if !is_resource_root(&hint_path) {
        return None;
    }
    fs::canonicalize(hint_path).ok()
}

fn search_upwards(start: &Path) -> Option<PathBuf> {
    let mut dir = fs::canonicalize(start).ok()?;
    loop {
        let candidate = dir.join(RESOURCES_DIR);
        if is_resource_root(&candidate) {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

pub fn find_resource_root() -> Result<PathBuf> {
    if let Ok(env_root) = env::var("SAGEPACK_RESOURCES") {
        if let Some(root) = root_from_hint(&env_root) {
            return Ok(root);
        }
        bail!("SAGEPACK_RESOURCES={env_root} does not contain the sagepack templates");
    }

    if let Ok(exe_path) = env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            if let Some(root) = search_upwards(exe_dir) {
                return Ok(root);
            }
        }
    }

    if let Some(hint) = option_env!("SAGEPACK_RESOURCES_HINT") {
        if let Some(root) = root_from_hint(hint) {
            return Ok(root);
        }
    }

    bail!(
        "Unable to locate the sagepack resources directory. Set SAGEPACK_RESOURCES to the bundled resources/ directory."
    );
}
