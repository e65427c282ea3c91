//! Project manifest (`sagepack.json`).
//!
//! The manifest is checked against the bundled JSON Schema first, then
//! deserialized and given a few semantic checks the schema cannot express.
//! Relative paths in it resolve against the manifest's own directory.

use crate::container::{CodeContainer, FileMapping, notebook_fs};
use crate::image::Image;
use crate::resources::Resources;
use crate::sagemaker::DEFAULT_INPUT_DIR;
use crate::valohai::ValohaiAdapter;
use anyhow::{Context, Result, anyhow, bail};
use jsonschema::JSONSchema;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST: &str = "sagepack.json";
pub const MANIFEST_ENV: &str = "SAGEPACK_MANIFEST";

const MANIFEST_SCHEMA: &str = include_str!("../schema/manifest.schema.json");

/// `--manifest`, else `SAGEPACK_MANIFEST`, else `./sagepack.json`.
pub fn manifest_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    env::var_os(MANIFEST_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST))
}

/// A bare path keeps its file name; a one-entry object renames.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FileEntry {
    Path(String),
    Renamed(BTreeMap<String, String>),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSection {
    #[serde(default)]
    pub froms: Vec<String>,
    #[serde(default)]
    pub build_commands: Vec<String>,
    pub tag: Option<String>,
    pub output_dir: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SageMakerSection {
    pub region: Option<String>,
    pub input_dir: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValohaiSection {
    pub project_name: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub cli_args: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub name: String,
    pub path: Option<String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub pip_packages: Vec<String>,
    pub train_script: Option<String>,
    #[serde(default)]
    pub working_dir: String,
    #[serde(default)]
    pub python_path: String,
    /// Stage `.ipynb` files renamed to `.py` as their tagged code.
    #[serde(default = "default_true")]
    pub transform_notebooks: bool,
    #[serde(default)]
    pub image: ImageSection,
    #[serde(default)]
    pub sagemaker: SageMakerSection,
    #[serde(default)]
    pub valohai: ValohaiSection,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_value(value, base_dir).with_context(|| format!("invalid manifest {}", path.display()))
    }

    /// Validate and deserialize; relative paths resolve against `base_dir`.
    pub fn from_value(value: Value, base_dir: impl Into<PathBuf>) -> Result<Self> {
        validate_against_schema(&value)?;
        let mut manifest: Manifest = serde_json::from_value(value)?;
        manifest.base_dir = base_dir.into();
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn validate(&self) -> Result<()> {
        validate_image_name(&self.name)?;
        for entry in &self.files {
            if let FileEntry::Renamed(pairs) = entry {
                if pairs.len() != 1 {
                    bail!(
                        "files entries that rename must hold exactly one source: target pair, got {}",
                        pairs.len()
                    );
                }
            }
        }
        if let Some(tag) = self.image.tag.as_deref() {
            validate_tag(tag)?;
        }
        Ok(())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }

    pub fn file_mappings(&self) -> Vec<FileMapping> {
        self.files
            .iter()
            .flat_map(|entry| match entry {
                FileEntry::Path(path) => vec![FileMapping::keep_name(self.resolve(path))],
                FileEntry::Renamed(pairs) => pairs
                    .iter()
                    .map(|(from, to)| FileMapping::renamed(self.resolve(from), to.clone()))
                    .collect(),
            })
            .collect()
    }

    pub fn container_path(&self) -> PathBuf {
        match self.path.as_deref() {
            Some(path) => self.resolve(path),
            None => self.resolve(&format!("{}.container", self.name)),
        }
    }

    pub fn code_container(&self) -> CodeContainer {
        let mut container = CodeContainer::new(self.name.clone()).with_path(self.container_path());
        if self.transform_notebooks {
            container = container.with_fs(notebook_fs());
        }
        container.files = self.file_mappings();
        container.pip_packages = self.pip_packages.clone();
        if let Some(script) = self.train_script.as_ref() {
            container.train_script = script.clone();
        }
        container.working_dir = self.working_dir.clone();
        container.python_path = self.python_path.clone();
        container
    }

    pub fn image(&self, resources: Resources) -> Image {
        let mut image = Image::new(self.code_container(), resources);
        image.froms = self.image.froms.clone();
        image.build_commands = self.image.build_commands.clone();
        if let Some(tag) = self.image.tag.as_ref() {
            image.tag = tag.clone();
        }
        image.output_dir = match self.image.output_dir.as_deref() {
            Some(dir) => self.resolve(dir),
            None => self.resolve(&format!("{}.output", self.name)),
        };
        image
    }

    pub fn valohai_adapter(&self, resources: Resources) -> ValohaiAdapter {
        let mut adapter = ValohaiAdapter::new(self.code_container(), resources);
        adapter.project_name = self.valohai.project_name.clone();
        if let Some(image) = self.valohai.image.as_ref() {
            adapter.image = image.clone();
        }
        adapter.cli_args = self.valohai.cli_args.clone();
        adapter.commands = self.valohai.commands.clone();
        adapter
    }

    pub fn input_dir(&self) -> PathBuf {
        self.resolve(self.sagemaker.input_dir.as_deref().unwrap_or(DEFAULT_INPUT_DIR))
    }
}

fn validate_against_schema(value: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(MANIFEST_SCHEMA).context("parsing bundled manifest schema")?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| anyhow!("compiling bundled manifest schema: {err}"))?;
    if let Err(errors) = compiled.validate(value) {
        let details = errors
            .map(|err| {
                let pointer = err.instance_path.to_string();
                if pointer.is_empty() {
                    err.to_string()
                } else {
                    format!("{pointer}: {err}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        bail!("manifest failed schema validation:\n{details}");
    }
    Ok(())
}

// Docker repository names: lowercase alphanumerics separated by `.`, `_`
// or `-`.
fn validate_image_name(name: &str) -> Result<()> {
    let starts_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !starts_ok
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
    {
        bail!("name must match ^[a-z0-9][a-z0-9_.-]*$ to be usable as an image name, got {name:?}");
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<()> {
    if tag.len() > 128
        || tag.starts_with(['.', '-'])
        || !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        bail!("image.tag must match ^[A-Za-z0-9_][A-Za-z0-9_.-]{{0,127}}$, got {tag:?}");
    }
    Ok(())
}
