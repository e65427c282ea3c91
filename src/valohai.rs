//! Ad-hoc Valohai executions of a staged container.
//!
//! The `vh` CLI does the talking to Valohai. We package the container, give
//! it a private CLI settings directory (`<container>/valohai.cfg`) seeded
//! with the user's global login, link the `model/` directory to a project,
//! describe a single `execution` step in `valohai.yaml` and start it.

use crate::container::CodeContainer;
use crate::resources::Resources;
use crate::shell::{CommandOutput, CommandRunner, CommandSpec, run_checked};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_IMAGE: &str = "python:3.6";
pub const CONFIG_DIR_ENV: &str = "VALOHAI_CONFIG_DIR";

const SETTINGS_DIR: &str = "valohai.cfg";
const SETTINGS_FILE: &str = "config.json";
const STEP_NAME: &str = "execution";

/// The subset of the Valohai CLI settings file we read and write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValohaiSettings {
    pub host: String,
    pub user: Value,
    pub token: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, Value>,
}

impl ValohaiSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => anyhow::bail!(
                "The Valohai configuration file {} was not found. Please login using 'vh login'",
                path.display()
            ),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Settings written by `vh login`.
    pub fn load_global() -> Result<Self> {
        Self::load(&global_config_dir()?.join(SETTINGS_FILE))
    }

    /// Only the login; links are left for `vh` to record.
    pub fn login_only(&self) -> Self {
        Self {
            host: self.host.clone(),
            user: self.user.clone(),
            token: self.token.clone(),
            links: BTreeMap::new(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(self)?;
        fs::write(path, body).with_context(|| format!("writing {}", path.display()))
    }
}

/// `VALOHAI_CONFIG_DIR` when set, else the Valohai CLI's per-user directory.
pub fn global_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let base = directories::BaseDirs::new()
        .context("could not determine the user configuration directory")?;
    Ok(base.config_dir().join("valohai-cli"))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepInput {
    pub name: String,
    pub default: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Step {
    pub name: String,
    pub image: String,
    pub command: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<StepInput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Value>,
}

#[derive(Serialize)]
struct StepEntry<'a> {
    step: &'a Step,
}

#[derive(Debug)]
pub struct ValohaiAdapter {
    pub container: CodeContainer,
    /// Defaults to the container name.
    pub project_name: Option<String>,
    pub image: String,
    /// Extra arguments appended to `vh execution run`.
    pub cli_args: Vec<String>,
    /// Shell commands run before pip and training.
    pub commands: Vec<String>,
    resources: Resources,
}

impl ValohaiAdapter {
    pub fn new(container: CodeContainer, resources: Resources) -> Self {
        Self {
            container,
            project_name: None,
            image: DEFAULT_IMAGE.to_string(),
            cli_args: Vec::new(),
            commands: Vec::new(),
            resources,
        }
    }

    pub fn project_name(&self) -> &str {
        self.project_name.as_deref().unwrap_or(&self.container.name)
    }

    pub fn settings_dir(&self) -> PathBuf {
        self.container.path.join(SETTINGS_DIR)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings_dir().join(SETTINGS_FILE)
    }

    /// Canonical `<container>/model`; exists only once packaged.
    pub fn project_path(&self) -> Result<PathBuf> {
        let model = self.container.model_dir();
        fs::canonicalize(&model).with_context(|| format!("resolving {}", model.display()))
    }

    pub fn step_command(&self) -> String {
        let mut command = String::new();
        if !self.container.pip_packages.is_empty() {
            command.push_str(&format!(
                "pip3 install {} && ",
                self.container.pip_packages.join(" ")
            ));
        }
        if !self.commands.is_empty() {
            command.push_str(&format!("{} && ", self.commands.join(" && ")));
        }
        command.push_str("bash ./train");
        command
    }

    /// `inputs` maps an input name to the URL its file is fetched from.
    pub fn step(&self, inputs: &BTreeMap<String, String>, parameters: &[Value]) -> Step {
        Step {
            name: STEP_NAME.to_string(),
            image: self.image.clone(),
            command: self.step_command(),
            inputs: inputs
                .iter()
                .map(|(name, default)| StepInput {
                    name: name.clone(),
                    default: default.clone(),
                })
                .collect(),
            parameters: parameters.to_vec(),
        }
    }

    /// Contents of `valohai.yaml`: a one-step list.
    pub fn step_document(
        &self,
        inputs: &BTreeMap<String, String>,
        parameters: &[Value],
    ) -> Result<String> {
        let step = self.step(inputs, parameters);
        serde_yaml::to_string(&vec![StepEntry { step: &step }]).context("serializing valohai.yaml")
    }

    fn vh(&self, project_path: &Path) -> CommandSpec {
        let settings_dir = self.settings_dir();
        let settings_dir = fs::canonicalize(&settings_dir).unwrap_or(settings_dir);
        CommandSpec::new("vh")
            .env(CONFIG_DIR_ENV, settings_dir)
            .current_dir(project_path)
    }

    /// Link `project_path` to the project. The project is created only when
    /// `vh` reports that it does not exist; any other link failure is an
    /// error.
    pub fn link_project(&self, runner: &dyn CommandRunner, project_path: &Path) -> Result<()> {
        let name = self.project_name();
        let link = self.vh(project_path).args(["project", "link", name]);
        let linked = runner.run(&link, false)?;
        if linked.success() {
            info!(project = name, "linked Valohai project");
            return Ok(());
        }
        let link_stderr = linked.stderr.trim_end();
        if !project_missing(link_stderr) {
            bail!(
                "could not link the Valohai project {name} ({}): {link_stderr}",
                exit_label(&linked)
            );
        }

        info!(project = name, "project not found, creating it");
        let create = self
            .vh(project_path)
            .args(["project", "create", "--name", name, "--yes"]);
        let created = runner.run(&create, false)?;
        if !created.success() {
            let create_stderr = created.stderr.trim_end();
            warn!(project = name, link = %link_stderr, create = %create_stderr, "link and create both failed");
            bail!(
                "could not create the Valohai project {name} ({}): {create_stderr}\nlink failed first: {link_stderr}",
                exit_label(&created)
            );
        }
        info!(project = name, "created Valohai project");
        Ok(())
    }

    /// Private settings, project link and `valohai.yaml`. Expects a packaged
    /// container.
    pub fn save_local_configs(
        &self,
        runner: &dyn CommandRunner,
        global: &ValohaiSettings,
        inputs: &BTreeMap<String, String>,
        parameters: &[Value],
    ) -> Result<()> {
        global.login_only().save(&self.settings_path())?;
        let project_path = self.project_path()?;
        self.link_project(runner, &project_path)?;

        let yaml = project_path.join("valohai.yaml");
        fs::write(&yaml, self.step_document(inputs, parameters)?)
            .with_context(|| format!("writing {}", yaml.display()))
    }

    /// Package, configure and start the execution.
    pub fn launch_execution(
        &self,
        runner: &dyn CommandRunner,
        global: &ValohaiSettings,
        inputs: &BTreeMap<String, String>,
        parameters: &[Value],
        verbose: bool,
    ) -> Result<CommandOutput> {
        self.container.package(&self.resources.container_template())?;
        self.save_local_configs(runner, global, inputs, parameters)?;

        let run = self
            .vh(&self.project_path()?)
            .args(["execution", "run", "--adhoc", STEP_NAME])
            .args(&self.cli_args);
        let output = run_checked(runner, &run, verbose, "could not start the Valohai execution")?;
        info!(project = self.project_name(), "execution started");
        Ok(output)
    }
}

/// Whether `vh project link` failed because no project matched.
fn project_missing(stderr: &str) -> bool {
    const MISSING: [&str; 5] = [
        "no projects match",
        "no such project",
        "no project found",
        "don't have any projects",
        "not found",
    ];
    let stderr = stderr.to_lowercase();
    MISSING.iter().any(|needle| stderr.contains(needle))
}

fn exit_label(output: &CommandOutput) -> String {
    match output.code {
        Some(code) => format!("exit {code}"),
        None => "terminated by signal".to_string(),
    }
}
