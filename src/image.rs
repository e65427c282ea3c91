//! Docker image built from a staged [`CodeContainer`].
//!
//! The Dockerfile is rendered from the bundled template by inserting lines
//! after three marker comments. Building, pushing and local runs shell out to
//! the helper scripts that ship inside the container template.

use crate::container::CodeContainer;
use crate::resources::Resources;
use crate::shell::{CommandRunner, CommandSpec, run_checked};
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_TAG: &str = "latest";

const FROM_MARKER: &str = "FROM_TAG";
const INSTALL_MARKER: &str = "INSTALL_TAG";
const COMMANDS_MARKER: &str = "COMMANDS_TAG";

#[derive(Debug)]
pub struct Image {
    pub container: CodeContainer,
    /// Base images, one `FROM` line each.
    pub froms: Vec<String>,
    /// Extra `RUN` steps executed after the pip install.
    pub build_commands: Vec<String>,
    pub tag: String,
    /// Host directory mounted by the local train/serve scripts.
    pub output_dir: PathBuf,
    resources: Resources,
}

impl Image {
    pub fn new(container: CodeContainer, resources: Resources) -> Self {
        let output_dir = PathBuf::from(format!("{}.output", container.name));
        Self {
            container,
            froms: Vec::new(),
            build_commands: Vec::new(),
            tag: DEFAULT_TAG.to_string(),
            output_dir,
            resources,
        }
    }

    pub fn name(&self) -> &str {
        &self.container.name
    }

    /// `name:tag`
    pub fn tagged_name(&self) -> String {
        format!("{}:{}", self.container.name, self.tag)
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn dockerfile_content(&self) -> Result<String> {
        let template_path = self.resources.dockerfile_template();
        let template = self
            .container
            .fs()
            .read_to_string(&template_path)
            .with_context(|| format!("reading {}", template_path.display()))?;
        let mut lines: Vec<String> = template.split_inclusive('\n').map(str::to_string).collect();

        let at = line_after(&lines, FROM_MARKER)?;
        lines.splice(at..at, self.froms.iter().map(|from| format!("FROM {from}\n")));

        let at = line_after(&lines, INSTALL_MARKER)?;
        if !self.container.pip_packages.is_empty() {
            lines.insert(
                at,
                format!(
                    "RUN pip3.6 install {} && rm -rf /root/.cache\n",
                    self.container.pip_packages.join(" ")
                ),
            );
        }

        let at = line_after(&lines, COMMANDS_MARKER)?;
        lines.splice(
            at..at,
            self.build_commands.iter().map(|cmd| format!("RUN {cmd}\n")),
        );

        Ok(lines.concat())
    }

    /// Package the container, render its Dockerfile and run `build.sh`.
    pub fn build(&self, runner: &dyn CommandRunner, verbose: bool) -> Result<()> {
        self.container.package(&self.resources.container_template())?;
        let dockerfile = self.container.path.join("Dockerfile");
        self.container
            .fs()
            .write_file(&dockerfile, &self.dockerfile_content()?)
            .with_context(|| format!("writing {}", dockerfile.display()))?;

        let spec = CommandSpec::bash(self.container.path.join("build.sh")).arg(self.name());
        run_checked(runner, &spec, verbose, "docker could not build the image")?;
        info!(image = %self.tagged_name(), "built");
        Ok(())
    }

    /// Build, then push to ECR with `push.sh`.
    pub fn push(&self, runner: &dyn CommandRunner, verbose: bool, verbose_build: bool) -> Result<()> {
        self.build(runner, verbose_build)?;
        let spec = CommandSpec::bash(self.container.path.join("push.sh")).arg(self.name());
        run_checked(runner, &spec, verbose, "docker could not push the image")?;
        info!(image = %self.tagged_name(), "pushed");
        Ok(())
    }

    /// Build, then train on this machine. Needs neither AWS nor SageMaker.
    pub fn train(&self, runner: &dyn CommandRunner, verbose: bool, verbose_build: bool) -> Result<()> {
        self.build(runner, verbose_build)?;
        self.container
            .fs()
            .create_dir(&self.output_dir)
            .with_context(|| format!("creating output directory {}", self.output_dir.display()))?;
        self.run_local("train_local.sh", runner, verbose, "training the image failed")
    }

    pub fn serve(&self, runner: &dyn CommandRunner, verbose: bool, verbose_build: bool) -> Result<()> {
        self.build(runner, verbose_build)?;
        self.run_local("serve_local.sh", runner, verbose, "serving the image failed")
    }

    fn run_local(
        &self,
        script: &str,
        runner: &dyn CommandRunner,
        verbose: bool,
        failure: &str,
    ) -> Result<()> {
        let spec = CommandSpec::bash(self.container.path.join("local_test").join(script))
            .arg(self.tagged_name())
            .arg(&self.output_dir);
        run_checked(runner, &spec, verbose, failure)?;
        Ok(())
    }
}

fn line_after(lines: &[String], marker: &str) -> Result<usize> {
    match lines.iter().position(|line| line.contains(marker)) {
        Some(idx) => Ok(idx + 1),
        None => bail!("Dockerfile template has no {marker} line"),
    }
}
