//! Package training code and run it locally, on SageMaker or on Valohai.
//!
//! Usage:
//!   sagepack package
//!   sagepack train --manifest path/to/sagepack.json
//!   sagepack ecr-name
//!   sagepack copy report.ipynb train.py

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sagepack::container::notebook_fs;
use sagepack::manifest::{Manifest, manifest_path};
use sagepack::sagemaker::SageMakerTarget;
use sagepack::shell::ShellRunner;
use sagepack::valohai::ValohaiSettings;
use sagepack::{FileOps, Resources};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sagepack", version)]
#[command(about = "Stage training code into Docker images and Valohai executions")]
struct Cli {
    /// Manifest to read; defaults to $SAGEPACK_MANIFEST, then ./sagepack.json.
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,
    /// Echo the output of external commands while they run.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage the container directory without building.
    Package,
    /// Build the Docker image.
    Build,
    /// Build and push the image to ECR.
    Push,
    /// Build and train locally.
    Train,
    /// Build and serve locally.
    Serve,
    /// Print the ECR name of the image.
    EcrName,
    /// Upload the training data directory to the SageMaker bucket.
    Upload {
        /// Overrides sagemaker.input_dir.
        #[arg(long)]
        input_dir: Option<PathBuf>,
    },
    /// Package and start an ad-hoc Valohai execution.
    Valohai,
    /// Copy a file, converting notebooks to scripts when the extensions ask for it.
    Copy { source: PathBuf, destination: PathBuf },
}

fn main() {
    sagepack::init_logging();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let runner = ShellRunner;
    let verbose = cli.verbose;
    let load = || -> Result<(Manifest, Resources)> {
        let manifest = Manifest::load(&manifest_path(cli.manifest.as_deref()))?;
        Ok((manifest, Resources::discover()?))
    };

    match &cli.command {
        Command::Copy {
            source,
            destination,
        } => {
            notebook_fs()
                .copy_recursive(source, destination)
                .with_context(|| {
                    format!("copying {} to {}", source.display(), destination.display())
                })?;
        }
        Command::Package => {
            let (manifest, resources) = load()?;
            let container = manifest.code_container();
            container.package(&resources.container_template())?;
            println!("{}", container.path.display());
        }
        Command::Build => {
            let (manifest, resources) = load()?;
            manifest.image(resources).build(&runner, verbose)?;
        }
        Command::Push => {
            let (manifest, resources) = load()?;
            manifest.image(resources).push(&runner, verbose, verbose)?;
        }
        Command::Train => {
            let (manifest, resources) = load()?;
            manifest.image(resources).train(&runner, true, verbose)?;
        }
        Command::Serve => {
            let (manifest, resources) = load()?;
            manifest.image(resources).serve(&runner, true, verbose)?;
        }
        Command::EcrName => {
            let (manifest, resources) = load()?;
            let target = SageMakerTarget::resolve(&runner, manifest.sagemaker.region.as_deref())?;
            println!("{}", target.ecr_image_name(&manifest.image(resources)));
        }
        Command::Upload { input_dir } => {
            let (manifest, resources) = load()?;
            let target = SageMakerTarget::resolve(&runner, manifest.sagemaker.region.as_deref())?;
            let input_dir = input_dir.clone().unwrap_or_else(|| manifest.input_dir());
            let uri =
                target.upload_data(&runner, &manifest.image(resources), &input_dir, verbose)?;
            println!("{uri}");
        }
        Command::Valohai => {
            let (manifest, resources) = load()?;
            let settings = ValohaiSettings::load_global()?;
            let output = manifest.valohai_adapter(resources).launch_execution(
                &runner,
                &settings,
                &manifest.valohai.inputs,
                &manifest.valohai.parameters,
                verbose,
            )?;
            print!("{}", output.stdout);
        }
    }
    Ok(())
}
