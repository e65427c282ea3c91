//! Print (or write) the tagged code of a Jupyter notebook.
//!
//! Usage:
//!   nb-extract report.ipynb            # tagged code on stdout
//!   nb-extract report.ipynb train.py   # tagged code into train.py

use anyhow::{Context, Result, bail};
use sagepack::NotebookExtractor;
use std::env;
use std::fs;
use std::io::{Write, stdout};
use std::path::PathBuf;

fn main() {
    sagepack::init_logging();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse(env::args().skip(1))?;
    let code = NotebookExtractor::new().tagged_code(&args.notebook)?;
    match args.output {
        Some(path) => {
            fs::write(&path, code).with_context(|| format!("writing {}", path.display()))?
        }
        None => {
            let mut out = stdout().lock();
            out.write_all(code.as_bytes()).context("writing to stdout")?;
            out.flush().context("flushing stdout")?;
        }
    }
    Ok(())
}

struct CliArgs {
    notebook: PathBuf,
    output: Option<PathBuf>,
}

impl CliArgs {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut positional = Vec::new();
        for arg in args {
            match arg.as_str() {
                "--help" | "-h" => {
                    println!("{}", usage());
                    std::process::exit(0);
                }
                other if other.starts_with('-') && other != "-" => {
                    bail!("Unknown flag: {other}\n{}", usage());
                }
                other => positional.push(PathBuf::from(other)),
            }
        }

        let mut positional = positional.into_iter();
        let Some(notebook) = positional.next() else {
            bail!("{}", usage());
        };
        let output = positional.next();
        if positional.next().is_some() {
            bail!("too many arguments\n{}", usage());
        }
        Ok(Self { notebook, output })
    }
}

fn usage() -> &'static str {
    "Usage: nb-extract NOTEBOOK [OUTPUT]\n\nCopies the lines between ##BEGIN## and ##END## markers of every code cell."
}
