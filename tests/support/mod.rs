#![allow(dead_code)]

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn bundled_resources() -> sagepack::Resources {
    sagepack::Resources::at(repo_root().join("resources"))
}

/// Notebook whose single code cell holds `lines`, plus a markdown cell.
pub fn write_notebook(dir: &Path, name: &str, lines: &[&str]) -> Result<PathBuf> {
    write_cells(
        dir,
        name,
        json!([
            {"cell_type": "markdown", "source": ["# Title\n", "##BEGIN##\n", "prose\n", "##END##\n"]},
            {"cell_type": "code", "source": lines}
        ]),
    )
}

pub fn write_cells(dir: &Path, name: &str, cells: Value) -> Result<PathBuf> {
    let path = dir.join(name);
    let notebook = json!({
        "cells": cells,
        "metadata": {"kernelspec": {"name": "python3"}},
        "nbformat": 4,
        "nbformat_minor": 2
    });
    fs::write(&path, serde_json::to_string_pretty(&notebook)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn write_manifest(dir: &Path, manifest: Value) -> Result<PathBuf> {
    let path = dir.join("sagepack.json");
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(path)
}

pub fn run_command(mut cmd: Command) -> Result<Output> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to run {cmd:?}"))?;
    if !output.status.success() {
        bail!(
            "command {cmd:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(output)
}

pub fn sagepack_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sagepack"));
    cmd.env("SAGEPACK_RESOURCES", repo_root().join("resources"))
        .env_remove("SAGEPACK_MANIFEST")
        .env_remove("SAGEPACK_LOG");
    cmd
}

pub fn nb_extract_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nb-extract"))
}
