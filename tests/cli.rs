#![cfg(unix)]

mod support;

use anyhow::Result;
use serde_json::json;
use std::fs;
use support::{nb_extract_bin, run_command, sagepack_bin, write_manifest, write_notebook};
use tempfile::TempDir;

#[test]
fn nb_extract_prints_tagged_code() -> Result<()> {
    let temp = TempDir::new()?;
    let notebook = write_notebook(
        temp.path(),
        "nb.ipynb",
        &["a\n", "##BEGIN##\n", "b\n", "##END##\n", "c\n"],
    )?;

    let mut cmd = nb_extract_bin();
    cmd.arg(&notebook);
    let output = run_command(cmd)?;

    assert_eq!(String::from_utf8(output.stdout)?, "b\n");
    Ok(())
}

#[test]
fn nb_extract_writes_output_file() -> Result<()> {
    let temp = TempDir::new()?;
    let notebook = write_notebook(temp.path(), "nb.ipynb", &["##BEGIN##\n", "x = 1\n", "##END##\n"])?;
    let out = temp.path().join("train.py");

    let mut cmd = nb_extract_bin();
    cmd.arg(&notebook).arg(&out);
    let output = run_command(cmd)?;

    assert!(output.stdout.is_empty());
    assert_eq!(fs::read_to_string(out)?, "x = 1\n");
    Ok(())
}

#[test]
fn nb_extract_reports_malformed_notebook() -> Result<()> {
    let temp = TempDir::new()?;
    let notebook = temp.path().join("broken.ipynb");
    fs::write(&notebook, "{\"cells\": 3}")?;

    let output = nb_extract_bin().arg(&notebook).output()?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("malformed notebook"), "{stderr}");
    Ok(())
}

#[test]
fn sagepack_copy_converts_notebooks() -> Result<()> {
    let temp = TempDir::new()?;
    let notebook = write_notebook(temp.path(), "nb.ipynb", &["##BEGIN##\n", "fit()\n", "##END##\n"])?;
    let script = temp.path().join("nested/train.py");

    let mut cmd = sagepack_bin();
    cmd.arg("copy").arg(&notebook).arg(&script);
    run_command(cmd)?;

    assert_eq!(fs::read_to_string(script)?, "fit()\n");
    Ok(())
}

#[test]
fn sagepack_copy_rejects_unknown_conversion() -> Result<()> {
    let temp = TempDir::new()?;
    let source = temp.path().join("data.csv");
    fs::write(&source, "a,b\n")?;

    let output = sagepack_bin()
        .arg("copy")
        .arg(&source)
        .arg(temp.path().join("data.json"))
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no transformer registered for .csv => .json"), "{stderr}");
    Ok(())
}

#[test]
fn sagepack_package_uses_manifest_flag() -> Result<()> {
    let temp = TempDir::new()?;
    fs::write(temp.path().join("train.py"), "print('hi')\n")?;
    let manifest = write_manifest(temp.path(), json!({"name": "cli-demo", "files": ["train.py"]}))?;

    let mut cmd = sagepack_bin();
    cmd.arg("package").arg("--manifest").arg(&manifest);
    let output = run_command(cmd)?;

    let staged = temp.path().join("cli-demo.container");
    assert_eq!(
        String::from_utf8(output.stdout)?.trim_end(),
        staged.display().to_string()
    );
    assert!(staged.join("model/user/train.py").is_file());
    assert!(staged.join("build.sh").is_file());
    Ok(())
}

#[test]
fn sagepack_reports_invalid_manifest() -> Result<()> {
    let temp = TempDir::new()?;
    let manifest = write_manifest(temp.path(), json!({"name": "Not Valid"}))?;

    let output = sagepack_bin()
        .arg("package")
        .env("SAGEPACK_MANIFEST", &manifest)
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid manifest"), "{stderr}");
    assert!(stderr.contains("image name"), "{stderr}");
    Ok(())
}
