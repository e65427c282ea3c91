mod support;

use anyhow::Result;
use sagepack::container::notebook_fs;
use sagepack::{FileOps, FileTransformer, NotebookExtractor, TransformingFs};
use serde_json::json;
use std::fs;
use support::{write_cells, write_notebook};
use tempfile::TempDir;

#[test]
fn notebook_to_script_keeps_only_tagged_code() -> Result<()> {
    let temp = TempDir::new()?;
    let notebook = write_notebook(
        temp.path(),
        "nb.ipynb",
        &["a\n", "##BEGIN##\n", "b\n", "##END##\n", "c\n"],
    )?;
    let script = temp.path().join("out/nb.py");

    notebook_fs().copy_recursive(&notebook, &script)?;

    assert_eq!(fs::read_to_string(&script)?, "b\n");
    assert!(!temp.path().join("nb.ipynb.transformed.py").exists());
    Ok(())
}

#[test]
fn notebook_without_markers_yields_empty_script() -> Result<()> {
    let temp = TempDir::new()?;
    let notebook = write_notebook(temp.path(), "report.ipynb", &["import os\n", "print(1)\n"])?;
    let script = temp.path().join("report.py");

    notebook_fs().copy_recursive(&notebook, &script)?;

    assert!(script.is_file());
    assert_eq!(fs::read_to_string(&script)?, "");
    Ok(())
}

#[test]
fn multiple_blocks_across_cells_are_concatenated() -> Result<()> {
    let temp = TempDir::new()?;
    let notebook = write_cells(
        temp.path(),
        "multi.ipynb",
        json!([
            {"cell_type": "code", "source": ["##BEGIN##\n", "import numpy as np\n", "##END##\n"]},
            {"cell_type": "code", "source": ["plot()\n"]},
            {"cell_type": "code", "source": "##BEGIN##\nmodel.fit()\n##END##\n"}
        ]),
    )?;
    let script = temp.path().join("train.py");

    notebook_fs().copy_recursive(&notebook, &script)?;

    assert_eq!(fs::read_to_string(&script)?, "import numpy as np\nmodel.fit()\n");
    Ok(())
}

#[test]
fn same_extension_copy_is_verbatim() -> Result<()> {
    let temp = TempDir::new()?;
    let notebook = write_notebook(temp.path(), "nb.ipynb", &["##BEGIN##\n", "x\n", "##END##\n"])?;
    let copy = temp.path().join("copy.ipynb");

    notebook_fs().copy_recursive(&notebook, &copy)?;

    assert_eq!(fs::read(&copy)?, fs::read(&notebook)?);
    Ok(())
}

#[test]
fn unregistered_pair_fails_without_touching_destination() -> Result<()> {
    let temp = TempDir::new()?;
    let notebook = write_notebook(temp.path(), "nb.ipynb", &["x\n"])?;
    let target = temp.path().join("nb.txt");

    let err = notebook_fs()
        .copy_recursive(&notebook, &target)
        .expect_err("no .ipynb => .txt transformer");

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "no transformer registered for .ipynb => .txt");
    assert!(!target.exists());
    Ok(())
}

#[test]
fn empty_registry_still_copies_plain_trees() -> Result<()> {
    let temp = TempDir::new()?;
    let src = temp.path().join("pkg");
    fs::create_dir_all(src.join("sub"))?;
    fs::write(src.join("sub/mod.py"), "x = 1\n")?;
    let fs_ops = TransformingFs::host();
    assert!(fs_ops.registry().is_empty());

    fs_ops.copy_recursive(&src, &temp.path().join("dst"))?;

    assert_eq!(fs::read_to_string(temp.path().join("dst/sub/mod.py"))?, "x = 1\n");
    Ok(())
}

#[test]
fn extractor_declares_notebook_to_script() {
    let pair = NotebookExtractor::new().transforming();
    assert_eq!(pair.source, ".ipynb");
    assert_eq!(pair.destination, ".py");
}
