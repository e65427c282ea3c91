//! Notebook to script extraction.
//!
//! Only code between `##BEGIN##` and `##END##` marker lines survives; every
//! tagged block across all code cells is concatenated in document order.
//! Markers are paired by position (the Nth begin with the Nth end), surplus
//! markers of either kind are ignored, and nothing checks that the markers
//! alternate.

use super::{ExtensionPair, FileTransformer};
use crate::error::{Error, Result};
use crate::fsops::file_extension;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const BEGIN_TAG: &str = "##BEGIN##";
pub const END_TAG: &str = "##END##";

pub const NOTEBOOK_EXT: &str = ".ipynb";
pub const SCRIPT_EXT: &str = ".py";

#[derive(Debug, Deserialize)]
struct Notebook {
    cells: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    cell_type: String,
    #[serde(default)]
    source: Option<CellSource>,
}

// nbformat allows either a list of lines or one multi-line string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Lines(Vec<String>),
    Text(String),
}

impl CellSource {
    fn into_lines(self) -> Vec<String> {
        match self {
            CellSource::Lines(lines) => lines,
            CellSource::Text(text) => text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NotebookExtractor;

impl NotebookExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Read `path` and return the tagged code it contains.
    pub fn tagged_code(&self, path: &Path) -> Result<String> {
        let raw = fs::read_to_string(path).map_err(|err| Error::io("reading", path, err))?;
        let lines = code_lines(&raw).map_err(|reason| Error::NotebookParse {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(extract_tagged(&lines))
    }
}

impl FileTransformer for NotebookExtractor {
    fn transforming(&self) -> ExtensionPair {
        ExtensionPair::new(NOTEBOOK_EXT, SCRIPT_EXT)
    }

    fn transform(&self, input: &Path, output: &Path) -> Result<()> {
        if file_extension(input) != NOTEBOOK_EXT {
            debug!(input = %input.display(), "not a notebook, skipping extraction");
            return Ok(());
        }
        let code = self.tagged_code(input)?;
        fs::write(output, code).map_err(|err| Error::io("writing", output, err))
    }
}

/// Lines of every code cell in order, each terminated by a newline.
fn code_lines(raw: &str) -> std::result::Result<Vec<String>, String> {
    let notebook: Notebook = serde_json::from_str(raw).map_err(|err| err.to_string())?;
    let mut lines = Vec::new();
    for (idx, cell) in notebook.cells.into_iter().enumerate() {
        if cell.cell_type != "code" {
            continue;
        }
        let source = cell
            .source
            .ok_or_else(|| format!("code cell {idx} has no source"))?;
        lines.extend(source.into_lines().into_iter().map(|mut line| {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            line
        }));
    }
    Ok(lines)
}

/// Concatenate the lines strictly between each positional begin/end pair.
pub fn extract_tagged(lines: &[String]) -> String {
    let begins = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains(BEGIN_TAG))
        .map(|(idx, _)| idx);
    let ends = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains(END_TAG))
        .map(|(idx, _)| idx);

    let mut out = String::new();
    for (begin, end) in begins.zip(ends) {
        let start = begin + 1;
        if start >= end {
            continue;
        }
        for line in &lines[start..end] {
            out.push_str(line);
        }
    }
    out
}
