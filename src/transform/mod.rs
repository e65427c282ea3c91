//! Extension-pair file transformers.
//!
//! A transformer declares the ordered `(source, destination)` extension pair
//! it converts between. The registry keeps at most one transformer per pair;
//! [`TransformingFs`] consults it whenever a copy crosses formats.

pub mod copy;
pub mod notebook;

pub use copy::TransformingFs;
pub use notebook::{BEGIN_TAG, END_TAG, NotebookExtractor};

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Ordered extension pair, both sides including the leading period.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExtensionPair {
    pub source: String,
    pub destination: String,
}

impl ExtensionPair {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

pub trait FileTransformer {
    /// The pair this transformer converts between.
    fn transforming(&self) -> ExtensionPair;

    /// Read `input` and write the converted content to `output`.
    fn transform(&self, input: &Path, output: &Path) -> Result<()>;
}

#[derive(Default)]
pub struct TransformerRegistry {
    by_pair: HashMap<ExtensionPair, Box<dyn FileTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `transformer` under its declared pair. Last registration wins.
    pub fn register(&mut self, transformer: Box<dyn FileTransformer>) {
        let pair = transformer.transforming();
        self.by_pair.insert(pair, transformer);
    }

    pub fn lookup(&self, source_ext: &str, dest_ext: &str) -> Result<&dyn FileTransformer> {
        let key = ExtensionPair::new(source_ext, dest_ext);
        self.by_pair
            .get(&key)
            .map(|transformer| transformer.as_ref())
            .ok_or_else(|| Error::TransformerNotFound {
                source_ext: source_ext.to_string(),
                dest_ext: dest_ext.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.by_pair.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pair.is_empty()
    }
}

impl std::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut pairs: Vec<String> = self
            .by_pair
            .keys()
            .map(|pair| format!("{}=>{}", pair.source, pair.destination))
            .collect();
        pairs.sort();
        f.debug_struct("TransformerRegistry")
            .field("pairs", &pairs)
            .finish()
    }
}
