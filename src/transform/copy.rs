//! Transform-aware copy.
//!
//! [`TransformingFs`] decorates another [`FileOps`]. Copies between files of
//! the same (or no) extension pass straight through; copies that cross
//! formats run the registered transformer into an intermediate file next to
//! the source, copy that, and remove it again.

use super::{FileTransformer, TransformerRegistry};
use crate::error::Result;
use crate::fsops::{FileOps, HostFs};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const INTERMEDIATE_MARKER: &str = ".transformed";

pub struct TransformingFs<F = HostFs> {
    inner: F,
    registry: TransformerRegistry,
}

impl TransformingFs<HostFs> {
    pub fn host() -> Self {
        Self::new(HostFs)
    }
}

impl<F: FileOps> TransformingFs<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            registry: TransformerRegistry::new(),
        }
    }

    pub fn with_transformers(
        inner: F,
        transformers: impl IntoIterator<Item = Box<dyn FileTransformer>>,
    ) -> Self {
        let mut fs = Self::new(inner);
        for transformer in transformers {
            fs.register(transformer);
        }
        fs
    }

    pub fn register(&mut self, transformer: Box<dyn FileTransformer>) {
        self.registry.register(transformer);
    }

    pub fn registry(&self) -> &TransformerRegistry {
        &self.registry
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

/// `<source>.transformed<dest_ext>`, next to the source.
pub fn intermediate_path(source: &Path, dest_ext: &str) -> PathBuf {
    let mut raw: OsString = source.as_os_str().to_os_string();
    raw.push(INTERMEDIATE_MARKER);
    raw.push(dest_ext);
    PathBuf::from(raw)
}

// Removes the intermediate artifact when the copy call unwinds, whichever
// way it exits.
struct IntermediateGuard<'a, F: FileOps> {
    fs: &'a F,
    path: PathBuf,
}

impl<F: FileOps> Drop for IntermediateGuard<'_, F> {
    fn drop(&mut self) {
        if !self.fs.exists(&self.path) {
            return;
        }
        if let Err(err) = self.fs.remove(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to remove intermediate file");
        }
    }
}

impl<F: FileOps> FileOps for TransformingFs<F> {
    fn copy_recursive(&self, source: &Path, destination: &Path) -> Result<()> {
        let source_ext = self.inner.extension(source);
        let dest_ext = self.inner.extension(destination);

        if source_ext == dest_ext || source_ext.is_empty() || dest_ext.is_empty() {
            return self.inner.copy_recursive(source, destination);
        }

        let transformer = self.registry.lookup(&source_ext, &dest_ext)?;
        let intermediate = intermediate_path(source, &dest_ext);
        let guard = IntermediateGuard {
            fs: &self.inner,
            path: intermediate,
        };

        debug!(
            from = %source.display(),
            to = %destination.display(),
            pair = %format!("{source_ext}=>{dest_ext}"),
            "transforming before copy"
        );
        transformer.transform(source, &guard.path)?;
        self.inner.copy_recursive(&guard.path, destination)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.inner.remove(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.inner.read_to_string(path)
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.inner.write_file(path, contents)
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        self.inner.create_dir(path)
    }

    fn extension(&self, path: &Path) -> String {
        self.inner.extension(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transform::ExtensionPair;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    const EXT1: &str = ".ext1";
    const EXT2: &str = ".ext2";

    #[derive(Default)]
    struct Calls {
        transforms: Vec<(PathBuf, PathBuf)>,
        intermediate_seen: bool,
    }

    // Upper-cases the input and records each invocation.
    struct Upper {
        calls: Rc<RefCell<Calls>>,
    }

    impl FileTransformer for Upper {
        fn transforming(&self) -> ExtensionPair {
            ExtensionPair::new(EXT1, EXT2)
        }

        fn transform(&self, input: &Path, output: &Path) -> Result<()> {
            let body = fs::read_to_string(input).map_err(|err| Error::io("reading", input, err))?;
            fs::write(output, body.to_uppercase()).map_err(|err| Error::io("writing", output, err))?;
            let mut calls = self.calls.borrow_mut();
            calls.transforms.push((input.to_path_buf(), output.to_path_buf()));
            calls.intermediate_seen = output.exists();
            Ok(())
        }
    }

    // Leaves a partial output behind, then gives up.
    struct HalfWritten;

    impl FileTransformer for HalfWritten {
        fn transforming(&self) -> ExtensionPair {
            ExtensionPair::new(EXT1, EXT2)
        }

        fn transform(&self, input: &Path, output: &Path) -> Result<()> {
            fs::write(output, "partial").map_err(|err| Error::io("writing", output, err))?;
            Err(Error::NotebookParse {
                path: input.to_path_buf(),
                reason: "cut short".to_string(),
            })
        }
    }

    fn setup() -> (TempDir, TransformingFs, Rc<RefCell<Calls>>) {
        let temp = TempDir::new().unwrap();
        let calls = Rc::new(RefCell::new(Calls::default()));
        let fs = TransformingFs::with_transformers(
            HostFs,
            [Box::new(Upper {
                calls: Rc::clone(&calls),
            }) as Box<dyn FileTransformer>],
        );
        (temp, fs, calls)
    }

    #[test]
    fn intermediate_path_appends_marker_and_destination_extension() {
        assert_eq!(
            intermediate_path(Path::new("dir/file1.ext1"), EXT2),
            PathBuf::from("dir/file1.ext1.transformed.ext2")
        );
    }

    #[test]
    fn plain_copy_when_extensions_are_absent_or_equal() {
        let (temp, fs, calls) = setup();
        let cases = [
            ("file0", "copy0"),
            ("file0", "copy1.ext1"),
            ("file1.ext1", "copy2"),
            ("file1.ext1", "copy3.ext1"),
        ];
        for (src, dst) in cases {
            let src = temp.path().join(src);
            fs::write(&src, "verbatim").unwrap();
            let dst = temp.path().join(dst);
            fs.copy_recursive(&src, &dst).unwrap();
            assert_eq!(fs::read_to_string(&dst).unwrap(), "verbatim");
        }
        assert!(calls.borrow().transforms.is_empty());
    }

    #[test]
    fn cross_format_copy_transforms_once_and_cleans_up() {
        let (temp, fs, calls) = setup();
        let src = temp.path().join("file1.ext1");
        let dst = temp.path().join("out/file2.ext2");
        fs::write(&src, "shout").unwrap();

        fs.copy_recursive(&src, &dst).unwrap();

        let intermediate = temp.path().join("file1.ext1.transformed.ext2");
        let calls = calls.borrow();
        assert_eq!(calls.transforms, vec![(src.clone(), intermediate.clone())]);
        assert!(calls.intermediate_seen);
        assert!(!intermediate.exists());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "SHOUT");
    }

    #[test]
    fn unregistered_pair_is_not_found_and_leaves_nothing_behind() {
        let (temp, fs, _calls) = setup();
        let src = temp.path().join("file.ext2");
        fs::write(&src, "x").unwrap();
        let err = fs
            .copy_recursive(&src, &temp.path().join("file.ext1"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!temp.path().join("file.ext1").exists());
    }

    #[test]
    fn intermediate_is_removed_when_copy_fails() {
        let (temp, fs, _calls) = setup();
        let src = temp.path().join("file1.ext1");
        fs::write(&src, "x").unwrap();
        // A regular file where the destination parent should be makes the
        // copy step fail after the transform succeeded.
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let result = fs.copy_recursive(&src, &blocker.join("file2.ext2"));

        assert!(result.is_err());
        assert!(!temp.path().join("file1.ext1.transformed.ext2").exists());
    }

    #[test]
    fn transform_failure_propagates() {
        let (temp, fs, calls) = setup();
        let err = fs
            .copy_recursive(
                &temp.path().join("missing.ext1"),
                &temp.path().join("dst.ext2"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(calls.borrow().transforms.is_empty());
        assert!(!temp.path().join("missing.ext1.transformed.ext2").exists());
    }

    #[test]
    fn intermediate_is_removed_when_transform_fails_after_writing() {
        let temp = TempDir::new().unwrap();
        let fs = TransformingFs::with_transformers(
            HostFs,
            [Box::new(HalfWritten) as Box<dyn FileTransformer>],
        );
        let src = temp.path().join("file1.ext1");
        let dst = temp.path().join("file2.ext2");
        fs::write(&src, "x").unwrap();

        let err = fs.copy_recursive(&src, &dst).unwrap_err();

        match err {
            Error::NotebookParse { path, reason } => {
                assert_eq!(path, src);
                assert_eq!(reason, "cut short");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!temp.path().join("file1.ext1.transformed.ext2").exists());
        assert!(!dst.exists());
    }
}
