//! Source file registry and token provenance.
//!
//! Every token produced by the lexer carries a [`SourceSpan`] so that any
//! later phase can report a diagnostic against the original file, even after
//! include splicing and macro expansion have rearranged the token stream.

use std::path::{Path, PathBuf};

/// Identifier for a registered source file.
///
/// Tokens store a `FileId` instead of a path so that spans stay `Copy` and
/// cheap to duplicate during macro expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FileId(u16);

impl FileId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index.try_into().expect("too many source files"))
    }

    /// Returns the raw index into the owning [`SourceMap`].
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// A position in a source file: file, 1-based line, 1-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceSpan {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
}

impl SourceSpan {
    #[must_use]
    pub fn new(file: FileId, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }
}

/// Registry of the files that took part in a compilation.
///
/// Files are registered in the order they are first read; the same canonical
/// path is registered once. The preprocessor uses [`SourceMap::is_registered`]
/// to make repeated includes a no-op.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceMap {
    files: Vec<PathBuf>,
}

impl SourceMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file path, returning its id.
    ///
    /// Registering the same path twice returns the original id.
    pub fn register(&mut self, path: impl Into<PathBuf>) -> FileId {
        let path = path.into();
        if let Some(idx) = self.files.iter().position(|p| *p == path) {
            return FileId::new(idx);
        }
        self.files.push(path);
        FileId::new(self.files.len() - 1)
    }

    /// Returns whether a path has already been registered.
    #[must_use]
    pub fn is_registered(&self, path: &Path) -> bool {
        self.files.iter().any(|p| p == path)
    }

    /// Returns the path behind a file id.
    ///
    /// # Panics
    /// Panics if the id was produced by a different `SourceMap`.
    #[must_use]
    pub fn path(&self, id: FileId) -> &Path {
        &self.files[id.index()]
    }

    /// Returns a display-friendly name for a file id.
    #[must_use]
    pub fn name(&self, id: FileId) -> String {
        self.files[id.index()].display().to_string()
    }
}
