use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

pub type BytePos = usize;
pub type Span = std::ops::Range<BytePos>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub file: FileId,
    pub span: Span,
    pub value: T,
}

impl<T> Spanned<T> {
    pub fn new(file: FileId, span: Span, value: T) -> Self {
        Self { file, span, value }
    }
}

#[derive(Clone, Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    line_starts: Vec<BytePos>,
}

impl SourceFile {
    /// One-based line and column of a byte offset.
    pub fn line_col(&self, pos: BytePos) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&pos) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let start = self.line_starts.get(line).copied().unwrap_or(0);
        (line + 1, pos.saturating_sub(start) + 1)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SourceManager {
    files: Vec<SourceFile>,
    path_to_id: FxHashMap<PathBuf, FileId>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_path(&mut self, path: &Path) -> Result<FileId, std::io::Error> {
        let normalized = normalize_path(path);
        if let Some(id) = self.path_to_id.get(&normalized).copied() {
            return Ok(id);
        }

        let text = std::fs::read_to_string(path)?;
        let text = normalize_newlines(&text);
        Ok(self.insert_source(normalized, text))
    }

    pub fn add_virtual_file(
        &mut self,
        path: impl Into<PathBuf>,
        text: impl Into<String>,
    ) -> FileId {
        let path = path.into();
        let text = normalize_newlines(&text.into());
        self.insert_source(path, text)
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn files_iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(idx, file)| (FileId(idx as u32), file))
    }

    fn insert_source(&mut self, path: PathBuf, text: String) -> FileId {
        let id = FileId(self.files.len() as u32);
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        self.path_to_id.insert(path.clone(), id);
        self.files.push(SourceFile {
            path,
            text,
            line_starts,
        });
        id
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

fn normalize_newlines(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}
