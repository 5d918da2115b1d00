use std::path::Path;

pub mod asm;
pub mod cpu;
pub mod diag;
pub mod expr;
pub mod lex;
pub mod line;
pub mod listing;
pub mod preprocess;
pub mod rom;
pub mod source;
pub mod symbols;

use diag::{Diag, has_errors};
use lex::lex_lines;
use source::SourceManager;
use tracing::info;

pub use asm::{Assembly, assemble};
pub use cpu::Cpu;
pub use diag::{DiagLabel, Severity as DiagSeverity};
pub use line::Line;
pub use rom::{RomDef, RomImage};

pub const DEFAULT_LABEL_PROXIMITY: u32 = 512;

#[derive(Clone, Debug)]
pub struct AssembleOptions {
    /// Overrides any `.cpu` directive in the source.
    pub cpu: Option<Cpu>,
    /// Names treated as `#define`d before the first line.
    pub defines: Vec<String>,
    /// Same-named labels closer than this many bytes draw a warning; 0 disables.
    pub label_proximity: u32,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            cpu: None,
            defines: Vec::new(),
            label_proximity: DEFAULT_LABEL_PROXIMITY,
        }
    }
}

pub fn compile_source_text(text: &str, opts: &AssembleOptions) -> (Option<Assembly>, Vec<Diag>) {
    let mut source_manager = SourceManager::new();
    let file = source_manager.add_virtual_file("inline.asm", text);
    let (lines, mut diags) = lex_lines(&source_manager, file);
    if has_errors(&diags) {
        return (None, diags);
    }

    match assemble(lines, opts) {
        Ok(assembly) => {
            diags.extend(assembly.diags.iter().cloned());
            (Some(assembly), diags)
        }
        Err(errors) => {
            diags.extend(errors);
            (None, diags)
        }
    }
}

/// Loads, tokenizes and assembles `input`. On success the assembly carries
/// every warning and note, lexer diagnostics included.
pub fn assemble_path(
    input: &Path,
    opts: &AssembleOptions,
) -> (SourceManager, Result<Assembly, Vec<Diag>>) {
    let mut source_manager = SourceManager::new();
    let file = match source_manager.load_path(input) {
        Ok(file) => file,
        Err(err) => {
            let file = source_manager.add_virtual_file(input.to_path_buf(), String::new());
            let diags = vec![Diag::error(
                file,
                0..0,
                format!("failed to read input file: {err}"),
            )];
            return (source_manager, Err(diags));
        }
    };

    let (lines, mut diags) = lex_lines(&source_manager, file);
    info!(lines = lines.len(), path = %input.display(), "lines tokenized");
    if has_errors(&diags) {
        return (source_manager, Err(diags));
    }

    let result = match assemble(lines, opts) {
        Ok(mut assembly) => {
            diags.append(&mut assembly.diags);
            assembly.diags = diags;
            Ok(assembly)
        }
        Err(errors) => {
            diags.extend(errors);
            Err(diags)
        }
    };
    (source_manager, result)
}
