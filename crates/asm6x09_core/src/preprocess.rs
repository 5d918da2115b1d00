use rustc_hash::FxHashSet;
use tracing::debug;

use crate::{
    diag::{Diag, class},
    line::Line,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreprocessStats {
    pub removed: usize,
    pub defined: usize,
}

enum Directive<'a> {
    Define(&'a str),
    Undef(&'a str),
    IfDef(&'a str),
    Else,
    EndIf,
}

struct OpenIf {
    line: usize,
    parent_active: bool,
}

/// Applies `#define`, `#undef`, `#ifdef`, `#else` and `#endif`, dropping
/// directive lines and every line in a disabled region.
pub fn preprocess(
    lines: Vec<Line>,
    defines: &[String],
) -> Result<(Vec<Line>, PreprocessStats), Diag> {
    let mut defined: FxHashSet<String> = defines.iter().cloned().collect();
    let mut open: Vec<OpenIf> = Vec::new();
    let mut active = true;
    let mut keep = vec![true; lines.len()];

    for (idx, line) in lines.iter().enumerate() {
        let directive = match directive(line) {
            Ok(Some(directive)) => directive,
            Ok(None) => {
                keep[idx] = active;
                continue;
            }
            Err(diag) => return Err(diag),
        };
        keep[idx] = false;

        match directive {
            Directive::Define(name) => {
                if active {
                    debug!(name, "#define");
                    defined.insert(name.to_string());
                }
            }
            Directive::Undef(name) => {
                if active {
                    debug!(name, "#undef");
                    defined.remove(name);
                }
            }
            Directive::IfDef(name) => {
                open.push(OpenIf {
                    line: idx,
                    parent_active: active,
                });
                active = active && defined.contains(name);
            }
            Directive::Else => {
                let Some(top) = open.last() else {
                    return Err(fatal(line, "Unmatched #else"));
                };
                if top.parent_active {
                    active = !active;
                }
            }
            Directive::EndIf => {
                let Some(top) = open.pop() else {
                    return Err(fatal(line, "Unmatched #endif"));
                };
                active = top.parent_active;
            }
        }
    }

    if let Some(top) = open.last() {
        return Err(fatal(&lines[top.line], "Missing #endif").with_help(
            "every #ifdef needs a matching #endif before the end of the file",
        ));
    }

    let stats = PreprocessStats {
        removed: keep.iter().filter(|kept| !**kept).count(),
        defined: defined.len(),
    };
    let lines = lines
        .into_iter()
        .zip(keep)
        .filter_map(|(line, kept)| kept.then_some(line))
        .collect();
    Ok((lines, stats))
}

fn directive(line: &Line) -> Result<Option<Directive<'_>>, Diag> {
    let Some(label) = line.label_text() else {
        return Ok(None);
    };
    let keyword = label.to_ascii_lowercase();
    let argument = || {
        line.opcode_text().ok_or_else(|| {
            Diag::error(line.file, line.label_span(), format!("{label} needs a name"))
                .with_code(class::MALFORMED)
        })
    };
    let directive = match keyword.as_str() {
        "#define" => Directive::Define(argument()?),
        "#undef" => Directive::Undef(argument()?),
        "#ifdef" => Directive::IfDef(argument()?),
        "#else" => Directive::Else,
        "#endif" => Directive::EndIf,
        _ => return Ok(None),
    };
    Ok(Some(directive))
}

fn fatal(line: &Line, message: &str) -> Diag {
    Diag::error(line.file, line.label_span(), message).with_code(class::FATAL)
}
