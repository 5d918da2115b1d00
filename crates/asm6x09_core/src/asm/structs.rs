//! Struct declarations and struct-instance data lines.

use tracing::info;

use crate::{
    diag::{Diag, class},
    expr::EvalError,
    line::{Line, fits_width, push_value},
    symbols::{Field, FieldKind, StructDef, SymbolError, SymbolTable},
};

const STRUCT_TEXT: &str = "struc";
const END_STRUCT_TEXT: &str = "ends";

/// Registers every `struc`/`ends` block, resolves layouts, and returns the
/// remaining lines.
pub fn collect_structs(lines: Vec<Line>, symbols: &mut SymbolTable) -> Result<Vec<Line>, Diag> {
    let is_opcode = |line: &Line, text: &str| {
        line.opcode_text()
            .is_some_and(|opcode| opcode.eq_ignore_ascii_case(text))
    };

    let mut pairs = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        if is_opcode(&lines[idx], STRUCT_TEXT) {
            let Some(end) = (idx + 1..lines.len()).find(|&j| is_opcode(&lines[j], END_STRUCT_TEXT))
            else {
                let line = &lines[idx];
                return Err(
                    Diag::error(line.file, line.label_span(), format!("Struct {line} not closed"))
                        .with_code(class::FATAL)
                        .with_help("close the declaration with `ends`"),
                );
            };
            pairs.push((idx, end));
            idx = end;
        }
        idx += 1;
    }

    for &(start, end) in &pairs {
        let head = &lines[start];
        let Some(name) = head.label_text() else {
            return Err(
                Diag::error(head.file, head.opcode_span(), "Missing struct label")
                    .with_code(class::MALFORMED),
            );
        };

        let mut def = StructDef::new(name, head.file, head.label_span());
        for line in &lines[start + 1..end] {
            let Some(kind) = line.opcode_text() else {
                return Err(Diag::error(
                    line.file,
                    line.label_span(),
                    format!("struct field `{line}` has no type"),
                )
                .with_code(class::MALFORMED));
            };
            def.fields.push(Field {
                name: line.label_text().map(str::to_string),
                kind: FieldKind::from_opcode(kind),
                count: line.operand_text().to_string(),
                offset: None,
                nested: None,
                file: line.file,
                span: line.span.clone(),
            });
        }
        if def.fields.is_empty() {
            return Err(Diag::error(
                head.file,
                head.label_span(),
                format!("Struct has no fields {head}"),
            )
            .with_code(class::MALFORMED));
        }
        symbols.declare_struct(def).map_err(symbol_diag)?;
    }

    symbols.resolve_struct_layouts().map_err(symbol_diag)?;
    info!(structs = symbols.struct_count(), "structs resolved");

    let mut declaration = vec![false; lines.len()];
    for &(start, end) in &pairs {
        declaration[start..=end].fill(true);
    }
    Ok(lines
        .into_iter()
        .zip(declaration)
        .filter_map(|(line, skip)| (!skip).then_some(line))
        .collect())
}

fn symbol_diag(err: SymbolError) -> Diag {
    let code = match err {
        SymbolError::CyclicStruct { .. } => class::FATAL,
        SymbolError::DuplicateStruct { .. } => class::INCONSISTENT,
        SymbolError::UnknownFieldType { .. } | SymbolError::BadRepeatCount { .. } => {
            class::MALFORMED
        }
    };
    let (file, span) = err.location();
    Diag::error(file, span, err.to_string()).with_code(code)
}

/// Outcome of encoding a struct-instance operand.
#[derive(Debug, PartialEq, Eq)]
pub enum InstanceError {
    FieldCount { expected: usize, found: usize },
    Eval(EvalError),
}

/// Encodes `operand` against `widths`. Bytes are only appended when every
/// field evaluates.
pub fn encode_instance(
    widths: &[u8],
    operand: &str,
    eval: impl Fn(&str) -> Result<i64, EvalError>,
    out: &mut Vec<u8>,
    warnings: &mut Vec<String>,
) -> Result<(), InstanceError> {
    let cleaned = strip_field_groups(&strings_to_numbers(operand));
    let zero_fill = cleaned == "0";
    let items: Vec<&str> = cleaned.split(',').collect();
    if !zero_fill && items.len() != widths.len() {
        return Err(InstanceError::FieldCount {
            expected: widths.len(),
            found: items.len(),
        });
    }

    let before = out.len();
    for (idx, &width) in widths.iter().enumerate() {
        let value = if zero_fill {
            0
        } else {
            match eval(items[idx]) {
                Ok(value) => value,
                Err(err) => {
                    out.truncate(before);
                    return Err(InstanceError::Eval(err));
                }
            }
        };
        if !fits_width(value, u32::from(width)) {
            warnings.push(format!(
                "field {} value {value} truncated to {width} byte(s)",
                idx + 1
            ));
        }
        push_value(out, value, u32::from(width));
    }
    Ok(())
}

/// Replaces each `"text"` with the comma-separated byte values of its characters.
pub fn strings_to_numbers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('"') {
        let Some(len) = rest[start + 1..].find('"') else {
            break;
        };
        out.push_str(&rest[..start]);
        let body = &rest[start + 1..start + 1 + len];
        let values: Vec<String> = body.bytes().map(|byte| byte.to_string()).collect();
        out.push_str(&values.join(","));
        rest = &rest[start + len + 2..];
    }
    out.push_str(rest);
    out
}

/// Drops whitespace and the angle brackets that group nested struct fields,
/// keeping `<<` and `>>` used as shift operators.
fn strip_field_groups(text: &str) -> String {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    let mut out = String::with_capacity(chars.len());
    let mut depth = 0usize;
    let mut idx = 0;
    while idx < chars.len() {
        let c = chars[idx];
        if c != '<' && c != '>' {
            out.push(c);
            idx += 1;
            continue;
        }

        let run = chars[idx..].iter().take_while(|&&next| next == c).count();
        let grouping = if c == '<' {
            // Groups open only where a field value starts.
            if matches!(out.chars().last(), None | Some(',')) {
                run
            } else {
                0
            }
        } else {
            let operand_follows = !matches!(chars.get(idx + run), None | Some(','));
            let closers = if operand_follows {
                run.saturating_sub(2)
            } else {
                run
            };
            closers.min(depth)
        };
        if c == '<' {
            depth += grouping;
        } else {
            depth -= grouping;
        }
        out.extend(std::iter::repeat_n(c, run - grouping));
        idx += run;
    }
    out
}
