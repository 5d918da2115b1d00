use logos::{Lexer, Logos};

use crate::{
    diag::{Diag, class},
    line::Line,
    source::{BytePos, FileId, SourceManager, Span, Spanned},
};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    #[regex(r"[ \t\f]+")]
    Whitespace,

    #[token("\n")]
    Newline,

    #[token("\\")]
    Continuation,

    #[token(":")]
    Colon,

    #[token(";", skip_to_line_end)]
    Comment,

    #[token("\"", string_body)]
    Str,

    #[regex(r"[A-Za-z_.#][A-Za-z0-9_.#]*")]
    Symbol,

    #[regex(r"[0-9]+")]
    Digits,

    #[regex(r"[!$%&'()*+,\-/<=>?@\[\]^`{|}~]")]
    Punct,
}

fn skip_to_line_end(lex: &mut Lexer<TokenKind>) {
    let rest = lex.remainder();
    lex.bump(rest.find('\n').unwrap_or(rest.len()));
}

fn string_body(lex: &mut Lexer<TokenKind>) -> bool {
    let rest = lex.remainder();
    match rest.find(['"', '\n']) {
        Some(end) if rest.as_bytes()[end] == b'"' => {
            lex.bump(end + 1);
            true
        }
        _ => false,
    }
}

/// Splits a source file into logical lines of label, opcode and operand fields.
pub fn lex_lines(source_manager: &SourceManager, file: FileId) -> (Vec<Line>, Vec<Diag>) {
    let source = &source_manager.file(file).text;
    let mut lines = Vec::new();
    let mut diags = Vec::new();
    let mut builder = LineBuilder::new(file, 0);
    let mut continued = false;

    for (kind, span) in TokenKind::lexer(source).spanned() {
        let kind = match kind {
            Ok(kind) => kind,
            Err(()) => {
                let message = if source[span.clone()].starts_with('"') {
                    "unterminated string"
                } else {
                    "invalid character"
                };
                diags.push(
                    Diag::error(file, span.clone(), message)
                        .with_code(class::MALFORMED)
                        .with_help("remove or replace this character"),
                );
                continue;
            }
        };

        match kind {
            TokenKind::Newline => {
                if continued {
                    continued = false;
                    continue;
                }
                lines.extend(builder.finish());
                builder = LineBuilder::new(file, span.end);
            }
            TokenKind::Continuation => continued = true,
            TokenKind::Comment => {}
            _ => builder.push(kind, span.clone(), &source[span]),
        }
    }
    lines.extend(builder.finish());

    (lines, diags)
}

struct LineBuilder {
    file: FileId,
    start: BytePos,
    end: BytePos,
    label: Option<Spanned<String>>,
    opcode: Option<Spanned<String>>,
    operand: Option<(Span, String)>,
}

impl LineBuilder {
    fn new(file: FileId, start: BytePos) -> Self {
        Self {
            file,
            start,
            end: start,
            label: None,
            opcode: None,
            operand: None,
        }
    }

    fn push(&mut self, kind: TokenKind, span: Span, text: &str) {
        if kind != TokenKind::Whitespace {
            self.end = span.end;
        }

        if self.opcode.is_none() {
            if kind == TokenKind::Symbol {
                let field = Spanned::new(self.file, span.clone(), text.to_string());
                if span.start == self.start && self.label.is_none() {
                    self.label = Some(field);
                } else {
                    self.opcode = Some(field);
                }
            }
            return;
        }

        match (&mut self.operand, kind) {
            (None, TokenKind::Whitespace) => {}
            (None, _) => self.operand = Some((span, text.to_string())),
            (Some((operand_span, operand)), kind) => {
                operand.push_str(text);
                if kind != TokenKind::Whitespace {
                    operand_span.end = span.end;
                }
            }
        }
    }

    fn finish(self) -> Option<Line> {
        if self.label.is_none() && self.opcode.is_none() && self.operand.is_none() {
            return None;
        }

        let mut line = Line::new(self.file, self.start..self.end);
        line.label = self.label;
        line.opcode = self.opcode;
        line.operand = self.operand.and_then(|(span, text)| {
            let text = text.replace('\t', " ").trim().to_string();
            (!text.is_empty()).then(|| Spanned::new(self.file, span, text))
        });
        Some(line)
    }
}
