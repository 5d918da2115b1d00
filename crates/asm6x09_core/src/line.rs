use std::fmt;

use crate::{
    cpu::AddrMode,
    source::{FileId, Span, Spanned},
};

/// One assembly statement, mutated in place across passes.
#[derive(Clone, Debug)]
pub struct Line {
    pub file: FileId,
    /// Byte range of the whole logical line.
    pub span: Span,
    pub label: Option<Spanned<String>>,
    pub opcode: Option<Spanned<String>>,
    pub operand: Option<Spanned<String>>,
    pub address: Option<u32>,
    pub length: Option<u32>,
    pub data: Vec<u8>,
    pub needs_fixup: bool,
    pub addr_mode: Option<AddrMode>,
}

impl Line {
    pub fn new(file: FileId, span: Span) -> Self {
        Self {
            file,
            span,
            label: None,
            opcode: None,
            operand: None,
            address: None,
            length: None,
            data: Vec::new(),
            needs_fixup: false,
            addr_mode: None,
        }
    }

    pub fn label_text(&self) -> Option<&str> {
        self.label.as_ref().map(|label| label.value.as_str())
    }

    pub fn opcode_text(&self) -> Option<&str> {
        self.opcode.as_ref().map(|opcode| opcode.value.as_str())
    }

    pub fn operand_text(&self) -> &str {
        self.operand
            .as_ref()
            .map(|operand| operand.value.as_str())
            .unwrap_or("")
    }

    /// Lower-cased opcode field, or an empty string.
    pub fn mnemonic(&self) -> String {
        self.opcode_text()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }

    /// Span of the operand, falling back to the opcode and then the whole line.
    pub fn operand_span(&self) -> Span {
        self.operand
            .as_ref()
            .or(self.opcode.as_ref())
            .map(|field| field.span.clone())
            .unwrap_or_else(|| self.span.clone())
    }

    pub fn opcode_span(&self) -> Span {
        self.opcode
            .as_ref()
            .map(|field| field.span.clone())
            .unwrap_or_else(|| self.span.clone())
    }

    pub fn label_span(&self) -> Span {
        self.label
            .as_ref()
            .or(self.opcode.as_ref())
            .map(|field| field.span.clone())
            .unwrap_or_else(|| self.span.clone())
    }

    pub fn end_address(&self) -> Option<u32> {
        self.address?.checked_add(self.length?)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.label_text().unwrap_or(""),
            self.opcode_text().unwrap_or(""),
            self.operand_text()
        )
    }
}

/// One past the highest address any supported CPU can reach.
pub const ADDRESS_SPACE: u32 = 0x1_0000;

/// Appends `value` big-endian in `width` bytes (1, 2 or 4), truncating.
pub fn push_value(out: &mut Vec<u8>, value: i64, width: u32) {
    match width {
        0 => {}
        1 => out.push(value as u8),
        2 => out.extend_from_slice(&(value as u16).to_be_bytes()),
        _ => out.extend_from_slice(&(value as u32).to_be_bytes()),
    }
}

/// Whether `value` fits `width` bytes as either a signed or unsigned quantity.
pub fn fits_width(value: i64, width: u32) -> bool {
    match width {
        0 => true,
        1 => (-128..=255).contains(&value),
        2 => (-32768..=65535).contains(&value),
        _ => (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&value),
    }
}

#[cfg(test)]
mod tests {
    use super::{fits_width, push_value};

    #[test]
    fn pushes_big_endian_words() {
        let mut out = Vec::new();
        push_value(&mut out, 0x1234, 2);
        push_value(&mut out, -1, 1);
        push_value(&mut out, -2, 2);
        assert_eq!(out, vec![0x12, 0x34, 0xFF, 0xFF, 0xFE]);

        out.clear();
        push_value(&mut out, 0x0102_0304, 4);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn width_check_accepts_signed_and_unsigned_ranges() {
        assert!(fits_width(255, 1));
        assert!(fits_width(-128, 1));
        assert!(!fits_width(256, 1));
        assert!(fits_width(-32768, 2));
        assert!(!fits_width(0x10000, 2));
    }
}
