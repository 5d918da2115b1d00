//! Opcode tables and operand encoders for the supported CPU variants.

use std::fmt;

use thiserror::Error;

use crate::{
    expr::{EvalError, evaluate},
    line::{fits_width, push_value},
    symbols::SymbolTable,
};

mod m6800;
mod m6800_table;
mod m6809;
mod m6809_table;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddrMode {
    Inherent,
    Immediate,
    Direct,
    Indexed,
    Extended,
}

impl fmt::Display for AddrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddrMode::Inherent => "inherent",
            AddrMode::Immediate => "immediate",
            AddrMode::Direct => "direct",
            AddrMode::Indexed => "indexed",
            AddrMode::Extended => "extended",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cpu {
    M6800,
    M6809 { hd6309: bool },
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::M6809 { hd6309: false }
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an opcode interprets its operand beyond the addressing mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpClass {
    Plain,
    Branch,
    LongBranch,
    /// Push/pull register mask; `system` is true for the S stack.
    Stack { system: bool },
    RegisterPair,
    TransferMemory,
    BitTransfer,
    MemoryImmediate,
}

/// Fixed opcode bytes and declared length of one addressing form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Form {
    pub prefix: Option<u8>,
    pub opcode: u8,
    pub length: u8,
    /// Indexed forms grow by their offset extension.
    pub variable: bool,
}

impl Form {
    pub const fn new(prefix: Option<u8>, opcode: u8, length: u8, variable: bool) -> Self {
        Self {
            prefix,
            opcode,
            length,
            variable,
        }
    }

    pub fn opcode_len(&self) -> u32 {
        1 + u32::from(self.prefix.is_some())
    }

    /// Operand bytes implied by the declared length.
    pub fn operand_len(&self) -> u32 {
        u32::from(self.length).saturating_sub(self.opcode_len())
    }

    pub fn write_opcode(&self, out: &mut Vec<u8>) {
        out.extend(self.prefix);
        out.push(self.opcode);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Opcode {
    pub mnemonic: &'static str,
    pub class: OpClass,
    pub hd6309: bool,
    pub immediate: Option<Form>,
    pub direct: Option<Form>,
    pub indexed: Option<Form>,
    pub extended: Option<Form>,
    pub inherent: Option<Form>,
}

impl Opcode {
    pub const fn new(
        mnemonic: &'static str,
        immediate: Option<Form>,
        direct: Option<Form>,
        indexed: Option<Form>,
        extended: Option<Form>,
        inherent: Option<Form>,
    ) -> Self {
        Self {
            mnemonic,
            class: OpClass::Plain,
            hd6309: false,
            immediate,
            direct,
            indexed,
            extended,
            inherent,
        }
    }

    pub const fn with_class(mut self, class: OpClass) -> Self {
        self.class = class;
        self
    }

    pub const fn only_6309(mut self) -> Self {
        self.hd6309 = true;
        self
    }

    pub fn form(&self, mode: AddrMode) -> Option<Form> {
        match mode {
            AddrMode::Inherent => self.inherent,
            AddrMode::Immediate => self.immediate,
            AddrMode::Direct => self.direct,
            AddrMode::Indexed => self.indexed,
            AddrMode::Extended => self.extended,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.class, OpClass::Branch | OpClass::LongBranch)
    }
}

/// Per-line inputs to operand encoding.
#[derive(Clone, Copy)]
pub struct EncodeCtx<'a> {
    pub symbols: &'a SymbolTable,
    pub address: u32,
    pub dp: u8,
    /// Length assigned to this line by an earlier pass; encodings never shrink below it.
    pub reserved_length: Option<u32>,
}

impl EncodeCtx<'_> {
    pub fn eval(&self, text: &str) -> Result<i64, EvalError> {
        evaluate(self.symbols, self.address, text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoding {
    pub mode: AddrMode,
    pub bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

impl Encoding {
    fn new(mode: AddrMode, form: Form) -> Self {
        let mut bytes = Vec::with_capacity(usize::from(form.length) + 2);
        form.write_opcode(&mut bytes);
        Self {
            mode,
            bytes,
            warnings: Vec::new(),
        }
    }

    /// Appends `value` in `width` bytes, warning when it does not fit.
    fn push(&mut self, value: i64, width: u32) {
        if !fits_width(value, width) {
            self.warnings.push(format!(
                "value {value} (${:X}) truncated to {width} byte(s)",
                value as u64 & width_mask(width)
            ));
        }
        push_value(&mut self.bytes, value, width);
    }
}

fn width_mask(width: u32) -> u64 {
    match width {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => 0xFFFF_FFFF,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A symbol is not yet known; `length` is the provisional instruction length.
    #[error("`{symbol}` is not resolved")]
    Unresolved {
        symbol: String,
        mode: AddrMode,
        length: u32,
    },
    #[error("{0}")]
    Malformed(String),
    #[error("division by zero")]
    DivisionByZero,
}

impl EncodeError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        EncodeError::Malformed(message.into())
    }
}

/// Converts an evaluation failure, recording the provisional shape on `Unresolved`.
pub(crate) fn pending(err: EvalError, mode: AddrMode, length: u32) -> EncodeError {
    match err {
        EvalError::Unresolved { symbol } => EncodeError::Unresolved {
            symbol,
            mode,
            length,
        },
        EvalError::Malformed(message) => EncodeError::Malformed(message),
        EvalError::DivisionByZero => EncodeError::DivisionByZero,
    }
}

/// Bits needed for `value` after truncation to a signed 16-bit quantity: 5, 8 or 16.
pub fn bits_required(value: i64) -> u32 {
    let value = value as i16;
    if (-16..=15).contains(&value) {
        5
    } else if (-128..=127).contains(&value) {
        8
    } else {
        16
    }
}

impl Cpu {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "6800" => Some(Cpu::M6800),
            "6809" => Some(Cpu::M6809 { hd6309: false }),
            "6309" => Some(Cpu::M6809 { hd6309: true }),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Cpu::M6800 => "6800",
            Cpu::M6809 { hd6309: false } => "6809",
            Cpu::M6809 { hd6309: true } => "6309",
        }
    }

    /// Lower-cases a mnemonic and maps accepted aliases onto table names.
    pub fn normalize_mnemonic(self, mnemonic: &str) -> String {
        let lower = mnemonic.to_ascii_lowercase();
        let alias = match self {
            Cpu::M6800 => m6800_table::alias(&lower),
            Cpu::M6809 { .. } => m6809_table::alias(&lower),
        };
        alias.map(str::to_string).unwrap_or(lower)
    }

    pub fn find_opcode(self, mnemonic: &str) -> Option<&'static Opcode> {
        let mnemonic = self.normalize_mnemonic(mnemonic);
        let table = match self {
            Cpu::M6800 => m6800_table::OPCODES,
            Cpu::M6809 { .. } => m6809_table::OPCODES,
        };
        table.iter().find(|op| op.mnemonic == mnemonic)
    }

    pub fn opcodes(self) -> &'static [Opcode] {
        match self {
            Cpu::M6800 => m6800_table::OPCODES,
            Cpu::M6809 { .. } => m6809_table::OPCODES,
        }
    }

    /// Classifies `operand` and encodes the full instruction.
    pub fn encode(
        self,
        op: &Opcode,
        operand: &str,
        ctx: &EncodeCtx<'_>,
    ) -> Result<Encoding, EncodeError> {
        match self {
            Cpu::M6800 => m6800::encode(op, operand, ctx),
            Cpu::M6809 { hd6309 } => m6809::encode(op, operand, ctx, hd6309),
        }
    }
}

/// Shortest legal-width branch displacement, or an out-of-range error.
pub(crate) fn encode_branch(
    op: &Opcode,
    form: Form,
    operand: &str,
    ctx: &EncodeCtx<'_>,
) -> Result<Encoding, EncodeError> {
    let length = u32::from(form.length);
    let target = ctx
        .eval(operand)
        .map_err(|err| pending(err, AddrMode::Immediate, length))?;
    let relative = target - (i64::from(ctx.address) + i64::from(length));

    let mut encoding = Encoding::new(AddrMode::Immediate, form);
    if op.class == OpClass::LongBranch {
        push_value(&mut encoding.bytes, relative, 2);
    } else if bits_required(relative) <= 8 {
        push_value(&mut encoding.bytes, relative, 1);
    } else {
        return Err(EncodeError::malformed(format!(
            "branch offset {relative} out of 8 bit target range; use `l{}`",
            op.mnemonic
        )));
    }
    Ok(encoding)
}

/// Strips a leading force-mode marker such as `<` or `>`.
pub(crate) fn strip_marker(operand: &str, marker: char) -> &str {
    operand.strip_prefix(marker).unwrap_or(operand).trim()
}

#[cfg(test)]
mod tests {
    use super::{AddrMode, Cpu, bits_required};

    #[test]
    fn classifies_bit_widths_after_16_bit_truncation() {
        assert_eq!(bits_required(0), 5);
        assert_eq!(bits_required(-16), 5);
        assert_eq!(bits_required(15), 5);
        assert_eq!(bits_required(16), 8);
        assert_eq!(bits_required(-128), 8);
        assert_eq!(bits_required(-129), 16);
        assert_eq!(bits_required(0xFFFF), 5);
        assert_eq!(bits_required(0xFF80), 8);
    }

    #[test]
    fn names_round_trip() {
        for name in ["6800", "6809", "6309"] {
            let cpu = Cpu::from_name(name).expect("unknown cpu");
            assert_eq!(cpu.name(), name);
        }
        assert_eq!(Cpu::from_name("6502"), None);
    }

    #[test]
    fn aliases_resolve_to_table_rows() {
        let cpu = Cpu::default();
        let op = cpu.find_opcode("LDAA").expect("alias missing");
        assert_eq!(op.mnemonic, "lda");
        assert!(cpu.find_opcode("lsla").is_some());
        assert!(Cpu::M6800.find_opcode("ldaa").is_some());
        assert!(Cpu::M6800.find_opcode("lda").is_none());
    }

    #[test]
    fn every_mnemonic_appears_once_per_table() {
        for cpu in [Cpu::M6800, Cpu::default()] {
            let mut names: Vec<_> = cpu.opcodes().iter().map(|op| op.mnemonic).collect();
            let total = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), total, "duplicate rows for {cpu}");
        }
    }

    #[test]
    fn forms_report_mode_slots() {
        let op = Cpu::default().find_opcode("jmp").expect("jmp missing");
        assert!(op.form(AddrMode::Immediate).is_none());
        assert_eq!(op.form(AddrMode::Extended).map(|form| form.opcode), Some(0x7E));
    }
}
