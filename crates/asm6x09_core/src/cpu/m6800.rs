use super::{
    AddrMode, EncodeCtx, EncodeError, Encoding, Opcode, encode_branch, pending, strip_marker,
};
use crate::line::push_value;

pub(super) fn encode(
    op: &Opcode,
    operand: &str,
    ctx: &EncodeCtx<'_>,
) -> Result<Encoding, EncodeError> {
    let mode = classify(op, operand);
    let form = op.form(mode).ok_or_else(|| {
        EncodeError::malformed(format!(
            "Illegal operand mode: `{}` has no {mode} form",
            op.mnemonic
        ))
    })?;
    if op.is_branch() {
        return encode_branch(op, form, operand, ctx);
    }

    let length = u32::from(form.length);
    let mut encoding = Encoding::new(mode, form);
    match mode {
        AddrMode::Inherent => {}
        AddrMode::Immediate => {
            let value = ctx
                .eval(&operand[1..])
                .map_err(|err| pending(err, mode, length))?;
            encoding.push(value, form.operand_len());
        }
        AddrMode::Direct => {
            let value = ctx
                .eval(strip_marker(operand, '<'))
                .map_err(|err| pending(err, mode, length))?;
            encoding.push(value, 1);
        }
        AddrMode::Extended => {
            let value = ctx
                .eval(strip_marker(operand, '>'))
                .map_err(|err| pending(err, mode, length))?;
            encoding.push(value, 2);
        }
        AddrMode::Indexed => {
            let Some((offset, register)) = operand.rsplit_once(',') else {
                return Err(EncodeError::malformed(format!("Illegal operand {operand}")));
            };
            if !register.trim().eq_ignore_ascii_case("x") {
                return Err(EncodeError::malformed(
                    "6800 indexed addressing only uses X",
                ));
            }
            let offset = offset.trim();
            let value = if offset.is_empty() {
                0
            } else {
                ctx.eval(offset).map_err(|err| pending(err, mode, length))?
            };
            if !(0..=0xFF).contains(&value) {
                return Err(EncodeError::malformed(format!(
                    "index offset {value} out of range 0..255"
                )));
            }
            push_value(&mut encoding.bytes, value, 1);
        }
    }
    Ok(encoding)
}

fn classify(op: &Opcode, operand: &str) -> AddrMode {
    if operand.is_empty() {
        AddrMode::Inherent
    } else if operand.starts_with('#') || op.is_branch() {
        AddrMode::Immediate
    } else if operand.contains(',') {
        AddrMode::Indexed
    } else if operand.starts_with('<') {
        AddrMode::Direct
    } else {
        AddrMode::Extended
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cpu::{Cpu, EncodeCtx, EncodeError},
        symbols::SymbolTable,
    };

    fn encode(mnemonic: &str, operand: &str) -> Result<Vec<u8>, EncodeError> {
        let symbols = SymbolTable::default();
        let op = Cpu::M6800.find_opcode(mnemonic).expect("unknown mnemonic");
        let ctx = EncodeCtx {
            symbols: &symbols,
            address: 0x100,
            dp: 0,
            reserved_length: None,
        };
        Cpu::M6800.encode(op, operand, &ctx).map(|encoding| encoding.bytes)
    }

    #[test]
    fn encodes_each_mode() {
        assert_eq!(encode("nop", ""), Ok(vec![0x01]));
        assert_eq!(encode("ldaa", "#$42"), Ok(vec![0x86, 0x42]));
        assert_eq!(encode("ldx", "#$1234"), Ok(vec![0xCE, 0x12, 0x34]));
        assert_eq!(encode("ldaa", "<$42"), Ok(vec![0x96, 0x42]));
        assert_eq!(encode("staa", "$1234"), Ok(vec![0xB7, 0x12, 0x34]));
        assert_eq!(encode("jmp", "$10,x"), Ok(vec![0x6E, 0x10]));
        assert_eq!(encode("ldab", ",x"), Ok(vec![0xE6, 0x00]));
    }

    #[test]
    fn branches_are_relative_to_the_next_instruction() {
        assert_eq!(encode("bra", "$100"), Ok(vec![0x20, 0xFE]));
        assert_eq!(encode("bne", "$110"), Ok(vec![0x26, 0x0E]));
    }

    #[test]
    fn rejects_bad_indexed_forms() {
        assert!(encode("ldaa", "5,y").is_err());
        assert!(encode("ldaa", "-1,x").is_err());
        assert!(encode("ldaa", "256,x").is_err());
    }

    #[test]
    fn rejects_missing_modes() {
        let err = encode("clr", "<$10").unwrap_err();
        assert!(err.to_string().contains("Illegal operand mode"));
    }
}
