use super::{
    AddrMode, EncodeCtx, EncodeError, Encoding, Form, OpClass, Opcode, bits_required,
    encode_branch, pending, strip_marker,
};
use crate::line::push_value;

/// Transfer/exchange register codes; `None` slots are unassigned.
const PAIR_REGISTERS: [Option<&str>; 16] = [
    Some("d"),
    Some("x"),
    Some("y"),
    Some("u"),
    Some("s"),
    Some("pc"),
    Some("w"),
    Some("v"),
    Some("a"),
    Some("b"),
    Some("cc"),
    Some("dp"),
    Some("0"),
    None,
    Some("e"),
    Some("f"),
];

/// Bit positions of the push/pull mask, with `u/s` naming the other stack.
const STACK_ORDER: [&str; 8] = ["cc", "a", "b", "dp", "x", "y", "u/s", "pc"];

pub(super) fn encode(
    op: &Opcode,
    operand: &str,
    ctx: &EncodeCtx<'_>,
    hd6309: bool,
) -> Result<Encoding, EncodeError> {
    if op.hd6309 && !hd6309 {
        return Err(EncodeError::malformed(format!(
            "`{}` requires 6309; select it with `.cpu 6309`",
            op.mnemonic
        )));
    }

    match op.class {
        OpClass::BitTransfer => return encode_bit_transfer(op, operand, ctx),
        OpClass::MemoryImmediate => return encode_memory_immediate(op, operand, ctx, hd6309),
        OpClass::TransferMemory => return encode_transfer_memory(op, operand),
        _ => {}
    }

    let mode = classify(op, operand, hd6309)?;
    let form = op.form(mode).ok_or_else(|| {
        EncodeError::malformed(format!(
            "Illegal operand mode: `{}` has no {mode} form",
            op.mnemonic
        ))
    })?;

    let mut encoding = Encoding::new(mode, form);
    match mode {
        AddrMode::Inherent => {}
        AddrMode::Immediate => match op.class {
            OpClass::Branch | OpClass::LongBranch => {
                return encode_branch(op, form, operand, ctx);
            }
            OpClass::Stack { system } => {
                encoding.bytes.push(stack_mask(operand, system)?);
            }
            OpClass::RegisterPair => {
                encoding.bytes.push(register_pair(operand, hd6309)?);
            }
            _ => {
                let value = ctx
                    .eval(&operand[1..])
                    .map_err(|err| pending(err, mode, u32::from(form.length)))?;
                encoding.push(value, form.operand_len());
            }
        },
        AddrMode::Direct => {
            let value = ctx
                .eval(strip_marker(operand, '<'))
                .map_err(|err| pending(err, mode, u32::from(form.length)))?;
            direct_page_check(&mut encoding, value, ctx.dp);
            push_value(&mut encoding.bytes, value, 1);
        }
        AddrMode::Extended => {
            let value = ctx
                .eval(strip_marker(operand, '>'))
                .map_err(|err| pending(err, mode, u32::from(form.length)))?;
            encoding.push(value, 2);
        }
        AddrMode::Indexed => {
            let postbyte = indexed_postbyte(operand, ctx, form, hd6309)?;
            encoding.bytes.extend(postbyte);
        }
    }
    Ok(encoding)
}

/// Chooses the addressing mode from the operand text.
pub(super) fn classify(op: &Opcode, operand: &str, hd6309: bool) -> Result<AddrMode, EncodeError> {
    if operand.is_empty() {
        return Ok(AddrMode::Inherent);
    }
    if operand.starts_with('#') || op.is_branch() {
        return Ok(AddrMode::Immediate);
    }
    match op.class {
        OpClass::Stack { system } => {
            stack_mask(operand, system)?;
            return Ok(AddrMode::Immediate);
        }
        OpClass::RegisterPair => {
            register_pair(operand, hd6309)?;
            return Ok(AddrMode::Immediate);
        }
        _ => {}
    }
    index_or_memory(operand)
}

/// Mode of a memory operand: indexed, forced direct, or extended.
fn index_or_memory(operand: &str) -> Result<AddrMode, EncodeError> {
    let opens = operand.matches('[').count();
    let closes = operand.matches(']').count();
    if opens != closes {
        return Err(EncodeError::malformed("Mismatched brackets"));
    }
    if opens > 0 || operand.contains(',') {
        return Ok(AddrMode::Indexed);
    }
    if operand.starts_with('<') {
        return Ok(AddrMode::Direct);
    }
    Ok(AddrMode::Extended)
}

fn direct_page_check(encoding: &mut Encoding, value: i64, dp: u8) {
    if !(0..=0xFF).contains(&value) && (value >> 8) & 0xFF != i64::from(dp) {
        encoding.warnings.push(format!(
            "address ${:04X} is outside direct page ${dp:02X}",
            value & 0xFFFF
        ));
    }
}

fn stack_mask(operand: &str, system: bool) -> Result<u8, EncodeError> {
    let (own, other) = if system { ("s", "u") } else { ("u", "s") };
    let mut mask = 0u8;
    for name in operand.split(',') {
        let name = name.trim().to_ascii_lowercase();
        let bits = match name.as_str() {
            "d" => 0x06,
            "ccr" => 0x01,
            "dpr" => 0x08,
            reg if reg == other => 0x40,
            reg if reg == own => {
                return Err(EncodeError::malformed(format!(
                    "`{own}` cannot be pushed onto or pulled from its own stack"
                )));
            }
            reg => match STACK_ORDER.iter().position(|slot| *slot == reg) {
                Some(bit) => 1 << bit,
                None => {
                    return Err(EncodeError::malformed(
                        "Operand must be a list of registers",
                    ));
                }
            },
        };
        mask |= bits;
    }
    Ok(mask)
}

fn pair_code(name: &str, hd6309: bool) -> Option<u8> {
    let name = name.trim().to_ascii_lowercase();
    let code = PAIR_REGISTERS
        .iter()
        .position(|slot| *slot == Some(name.as_str()))?;
    let extended = matches!(name.as_str(), "w" | "v" | "0" | "e" | "f");
    (hd6309 || !extended).then_some(code as u8)
}

fn register_pair(operand: &str, hd6309: bool) -> Result<u8, EncodeError> {
    let mut parts = operand.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(src), Some(dst), None) => {
            match (pair_code(src, hd6309), pair_code(dst, hd6309)) {
                (Some(src), Some(dst)) => Ok((src << 4) | dst),
                _ => Err(EncodeError::malformed("Operand must be a list of registers")),
            }
        }
        _ => Err(EncodeError::malformed(
            "Operand must be a list of registers: expected a source and a destination",
        )),
    }
}

/// Post-byte plus offset extension for an indexed operand.
pub(super) fn indexed_postbyte(
    operand: &str,
    ctx: &EncodeCtx<'_>,
    form: Form,
    hd6309: bool,
) -> Result<Vec<u8>, EncodeError> {
    let base = u32::from(form.length);
    let widest = base + 2;
    // An earlier pass may have reserved room for an offset extension.
    let reserved_ext = ctx
        .reserved_length
        .map(|length| length.saturating_sub(base))
        .unwrap_or(0);

    let trimmed = operand.trim();
    let (indirect, body) = match trimmed.strip_prefix('[') {
        Some(rest) => match rest.strip_suffix(']') {
            Some(inner) => (true, inner.trim()),
            None => return Err(EncodeError::malformed("Mismatched brackets")),
        },
        None => (false, trimmed),
    };
    let ind = if indirect { 0x10 } else { 0x00 };

    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() == 1 {
        if !indirect {
            return Err(EncodeError::malformed(format!("Illegal operand {operand}")));
        }
        let value = ctx
            .eval(parts[0])
            .map_err(|err| pending(err, AddrMode::Indexed, widest))?;
        let mut out = vec![0x9F];
        push_value(&mut out, value, 2);
        return Ok(out);
    }
    if parts.len() != 2 {
        return Err(EncodeError::malformed(format!("Illegal operand {operand}")));
    }

    let offset_text = parts[0].trim();
    let first = offset_text.to_ascii_lowercase();
    let second = parts[1].trim().to_ascii_lowercase();
    let inc2 = second.ends_with("++");
    let inc1 = second.ends_with('+') && !inc2;
    let dec2 = second.starts_with("--");
    let dec1 = second.starts_with('-') && !dec2;
    let inc = inc1 || inc2;
    let dec = dec1 || dec2;
    if inc && dec {
        return Err(EncodeError::malformed(
            "Illegal operand. Cannot both inc and dec register",
        ));
    }
    let reg = second.trim_start_matches('-').trim_end_matches('+').trim();
    let rr = match reg {
        "x" => Some(0x00),
        "y" => Some(0x20),
        "u" => Some(0x40),
        "s" => Some(0x60),
        _ => None,
    };

    if reg == "w" {
        if !hd6309 {
            return Err(EncodeError::malformed(
                "W-indexed addressing requires the 6309",
            ));
        }
        let w_mask = if indirect { 0x10 } else { 0x0F };
        return match (first.is_empty(), inc2, dec2, inc1 || dec1) {
            (_, _, _, true) => Err(EncodeError::malformed(
                "W index register only supports double increment or decrement",
            )),
            (true, false, false, false) => Ok(vec![0x80 | w_mask]),
            (false, false, false, false) => {
                let value = ctx
                    .eval(offset_text)
                    .map_err(|err| pending(err, AddrMode::Indexed, widest))?;
                let mut out = vec![0xA0 | w_mask];
                push_value(&mut out, value, 2);
                Ok(out)
            }
            (true, true, false, false) => Ok(vec![0xC0 | w_mask]),
            (true, false, true, false) => Ok(vec![0xE0 | w_mask]),
            _ => Err(EncodeError::malformed("Invalid operand")),
        };
    }

    if (reg == "pc" || reg == "pcr") && !inc && !dec && !first.is_empty() {
        let value = ctx
            .eval(offset_text)
            .map_err(|err| pending(err, AddrMode::Indexed, widest))?;
        let offset_for = |ext: u32| {
            if reg == "pcr" {
                value - (i64::from(ctx.address) + i64::from(base + ext))
            } else {
                value
            }
        };
        let short = offset_for(1);
        let (postbyte, offset, width) = if reserved_ext <= 1 && bits_required(short) <= 8 {
            (0x8C, short, 1)
        } else {
            (0x8D, offset_for(2), 2)
        };
        let mut out = vec![postbyte | ind];
        push_value(&mut out, offset, width);
        return Ok(out);
    }

    let Some(rr) = rr else {
        return Err(EncodeError::malformed("Illegal operand format"));
    };

    if !inc && !dec {
        let accumulator = match first.as_str() {
            "a" => Some((0x06, false)),
            "b" => Some((0x05, false)),
            "d" => Some((0x0B, false)),
            "e" => Some((0x07, true)),
            "f" => Some((0x0A, true)),
            "w" => Some((0x0E, true)),
            _ => None,
        };
        if let Some((src, needs_6309)) = accumulator {
            if needs_6309 && !hd6309 {
                return Err(EncodeError::malformed(format!(
                    "accumulator offset `{first}` requires the 6309"
                )));
            }
            return Ok(vec![0x80 | src | rr | ind]);
        }
    }

    if first.is_empty() {
        let mode = match (inc1, inc2, dec1, dec2) {
            (true, _, _, _) => 0x80,
            (_, true, _, _) => 0x81,
            (_, _, true, _) => 0x82,
            (_, _, _, true) => 0x83,
            _ => 0x84,
        };
        if indirect && (inc1 || dec1) {
            return Err(EncodeError::malformed(
                "single auto increment or decrement cannot be indirect",
            ));
        }
        return Ok(vec![mode | rr | ind]);
    }
    if inc || dec {
        return Err(EncodeError::malformed(
            "auto increment or decrement cannot take an offset",
        ));
    }

    let value = ctx
        .eval(offset_text)
        .map_err(|err| pending(err, AddrMode::Indexed, widest))?;
    let natural_ext = match bits_required(value) {
        5 if !indirect => 0,
        5 | 8 => 1,
        _ => 2,
    };
    let out = match natural_ext.max(reserved_ext.min(2)) {
        0 => vec![(value as u8 & 0x1F) | rr],
        1 => vec![0x88 | rr | ind, value as u8],
        _ => {
            let mut out = vec![0x89 | rr | ind];
            push_value(&mut out, value, 2);
            out
        }
    };
    Ok(out)
}

fn encode_bit_transfer(
    op: &Opcode,
    operand: &str,
    ctx: &EncodeCtx<'_>,
) -> Result<Encoding, EncodeError> {
    let form = op
        .form(AddrMode::Direct)
        .ok_or_else(|| EncodeError::malformed("Illegal operand mode"))?;
    let parts: Vec<&str> = operand.split(',').map(str::trim).collect();
    let [reg, src, dst, address] = parts.as_slice() else {
        return Err(EncodeError::malformed(format!(
            "`{}` takes register,source bit,destination bit,address",
            op.mnemonic
        )));
    };
    let reg = match reg.to_ascii_lowercase().as_str() {
        "cc" => 0,
        "a" => 1,
        "b" => 2,
        other => {
            return Err(EncodeError::malformed(format!(
                "`{other}` is not a bit transfer register"
            )));
        }
    };
    let bit = |text: &str| -> Result<u8, EncodeError> {
        let value = ctx
            .eval(text)
            .map_err(|err| pending(err, AddrMode::Direct, u32::from(form.length)))?;
        u8::try_from(value)
            .ok()
            .filter(|bit| *bit < 8)
            .ok_or_else(|| EncodeError::malformed(format!("bit number {value} out of range")))
    };
    let postbyte = (reg << 6) | (bit(*src)? << 3) | bit(*dst)?;
    let value = ctx
        .eval(strip_marker(address, '<'))
        .map_err(|err| pending(err, AddrMode::Direct, u32::from(form.length)))?;

    let mut encoding = Encoding::new(AddrMode::Direct, form);
    encoding.bytes.push(postbyte);
    direct_page_check(&mut encoding, value, ctx.dp);
    push_value(&mut encoding.bytes, value, 1);
    Ok(encoding)
}

fn encode_memory_immediate(
    op: &Opcode,
    operand: &str,
    ctx: &EncodeCtx<'_>,
    hd6309: bool,
) -> Result<Encoding, EncodeError> {
    let Some((immediate, address)) = operand
        .strip_prefix('#')
        .and_then(|rest| rest.split_once([',', ';']))
    else {
        return Err(EncodeError::malformed(format!(
            "`{}` takes #value,address",
            op.mnemonic
        )));
    };
    let address = address.trim();
    let mode = index_or_memory(address)?;
    let form = op.form(mode).ok_or_else(|| {
        EncodeError::malformed(format!(
            "Illegal operand mode: `{}` has no {mode} form",
            op.mnemonic
        ))
    })?;
    let provisional = u32::from(form.length) + if form.variable { 2 } else { 0 };

    let value = ctx
        .eval(immediate)
        .map_err(|err| pending(err, mode, provisional))?;
    let mut encoding = Encoding::new(mode, form);
    encoding.push(value, 1);

    match mode {
        AddrMode::Direct => {
            let target = ctx
                .eval(strip_marker(address, '<'))
                .map_err(|err| pending(err, mode, provisional))?;
            direct_page_check(&mut encoding, target, ctx.dp);
            push_value(&mut encoding.bytes, target, 1);
        }
        AddrMode::Indexed => {
            let postbyte = indexed_postbyte(address, ctx, form, hd6309)?;
            encoding.bytes.extend(postbyte);
        }
        _ => {
            let target = ctx
                .eval(strip_marker(address, '>'))
                .map_err(|err| pending(err, mode, provisional))?;
            encoding.push(target, 2);
        }
    }
    Ok(encoding)
}

fn encode_transfer_memory(op: &Opcode, operand: &str) -> Result<Encoding, EncodeError> {
    let form = op
        .form(AddrMode::Immediate)
        .ok_or_else(|| EncodeError::malformed("Illegal operand mode"))?;
    let Some((src, dst)) = operand.split_once(',') else {
        return Err(EncodeError::malformed(
            "Operand must be a list of registers",
        ));
    };
    let split = |text: &str| {
        let text = text.trim().to_ascii_lowercase();
        let step = text.chars().last().filter(|c| matches!(c, '+' | '-'));
        let name = text.trim_end_matches(['+', '-']).to_string();
        (name, step)
    };
    let (src_name, src_step) = split(src);
    let (dst_name, dst_step) = split(dst);
    let variant = match (src_step, dst_step) {
        (Some('+'), Some('+')) => 0,
        (Some('-'), Some('-')) => 1,
        (Some('+'), None) => 2,
        (None, Some('+')) => 3,
        _ => {
            return Err(EncodeError::malformed(
                "tfm takes r+,r+ or r-,r- or r+,r or r,r+",
            ));
        }
    };
    let code = |name: &str| {
        PAIR_REGISTERS[..5]
            .iter()
            .position(|slot| *slot == Some(name))
            .map(|code| code as u8)
            .ok_or_else(|| {
                EncodeError::malformed(format!("`{name}` cannot be used as a tfm pointer"))
            })
    };
    let postbyte = (code(src_name.as_str())? << 4) | code(dst_name.as_str())?;

    let mut encoding = Encoding::new(AddrMode::Immediate, form);
    if let Some(opcode) = encoding.bytes.last_mut() {
        *opcode += variant;
    }
    encoding.bytes.push(postbyte);
    Ok(encoding)
}
