//! Dot directives and the data pseudo-ops.

use tracing::debug;

use super::{Assembler, Flow, PassState, structs::strings_to_numbers};
use crate::{
    diag::{Diag, class},
    expr::{EvalError, evaluate},
    line::{ADDRESS_SPACE, Line, fits_width, push_value},
    rom::RomDef,
};

/// `fcb`, `fdb`, `fcc` and `end`. Returns `None` for anything else.
pub(super) fn pseudo_op(
    asm: &mut Assembler,
    idx: usize,
    line: &mut Line,
    state: &PassState,
) -> Option<Flow> {
    let flow = match line.mnemonic().as_str() {
        "fcb" => write_data(asm, idx, line, state, 1, false),
        "fdb" => write_data(asm, idx, line, state, 2, false),
        "fcc" => write_data(asm, idx, line, state, 1, true),
        "end" => {
            line.length = Some(0);
            Flow::Continue
        }
        _ => return None,
    };
    Some(flow)
}

fn write_data(
    asm: &mut Assembler,
    idx: usize,
    line: &mut Line,
    state: &PassState,
    width: u32,
    strings: bool,
) -> Flow {
    let text = if strings {
        strings_to_numbers(line.operand_text())
    } else {
        line.operand_text().to_string()
    };
    line.data.clear();
    if text.trim().is_empty() {
        line.length = Some(0);
        asm.diags.push(
            Diag::error(
                line.file,
                line.opcode_span(),
                format!("`{}` needs at least one value", line.mnemonic()),
            )
            .with_code(class::MALFORMED),
        );
        return Flow::Continue;
    }

    let items: Vec<&str> = text.split(',').map(str::trim).collect();
    let length = width * items.len() as u32;
    line.length = Some(length);

    let mut data = Vec::with_capacity(length as usize);
    for (position, item) in items.iter().enumerate() {
        match evaluate(&asm.symbols, state.address, item) {
            Ok(value) => {
                if !fits_width(value, width) {
                    asm.diags.push(Diag::warning(
                        line.file,
                        line.operand_span(),
                        format!(
                            "item {} value {value} truncated to {width} byte(s)",
                            position + 1
                        ),
                    ));
                }
                push_value(&mut data, value, width);
            }
            Err(err) => return asm.eval_failure(idx, line, state, err, length),
        }
    }
    line.data = data;
    Flow::Continue
}

/// `.org`, `.setdp`, `.rom`, `.cpu` and `.meta`. Returns `None` for anything else.
pub(super) fn directive(asm: &mut Assembler, line: &mut Line, state: &mut PassState) -> Option<Flow> {
    let name = line.mnemonic();
    if !matches!(name.as_str(), ".org" | ".setdp" | ".rom" | ".cpu" | ".meta") {
        return None;
    }
    line.length = Some(0);
    line.data.clear();

    let flow = match name.as_str() {
        ".org" => match value(asm, line, state, "Cannot evaluate address") {
            Ok(Some(value)) => {
                match u32::try_from(value).ok().filter(|address| *address < ADDRESS_SPACE) {
                    Some(address) => {
                        debug!(address, "origin");
                        state.address = address;
                    }
                    None => asm.diags.push(
                        Diag::error(
                            line.file,
                            line.operand_span(),
                            format!("address {value} is out of range"),
                        )
                        .with_code(class::MALFORMED)
                        .with_help("origins run from $0000 to $FFFF"),
                    ),
                }
                Flow::Continue
            }
            Ok(None) => Flow::Continue,
            Err(flow) => flow,
        },
        ".setdp" => match value(asm, line, state, "Cannot evaluate DP") {
            Ok(Some(value)) => {
                match u8::try_from(value) {
                    Ok(dp) => {
                        debug!(dp, "direct page");
                        state.dp = dp;
                    }
                    Err(_) => asm.diags.push(
                        Diag::error(line.file, line.operand_span(), "Cannot evaluate DP")
                            .with_code(class::MALFORMED)
                            .with_help(format!("direct page {value} does not fit in a byte")),
                    ),
                }
                Flow::Continue
            }
            Ok(None) => Flow::Continue,
            Err(flow) => flow,
        },
        ".rom" => {
            match RomDef::parse(line.operand_text()) {
                Some(def) => {
                    debug!(filename = %def.filename, size = def.size, offset = def.offset, "rom");
                    asm.roms.push(def);
                }
                None => asm.diags.push(
                    Diag::error(line.file, line.operand_span(), "Cannot parse .ROM directive.")
                        .with_code(class::MALFORMED)
                        .with_help("expected `.rom filename size sha1 offset` (size decimal, offset hex)"),
                ),
            }
            Flow::Continue
        }
        _ => Flow::Continue,
    };
    Some(flow)
}

/// Evaluates a directive operand. `Ok(None)` means an error was reported and
/// assembly continues; `Err` carries a halt.
fn value(
    asm: &mut Assembler,
    line: &Line,
    state: &PassState,
    failure: &str,
) -> Result<Option<i64>, Flow> {
    match evaluate(&asm.symbols, state.address, line.operand_text()) {
        Ok(value) => Ok(Some(value)),
        Err(EvalError::DivisionByZero) => {
            asm.diags.push(
                Diag::error(line.file, line.operand_span(), "division by zero")
                    .with_code(class::FATAL),
            );
            Err(Flow::Halt)
        }
        Err(err) => {
            asm.diags.push(
                Diag::error(line.file, line.operand_span(), failure)
                    .with_code(class::MALFORMED)
                    .with_help(err.to_string()),
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        AssembleOptions,
        asm::assemble,
        diag::{Diag, class},
        lex::lex_lines,
        source::SourceManager,
    };

    fn run(text: &str) -> Result<crate::asm::Assembly, Vec<Diag>> {
        let mut manager = SourceManager::new();
        let file = manager.add_virtual_file("t.asm", text);
        let (lines, _) = lex_lines(&manager, file);
        assemble(lines, &AssembleOptions::default())
    }

    #[test]
    fn data_pseudo_ops_emit_big_endian_values() {
        let assembly = run(" .cpu 6809\n fcb 1,$FF,-1\n fdb $1234,later\n fcc \"Hi\",0\nlater end\n")
            .expect("assembly failed");
        assert_eq!(assembly.lines[1].data, vec![1, 0xFF, 0xFF]);
        assert_eq!(assembly.lines[2].data, vec![0x12, 0x34, 0x00, 0x0A]);
        assert_eq!(assembly.lines[3].data, vec![b'H', b'i', 0]);
    }

    #[test]
    fn org_moves_the_cursor() {
        let assembly = run(" .cpu 6809\n .org $C000\nstart nop\n").expect("assembly failed");
        assert_eq!(assembly.lines[2].address, Some(0xC000));
        assert_eq!(assembly.final_address, 0xC001);
    }

    #[test]
    fn org_beyond_the_address_space_is_rejected() {
        for origin in ["$FFFFFFFF", "$40000000", "$10000", "-1"] {
            let diags = run(&format!(" .cpu 6809\n .org {origin}\n nop\n"))
                .expect_err("accepted");
            assert!(
                diags
                    .iter()
                    .any(|diag| diag.message.contains("is out of range")
                        && diag.code.as_deref() == Some(class::MALFORMED)),
                "{origin}: {diags:#?}"
            );
        }

        let assembly = run(" .cpu 6809\n .org $FFFF\n nop\n").expect("assembly failed");
        assert_eq!(assembly.final_address, 0x10000);
        assert_eq!(assembly.rom.len(), 0x10000);
    }

    #[test]
    fn rom_definitions_are_collected() {
        let assembly = run(" .cpu 6809\n .rom game.bin 4096 0a1b2c 2000\n nop\n")
            .expect("assembly failed");
        let def = &assembly.roms[0];
        assert_eq!(def.filename, "game.bin");
        assert_eq!(def.size, 4096);
        assert_eq!(def.offset, 0x2000);
        assert_eq!(def.sha1, "0A1B2C");
    }

    #[test]
    fn malformed_directives_are_reported() {
        let diags = run(" .cpu 6809\n .rom game.bin\n .org nowhere\n").expect_err("accepted");
        let messages: Vec<&str> = diags.iter().map(|diag| diag.message.as_str()).collect();
        assert!(messages.contains(&"Cannot parse .ROM directive."));
        assert!(messages.contains(&"Cannot evaluate address"));
    }

    #[test]
    fn setdp_drives_direct_page_warnings() {
        let assembly = run(" .cpu 6809\n .setdp $D0\n lda <$D012\n lda <$2012\n")
            .expect("assembly failed");
        assert_eq!(assembly.lines[2].data, vec![0x96, 0x12]);
        let warnings: Vec<&Diag> = assembly
            .diags
            .iter()
            .filter(|diag| diag.message.contains("outside direct page"))
            .collect();
        assert_eq!(warnings.len(), 1);
    }
}
