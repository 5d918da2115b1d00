//! Two-pass assembly of a line stream.
//!
//! Pass 1 walks every line in order, binding labels to the running address
//! and encoding what it can. Lines whose operands reference symbols that are
//! not yet bound keep a provisional length and are flagged. The fixup pass
//! re-encodes each flagged line once at its pass-1 address; anything still
//! unresolved afterwards is an error.

use rustc_hash::FxHashMap;
use tracing::{debug, info, trace};

use crate::{
    AssembleOptions,
    cpu::{Cpu, EncodeCtx, EncodeError, Opcode},
    diag::{Diag, DiagLabel, Severity, class, has_errors},
    expr::{EvalError, evaluate},
    line::Line,
    preprocess::preprocess,
    rom::{RomDef, RomImage},
    symbols::SymbolTable,
};

mod directives;
pub mod structs;

use structs::{InstanceError, collect_structs, encode_instance};

/// Everything a successful run produces.
#[derive(Clone, Debug)]
pub struct Assembly {
    pub cpu: Cpu,
    pub lines: Vec<Line>,
    pub symbols: SymbolTable,
    pub rom: RomImage,
    pub roms: Vec<RomDef>,
    /// One past the highest byte emitted.
    pub final_address: u32,
    /// Warnings and notes; errors fail the run instead.
    pub diags: Vec<Diag>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

/// Cursor state threaded through a pass.
#[derive(Clone, Copy, Debug)]
struct PassState {
    pass: u8,
    address: u32,
    dp: u8,
}

/// What a flagged line was waiting on when it was deferred.
#[derive(Clone, Debug)]
struct Pending {
    symbol: String,
    dp: u8,
}

struct Assembler {
    cpu: Cpu,
    symbols: SymbolTable,
    roms: Vec<RomDef>,
    diags: Vec<Diag>,
    pending: FxHashMap<usize, Pending>,
}

/// Runs the preprocessor, struct collection, both passes and ROM layout.
pub fn assemble(lines: Vec<Line>, opts: &AssembleOptions) -> Result<Assembly, Vec<Diag>> {
    let mut diags = Vec::new();
    info!(lines = lines.len(), "assembling");

    let (lines, stats) = match preprocess(lines, &opts.defines) {
        Ok(result) => result,
        Err(diag) => {
            diags.push(diag);
            return Err(diags);
        }
    };
    info!(
        removed = stats.removed,
        defined = stats.defined,
        "lines removed by the preprocessor"
    );

    let cpu = select_cpu(&lines, opts, &mut diags);
    info!(%cpu, "cpu selected");

    let mut symbols = SymbolTable::new();
    let mut lines = match collect_structs(lines, &mut symbols) {
        Ok(lines) => lines,
        Err(diag) => {
            diags.push(diag);
            return Err(diags);
        }
    };

    declare_labels(&lines, &mut symbols);
    info!(labels = symbols.labels().len(), "labels declared");

    let mut asm = Assembler {
        cpu,
        symbols,
        roms: Vec::new(),
        diags,
        pending: FxHashMap::default(),
    };

    if asm.first_pass(&mut lines) == Flow::Halt || asm.fixup_pass(&mut lines) == Flow::Halt {
        return Err(asm.diags);
    }

    let final_address = asm.finalize(&lines, opts.label_proximity);
    let (rom, rom_diags) = RomImage::build(&lines);
    asm.diags.extend(rom_diags);
    info!(
        final_address = format_args!("${final_address:04X}"),
        rom_bytes = rom.len(),
        "assembly finished"
    );

    if has_errors(&asm.diags) {
        return Err(asm.diags);
    }
    Ok(Assembly {
        cpu,
        lines,
        symbols: asm.symbols,
        rom,
        roms: asm.roms,
        final_address,
        diags: asm.diags,
    })
}

/// The last `.cpu` directive wins; an explicit option overrides them all.
fn select_cpu(lines: &[Line], opts: &AssembleOptions, diags: &mut Vec<Diag>) -> Cpu {
    if let Some(cpu) = opts.cpu {
        return cpu;
    }

    let mut selected = None;
    for line in lines {
        if line.mnemonic() != ".cpu" {
            continue;
        }
        match Cpu::from_name(line.operand_text()) {
            Some(cpu) => selected = Some(cpu),
            None => diags.push(
                Diag::warning(
                    line.file,
                    line.operand_span(),
                    format!("unknown CPU `{}`", line.operand_text()),
                )
                .with_help("supported CPUs are 6800, 6809 and 6309"),
            ),
        }
    }

    selected.unwrap_or_else(|| {
        diags.push(Diag::global(
            Severity::Note,
            "CPU not detected, assuming 6809. Use '.cpu' directive to set.",
        ));
        Cpu::default()
    })
}

fn declare_labels(lines: &[Line], symbols: &mut SymbolTable) {
    for line in lines {
        let Some(label) = &line.label else {
            continue;
        };
        let instance_of = line
            .opcode_text()
            .filter(|opcode| symbols.struct_by_name(opcode).is_some())
            .map(str::to_string);
        symbols.declare_label(
            label.value.clone(),
            instance_of,
            label.file,
            label.span.clone(),
        );
    }
}

impl Assembler {
    fn first_pass(&mut self, lines: &mut [Line]) -> Flow {
        let mut state = PassState {
            pass: 1,
            address: 0,
            dp: 0,
        };
        for (idx, line) in lines.iter_mut().enumerate() {
            line.address = Some(state.address);
            if let Some(label) = line.label_text() {
                if !self.symbols.bind_label_address(label, state.address) {
                    self.diags.push(
                        Diag::error(line.file, line.label_span(), "Cannot set label address")
                            .with_code(class::INCONSISTENT),
                    );
                }
            }
            if self.assemble_line(idx, line, &mut state) == Flow::Halt {
                return Flow::Halt;
            }
        }
        let flagged = lines.iter().filter(|line| line.needs_fixup).count();
        info!(flagged, end = state.address, "pass 1 complete");
        Flow::Continue
    }

    fn fixup_pass(&mut self, lines: &mut [Line]) -> Flow {
        let mut fixed = 0usize;
        for (idx, line) in lines.iter_mut().enumerate() {
            if !line.needs_fixup {
                continue;
            }
            line.needs_fixup = false;
            let Some(pending) = self.pending.remove(&idx) else {
                continue;
            };
            let mut state = PassState {
                pass: 2,
                address: line.address.unwrap_or_default(),
                dp: pending.dp,
            };
            let reserved = line.length;
            if self.assemble_line(idx, line, &mut state) == Flow::Halt {
                return Flow::Halt;
            }

            if line.needs_fixup {
                let symbol = self
                    .pending
                    .get(&idx)
                    .map_or(pending.symbol.as_str(), |again| again.symbol.as_str());
                self.diags.push(
                    Diag::error(line.file, line.operand_span(), format!("Cannot fix line {line}"))
                        .with_code(class::INCONSISTENT)
                        .with_help(self.symbols.explain_unresolved(symbol)),
                );
                return Flow::Halt;
            }
            if line.length.is_some() && line.length != reserved {
                self.diags.push(
                    Diag::error(
                        line.file,
                        line.span.clone(),
                        format!(
                            "line length changed from {} to {} during fixup",
                            reserved.unwrap_or_default(),
                            line.length.unwrap_or_default()
                        ),
                    )
                    .with_code(class::INCONSISTENT),
                );
            }
            fixed += 1;
        }
        info!(fixed, "fixup pass complete");
        Flow::Continue
    }

    /// Encodes one line at `state.address` and advances the cursor by its length.
    fn assemble_line(&mut self, idx: usize, line: &mut Line, state: &mut PassState) -> Flow {
        let Some(opcode) = line.opcode_text().map(str::to_string) else {
            line.length = Some(0);
            return Flow::Continue;
        };
        trace!(pass = state.pass, address = state.address, %line, "assembling line");

        let flow = if let Some(op) = self.cpu.find_opcode(&opcode) {
            self.assemble_instruction(idx, op, line, state)
        } else if self.symbols.struct_by_name(&opcode).is_some() {
            self.assemble_instance(idx, line, state)
        } else if let Some(flow) = directives::pseudo_op(self, idx, line, state) {
            flow
        } else if let Some(flow) = directives::directive(self, line, state) {
            flow
        } else {
            self.diags.push(
                Diag::error(line.file, line.opcode_span(), format!("Could not assemble line {line}"))
                    .with_code(class::FATAL),
            );
            Flow::Halt
        };

        if let Some(length) = line.length {
            state.address = state.address.wrapping_add(length);
        }
        flow
    }

    fn assemble_instruction(
        &mut self,
        idx: usize,
        op: &Opcode,
        line: &mut Line,
        state: &PassState,
    ) -> Flow {
        let ctx = EncodeCtx {
            symbols: &self.symbols,
            address: state.address,
            dp: state.dp,
            reserved_length: line.length,
        };
        match self.cpu.encode(op, line.operand_text(), &ctx) {
            Ok(encoding) => {
                for warning in encoding.warnings {
                    self.diags
                        .push(Diag::warning(line.file, line.operand_span(), warning));
                }
                line.length = Some(encoding.bytes.len() as u32);
                line.data = encoding.bytes;
                line.addr_mode = Some(encoding.mode);
                Flow::Continue
            }
            Err(EncodeError::Unresolved {
                symbol,
                mode,
                length,
            }) => {
                line.addr_mode = Some(mode);
                let length = line.length.map_or(length, |reserved| reserved.max(length));
                self.defer(idx, line, state, symbol, length);
                Flow::Continue
            }
            Err(EncodeError::Malformed(message)) => {
                line.data.clear();
                line.length = None;
                self.diags.push(
                    Diag::error(line.file, line.operand_span(), message)
                        .with_code(class::MALFORMED),
                );
                Flow::Continue
            }
            Err(EncodeError::DivisionByZero) => {
                self.diags.push(
                    Diag::error(line.file, line.operand_span(), "division by zero")
                        .with_code(class::FATAL),
                );
                Flow::Halt
            }
        }
    }

    fn assemble_instance(&mut self, idx: usize, line: &mut Line, state: &PassState) -> Flow {
        let Some((_, def)) = line
            .opcode_text()
            .and_then(|name| self.symbols.struct_by_name(name))
        else {
            return Flow::Continue;
        };
        let length = def.byte_length.unwrap_or_default();
        let widths = def.byte_lengths.clone();
        line.length = Some(length);
        line.data.clear();

        if line.operand_text().is_empty() {
            self.zero_fill_with_error(line, "Empty struct operand".to_string());
            return Flow::Continue;
        }

        let mut data = Vec::with_capacity(length as usize);
        let mut warnings = Vec::new();
        let symbols = &self.symbols;
        let result = encode_instance(
            &widths,
            line.operand_text(),
            |text| evaluate(symbols, state.address, text),
            &mut data,
            &mut warnings,
        );
        line.data = data;
        for warning in warnings {
            self.diags
                .push(Diag::warning(line.file, line.operand_span(), warning));
        }

        match result {
            Ok(()) => Flow::Continue,
            Err(InstanceError::FieldCount { expected, found }) => {
                self.zero_fill_with_error(
                    line,
                    format!("Struct def has {expected} fields, operand has {found}"),
                );
                Flow::Continue
            }
            Err(InstanceError::Eval(err)) => self.eval_failure(idx, line, state, err, length),
        }
    }

    /// Routes an evaluator failure on a data line: defer, report, or halt.
    fn eval_failure(
        &mut self,
        idx: usize,
        line: &mut Line,
        state: &PassState,
        err: EvalError,
        length: u32,
    ) -> Flow {
        match err {
            EvalError::Unresolved { symbol } => {
                self.defer(idx, line, state, symbol, length);
                Flow::Continue
            }
            EvalError::Malformed(message) => {
                self.zero_fill_with_error(line, message);
                Flow::Continue
            }
            EvalError::DivisionByZero => {
                self.diags.push(
                    Diag::error(line.file, line.operand_span(), "division by zero")
                        .with_code(class::FATAL),
                );
                Flow::Halt
            }
        }
    }

    fn defer(&mut self, idx: usize, line: &mut Line, state: &PassState, symbol: String, length: u32) {
        debug!(pass = state.pass, %symbol, %line, "deferring line");
        line.data.clear();
        line.length = Some(length);
        line.needs_fixup = true;
        self.pending.insert(
            idx,
            Pending {
                symbol,
                dp: state.dp,
            },
        );
    }

    /// Keeps the line's layout so later addresses stay put.
    fn zero_fill_with_error(&mut self, line: &mut Line, message: String) {
        line.data = vec![0; line.length.unwrap_or_default() as usize];
        self.diags.push(
            Diag::error(line.file, line.operand_span(), message).with_code(class::MALFORMED),
        );
    }

    fn finalize(&mut self, lines: &[Line], label_proximity: u32) -> u32 {
        let final_address = lines
            .iter()
            .filter_map(Line::end_address)
            .max()
            .unwrap_or_default();

        for (first, second) in self.symbols.labels_too_close(label_proximity) {
            let (Some(lo), Some(hi)) = (first.address, second.address) else {
                continue;
            };
            self.diags.push(
                Diag::warning(
                    second.file,
                    second.span.clone(),
                    format!("Labels too close {} at x{lo:04X} and x{hi:04X}", second.name),
                )
                .with_label(DiagLabel {
                    file: first.file,
                    span: first.span.clone(),
                    message: "other definition here".to_string(),
                }),
            );
        }

        for line in lines {
            if line.opcode.is_some() && line.address.is_none() {
                self.diags.push(
                    Diag::error(line.file, line.opcode_span(), format!("Unassembled opcode {line}"))
                        .with_code(class::INCONSISTENT),
                );
            }
            if let Some(length) = line.length {
                if line.data.len() as u32 != length {
                    self.diags.push(
                        Diag::error(
                            line.file,
                            line.span.clone(),
                            format!("Line length {length}, byte length {}", line.data.len()),
                        )
                        .with_code(class::INCONSISTENT),
                    );
                }
            }
        }
        final_address
    }
}

#[cfg(test)]
mod tests {
    use super::assemble;
    use crate::{
        AssembleOptions,
        cpu::{AddrMode, Cpu},
        diag::{Diag, Severity},
        lex::lex_lines,
        source::SourceManager,
    };

    fn run(text: &str) -> Result<super::Assembly, Vec<Diag>> {
        let mut manager = SourceManager::new();
        let file = manager.add_virtual_file("t.asm", text);
        let (lines, diags) = lex_lines(&manager, file);
        assert!(diags.is_empty());
        assemble(lines, &AssembleOptions::default())
    }

    fn messages(diags: &[Diag]) -> Vec<&str> {
        diags.iter().map(|diag| diag.message.as_str()).collect()
    }

    #[test]
    fn forward_and_backward_references_agree() {
        let forward = run(" .cpu 6809\n jmp there\nthere nop\n").expect("assembly failed");
        let backward = run(" .cpu 6809\nthere nop\n jmp there\n").expect("assembly failed");
        assert_eq!(forward.lines[1].data, vec![0x7E, 0x00, 0x03]);
        assert_eq!(backward.lines[2].data, vec![0x7E, 0x00, 0x00]);
        assert!(forward.lines.iter().all(|line| !line.needs_fixup));
    }

    #[test]
    fn default_cpu_adds_a_note() {
        let assembly = run(" nop\n").expect("assembly failed");
        assert_eq!(assembly.cpu, Cpu::default());
        assert!(
            assembly
                .diags
                .iter()
                .any(|diag| diag.severity == Severity::Note && diag.message.contains("6809"))
        );
    }

    #[test]
    fn last_cpu_directive_wins() {
        let assembly = run(" .cpu 6800\n .cpu 6309\n ldq #1\n").expect("assembly failed");
        assert_eq!(assembly.cpu, Cpu::M6809 { hd6309: true });
        assert_eq!(assembly.lines[2].addr_mode, Some(AddrMode::Immediate));
    }

    #[test]
    fn unknown_opcodes_halt() {
        let diags = run(" .cpu 6809\n frob 1\n nop\n").expect_err("accepted unknown opcode");
        assert!(diags.iter().any(|diag| diag.is_fatal()));
        assert!(messages(&diags).iter().any(|msg| msg.starts_with("Could not assemble line")));
    }

    #[test]
    fn unresolvable_symbols_fail_the_fixup_pass() {
        let diags = run(" .cpu 6809\n jmp nowhere\n").expect_err("accepted missing label");
        let fix = diags
            .iter()
            .find(|diag| diag.message.starts_with("Cannot fix line"))
            .expect("no fixup error");
        assert!(fix.help.as_deref().is_some_and(|help| help.contains("nowhere")));
    }

    #[test]
    fn indexed_forward_references_keep_their_reserved_length() {
        let assembly = run(" .cpu 6809\n lda near,x\nnear nop\n").expect("assembly failed");
        assert_eq!(assembly.lines[1].data, vec![0xA6, 0x89, 0x00, 0x04]);
        assert_eq!(assembly.lines[2].address, Some(4));
    }

    #[test]
    fn struct_instances_encode_fields() {
        let text = " .cpu 6809\nPoint struc\nx fdb ?\ny fcb ?\n ends\norigin Point <$1234, 7>\n ldx #origin.y\n";
        let assembly = run(text).expect("assembly failed");
        assert_eq!(assembly.lines[1].data, vec![0x12, 0x34, 0x07]);
        assert_eq!(assembly.lines[2].data, vec![0x8E, 0x00, 0x02]);
    }

    #[test]
    fn struct_field_count_mismatch_is_reported() {
        let text = " .cpu 6809\nPair struc\na fcb ?\nb fcb ?\n ends\n Pair 1,2,3\n";
        let diags = run(text).expect_err("accepted mismatch");
        assert!(messages(&diags).contains(&"Struct def has 2 fields, operand has 3"));
    }

    #[test]
    fn close_duplicate_labels_warn() {
        let text = " .cpu 6809\nskip nop\nskip nop\n";
        let assembly = run(text).expect("assembly failed");
        assert!(
            messages(&assembly.diags)
                .iter()
                .any(|msg| msg.starts_with("Labels too close skip at x0000 and x0001"))
        );
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let diags = run(" .cpu 6809\n lda #1/0\n").expect_err("accepted division by zero");
        assert!(diags.iter().any(|diag| diag.is_fatal()));
    }
}
