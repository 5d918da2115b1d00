use asm6x09_core::{
    AssembleOptions, Cpu, compile_source_text,
    cpu::{AddrMode, Form, OpClass},
    diag::has_errors,
};

const MODES: [AddrMode; 5] = [
    AddrMode::Inherent,
    AddrMode::Immediate,
    AddrMode::Direct,
    AddrMode::Indexed,
    AddrMode::Extended,
];

#[test]
fn encodes_every_6800_table_entry() {
    check_table(Cpu::M6800);
}

#[test]
fn encodes_every_6809_and_6309_table_entry() {
    check_table(Cpu::M6809 { hd6309: true });
}

#[test]
fn hd6309_rows_are_rejected_on_a_plain_6809() {
    let cpu = Cpu::M6809 { hd6309: false };
    let opts = AssembleOptions {
        cpu: Some(cpu),
        ..AssembleOptions::default()
    };
    let (assembly, diags) = compile_source_text(" sexw\n", &opts);
    assert!(assembly.is_none());
    assert!(has_errors(&diags));
}

fn check_table(cpu: Cpu) {
    let opts = AssembleOptions {
        cpu: Some(cpu),
        ..AssembleOptions::default()
    };

    for op in cpu.opcodes().iter().filter(|op| op.class == OpClass::Plain) {
        for mode in MODES {
            let Some(form) = op.form(mode) else {
                continue;
            };
            let (operand, operand_bytes) = operand_for_mode(cpu, mode, form);
            let source = format!(" {} {operand}\n", op.mnemonic);

            let (assembly, diags) = compile_source_text(&source, &opts);
            assert!(
                !has_errors(&diags),
                "unexpected diagnostics for {} ({mode}) on {cpu}: {diags:#?}",
                op.mnemonic
            );
            let bytes = assembly
                .map(|assembly| assembly.rom.bytes().to_vec())
                .unwrap_or_default();

            assert_eq!(
                bytes,
                expected_bytes(form, &operand_bytes),
                "byte mismatch for {} ({mode}) on {cpu}",
                op.mnemonic
            );
        }
    }
}

fn expected_bytes(form: Form, operand_bytes: &[u8]) -> Vec<u8> {
    let mut expected = Vec::new();
    form.write_opcode(&mut expected);
    expected.extend_from_slice(operand_bytes);
    expected
}

fn operand_for_mode(cpu: Cpu, mode: AddrMode, form: Form) -> (&'static str, Vec<u8>) {
    match mode {
        AddrMode::Inherent => ("", vec![]),
        AddrMode::Immediate => {
            let mut bytes = vec![0; form.operand_len() as usize];
            if let Some(last) = bytes.last_mut() {
                *last = 0x12;
            }
            ("#$12", bytes)
        }
        AddrMode::Direct => ("<$34", vec![0x34]),
        AddrMode::Extended => ("$1234", vec![0x12, 0x34]),
        AddrMode::Indexed => match cpu {
            Cpu::M6800 => ("$34,x", vec![0x34]),
            Cpu::M6809 { .. } => (",x", vec![0x84]),
        },
    }
}
