use asm6x09_core::{
    AssembleOptions, Assembly, compile_source_text,
    asm::structs::encode_instance,
    cpu::EncodeCtx,
    diag::{Diag, Severity, has_errors},
    expr::evaluate,
};

fn assemble_ok(src: &str) -> (Assembly, Vec<Diag>) {
    let (assembly, diags) = compile_source_text(src, &AssembleOptions::default());
    assert!(!has_errors(&diags), "diagnostics: {diags:#?}");
    (assembly.expect("no assembly despite a clean run"), diags)
}

fn warnings(diags: &[Diag]) -> Vec<&str> {
    diags
        .iter()
        .filter(|diag| diag.severity == Severity::Warning)
        .map(|diag| diag.message.as_str())
        .collect()
}

#[test]
fn assembles_label_then_jump() {
    let src = r#"
LABEL: NOP
    JMP LABEL
"#;

    let (assembly, _) = assemble_ok(src);
    assert_eq!(assembly.rom.bytes(), &[0x12, 0x7E, 0x00, 0x00]);
    assert_eq!(assembly.lines[0].address, Some(0));
    assert_eq!(assembly.lines[1].length, Some(3));
    assert_eq!(assembly.final_address, 4);
}

#[test]
fn assembles_small_6800_program() {
    let src = r#"
    .cpu 6800
    .org $10
start   ldaa #1
        staa $20
        bne start
        rts
"#;

    let (assembly, _) = assemble_ok(src);
    assert_eq!(
        &assembly.rom.bytes()[0x10..],
        &[0x86, 0x01, 0xB7, 0x00, 0x20, 0x26, 0xF9, 0x39]
    );
}

#[test]
fn forward_and_backward_references_produce_identical_bytes() {
    let forward = r#"
    .cpu 6809
    ldx #data
    bra done
data fdb $BEEF
done rts
"#;
    let (assembly, _) = assemble_ok(forward);
    assert_eq!(
        assembly.rom.bytes(),
        &[0x8E, 0x00, 0x05, 0x20, 0x02, 0xBE, 0xEF, 0x39]
    );
    assert!(assembly.lines.iter().all(|line| !line.needs_fixup));
}

#[test]
fn reports_a_single_gap_warning() {
    let src = r#"
    .org $10
    fcb $AA
    .org $20
    fcb $BB
"#;

    let (assembly, diags) = assemble_ok(src);
    let gaps: Vec<&str> = warnings(&diags)
        .into_iter()
        .filter(|message| message.contains("not accounted for"))
        .collect();
    assert_eq!(gaps, vec!["Address 0x0011 not accounted for in ROM"]);
    assert!(assembly.rom.bytes()[0x11..0x20].iter().all(|byte| *byte == 0));
    assert_eq!(assembly.rom.bytes()[0x20], 0xBB);
}

#[test]
fn backward_branch_reach_is_exactly_128_bytes() {
    let (assembly, _) = assemble_ok("target nop\n .org 126\n bra target\n");
    assert_eq!(&assembly.rom.bytes()[126..], &[0x20, 0x80]);

    let (_, diags) = compile_source_text(
        "target nop\n .org 127\n bra target\n",
        &AssembleOptions::default(),
    );
    assert!(
        diags
            .iter()
            .any(|diag| diag.severity == Severity::Error && diag.message.contains("out of 8 bit")),
        "diagnostics: {diags:#?}"
    );

    let (assembly, _) = assemble_ok("target nop\n .org 127\n lbra target\n");
    assert_eq!(&assembly.rom.bytes()[127..], &[0x16, 0xFF, 0x7E]);
}

#[test]
fn forward_branch_out_of_reach_fails_after_fixup() {
    let (assembly, diags) = compile_source_text(
        " bra far\n .org $200\nfar nop\n",
        &AssembleOptions::default(),
    );
    assert!(assembly.is_none());
    assert!(has_errors(&diags));
}

#[test]
fn encodes_indexed_offsets() {
    let (assembly, _) = assemble_ok(" lda 5,x\n lda 300,x\n");
    assert_eq!(
        assembly.rom.bytes(),
        &[0xA6, 0x05, 0xA6, 0x89, 0x01, 0x2C]
    );
}

#[test]
fn conditional_blocks_follow_defines() {
    let src = r#"
#ifdef FAST
    fcb 1
#else
    fcb 2
#endif
"#;

    let (assembly, _) = assemble_ok(src);
    assert_eq!(assembly.rom.bytes(), &[2]);

    let opts = AssembleOptions {
        defines: vec!["FAST".to_string()],
        ..AssembleOptions::default()
    };
    let (assembly, diags) = compile_source_text(src, &opts);
    assert!(!has_errors(&diags), "diagnostics: {diags:#?}");
    assert_eq!(assembly.map(|assembly| assembly.rom.bytes().to_vec()), Some(vec![1]));
}

#[test]
fn unmatched_endif_halts() {
    let (assembly, diags) = compile_source_text("#endif\n nop\n", &AssembleOptions::default());
    assert!(assembly.is_none());
    assert!(diags.iter().any(|diag| diag.is_fatal()));
}

#[test]
fn reencoding_fixed_up_lines_is_byte_identical() {
    let src = r#"
    .cpu 6809
Pair struc
lo  fcb ?
hi  fdb ?
    ends
    jmp later
    lda table,x
    lbra later
inst Pair <later, table>
table fcb 1,2
later rts
"#;

    let (assembly, _) = assemble_ok(src);
    assert_eq!(
        assembly.rom.bytes(),
        &[
            0x7E, 0x00, 0x0F, // jmp later
            0xA6, 0x89, 0x00, 0x0D, // lda table,x keeps its reserved 16-bit offset
            0x16, 0x00, 0x05, // lbra later
            0x0F, 0x00, 0x0D, // inst
            0x01, 0x02, 0x39,
        ]
    );

    let mut checked = 0;
    for line in &assembly.lines {
        let (Some(opcode), Some(address)) = (line.opcode_text(), line.address) else {
            continue;
        };
        let again = if let Some(op) = assembly.cpu.find_opcode(opcode) {
            let ctx = EncodeCtx {
                symbols: &assembly.symbols,
                address,
                dp: 0,
                reserved_length: line.length,
            };
            assembly
                .cpu
                .encode(op, line.operand_text(), &ctx)
                .map(|encoding| encoding.bytes)
                .unwrap_or_else(|err| panic!("re-encoding `{line}` failed: {err}"))
        } else if let Some((_, def)) = assembly.symbols.struct_by_name(opcode) {
            let mut out = Vec::new();
            encode_instance(
                &def.byte_lengths,
                line.operand_text(),
                |text| evaluate(&assembly.symbols, address, text),
                &mut out,
                &mut Vec::new(),
            )
            .unwrap_or_else(|err| panic!("re-encoding `{line}` failed: {err:?}"));
            out
        } else {
            continue;
        };
        assert_eq!(again, line.data, "re-encoding `{line}` changed its bytes");
        checked += 1;
    }
    assert_eq!(checked, 5);
}
