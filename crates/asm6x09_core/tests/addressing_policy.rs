use asm6x09_core::{
    AssembleOptions, compile_source_text,
    diag::{Severity, has_errors},
};

fn bytes_of(src: &str) -> Vec<u8> {
    let (assembly, diags) = compile_source_text(src, &AssembleOptions::default());
    assert!(!has_errors(&diags), "diagnostics: {diags:#?}");
    assembly
        .map(|assembly| assembly.rom.bytes().to_vec())
        .unwrap_or_default()
}

#[test]
fn plain_small_operand_stays_extended() {
    assert_eq!(bytes_of(" lda $20\n"), vec![0xB6, 0x00, 0x20]);
}

#[test]
fn lowbyte_marker_forces_direct_page() {
    assert_eq!(bytes_of(" lda <$20\n"), vec![0x96, 0x20]);
}

#[test]
fn highbyte_marker_forces_extended() {
    assert_eq!(bytes_of(" jmp >$0010\n"), vec![0x7E, 0x00, 0x10]);
}

#[test]
fn direct_access_outside_the_page_warns() {
    let src = " .setdp $20\n lda <$3010\n";
    let (assembly, diags) = compile_source_text(src, &AssembleOptions::default());
    assert!(!has_errors(&diags), "diagnostics: {diags:#?}");
    assert!(
        diags.iter().any(|diag| diag.severity == Severity::Warning
            && diag.message.contains("outside direct page $20")),
        "diagnostics: {diags:#?}"
    );
    assert_eq!(
        assembly.map(|assembly| assembly.rom.bytes().to_vec()),
        Some(vec![0x96, 0x10])
    );

    let quiet = " .setdp $30\n lda <$3010\n";
    let (_, diags) = compile_source_text(quiet, &AssembleOptions::default());
    assert!(diags.iter().all(|diag| diag.severity != Severity::Warning));
}

#[test]
fn missing_mode_is_an_error() {
    let (assembly, diags) = compile_source_text(" sta #$12\n", &AssembleOptions::default());
    assert!(assembly.is_none());
    assert!(
        diags
            .iter()
            .any(|diag| diag.severity == Severity::Error
                && diag.message.contains("Illegal operand mode")),
        "diagnostics: {diags:#?}"
    );
}

#[test]
fn indexed_forms_cover_registers_and_indirection() {
    let src = r#"
    lda ,x+
    ldb ,--y
    ldd [,s]
    leax d,u
    jmp [$1234]
"#;
    assert_eq!(
        bytes_of(src),
        vec![
            0xA6, 0x80, // ,x+
            0xE6, 0xA3, // ,--y
            0xEC, 0xF4, // [,s]
            0x30, 0xCB, // d,u
            0x6E, 0x9F, 0x12, 0x34, // [$1234]
        ]
    );
}
