use std::fs;

use asm6x09_core::{
    AssembleOptions, Assembly, compile_source_text,
    diag::has_errors,
    rom::{RomError, RomImage, load_reference, split, verify},
};
use tempfile::tempdir;

const BOARD: &str = r#"
    .cpu 6809
    .rom low.bin 4 12dada1fff4d4787ade3333147202c3b443e376f 0
    .rom high.bin 4 85d9651d9a399a67e015d047fd9e6a941e6b20bb 4
    .org 0
    fcb 1,2,3,4
    fcb 5,6,7,8
"#;

fn assemble_board() -> Assembly {
    let (assembly, diags) = compile_source_text(BOARD, &AssembleOptions::default());
    assert!(!has_errors(&diags), "diagnostics: {diags:#?}");
    assembly.expect("no assembly despite a clean run")
}

#[test]
fn splits_the_image_per_chip() {
    let assembly = assemble_board();
    let dir = tempdir().expect("tempdir");

    let written = split(&assembly.rom, &assembly.roms, dir.path()).expect("split failed");
    assert_eq!(
        written,
        vec![dir.path().join("low.bin.out"), dir.path().join("high.bin.out")]
    );
    assert_eq!(fs::read(&written[0]).expect("read low"), vec![1, 2, 3, 4]);
    assert_eq!(fs::read(&written[1]).expect("read high"), vec![5, 6, 7, 8]);
}

#[test]
fn verifies_against_reference_dumps() {
    let assembly = assemble_board();
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("low.bin"), [1u8, 2, 3, 4]).expect("write low");
    fs::write(dir.path().join("high.bin"), [5u8, 6, 7, 8]).expect("write high");

    let reference = load_reference(dir.path(), &assembly.roms).expect("load failed");
    let result = verify(&assembly.rom, &assembly.lines, &reference, 20);
    assert!(result.is_clean(), "diagnostics: {:#?}", result.diags);

    let reference = RomImage::from_bytes(vec![1, 2, 3, 4, 5, 6, 0, 8]);
    let result = verify(&assembly.rom, &assembly.lines, &reference, 20);
    assert_eq!(result.line_mismatches, 1);
    assert!(!result.image_matches);
    assert!(
        result.diags[0]
            .message
            .starts_with("Data mismatch at address 0x0006"),
        "diagnostics: {:#?}",
        result.diags
    );
}

#[test]
fn rejects_dumps_with_the_wrong_checksum() {
    let assembly = assemble_board();
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("low.bin"), [1u8, 2, 3, 4]).expect("write low");
    fs::write(dir.path().join("high.bin"), [5u8, 6, 0, 8]).expect("write high");

    let err = load_reference(dir.path(), &assembly.roms).expect_err("bad dump accepted");
    match &err {
        RomError::ChecksumMismatch {
            filename,
            expected,
            actual,
        } => {
            assert_eq!(filename, "high.bin");
            assert_eq!(expected, "85D9651D9A399A67E015D047FD9E6A941E6B20BB");
            assert_eq!(actual, "AE33131141F78D116B6F617A0F016D368AD098F6");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("File high.bin SHA-1 of AE33"));
}

#[test]
fn rejects_missing_and_short_dumps() {
    let assembly = assemble_board();
    let dir = tempdir().expect("tempdir");

    let err = load_reference(dir.path(), &assembly.roms).expect_err("missing file accepted");
    assert!(matches!(err, RomError::Read { .. }));

    fs::write(dir.path().join("low.bin"), [1u8, 2]).expect("write low");
    let err = load_reference(dir.path(), &assembly.roms).expect_err("short file accepted");
    assert!(matches!(
        err,
        RomError::SizeMismatch {
            expected: 4,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn split_rejects_chips_beyond_the_image() {
    let (assembly, diags) = compile_source_text(
        " .rom big.bin 16 00 0\n fcb 1\n",
        &AssembleOptions::default(),
    );
    assert!(!has_errors(&diags), "diagnostics: {diags:#?}");
    let assembly = assembly.expect("no assembly");
    let dir = tempdir().expect("tempdir");

    let err = split(&assembly.rom, &assembly.roms, dir.path()).expect_err("accepted");
    assert!(matches!(err, RomError::OutOfRange { .. }));
}
