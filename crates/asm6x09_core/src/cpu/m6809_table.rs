//! 6809 opcode map with the HD6309 extensions flagged per row.
//!
//! Columns are immediate, direct, indexed, extended and inherent. Page 2 rows
//! carry the `$10` prefix and page 3 rows carry `$11`; indexed lengths are the
//! minimum before the post-byte extension.

use super::{Form, OpClass, Opcode};

const __: Option<Form> = None;
const PAGE2: Option<u8> = Some(0x10);
const PAGE3: Option<u8> = Some(0x11);

const fn b(opcode: u8, length: u8) -> Option<Form> {
    Some(Form::new(None, opcode, length, false))
}

const fn p(opcode: u8, length: u8) -> Option<Form> {
    Some(Form::new(PAGE2, opcode, length, false))
}

const fn q(opcode: u8, length: u8) -> Option<Form> {
    Some(Form::new(PAGE3, opcode, length, false))
}

const fn bx(opcode: u8, length: u8) -> Option<Form> {
    Some(Form::new(None, opcode, length, true))
}

const fn px(opcode: u8, length: u8) -> Option<Form> {
    Some(Form::new(PAGE2, opcode, length, true))
}

const fn qx(opcode: u8, length: u8) -> Option<Form> {
    Some(Form::new(PAGE3, opcode, length, true))
}

const fn row(
    mnemonic: &'static str,
    immediate: Option<Form>,
    direct: Option<Form>,
    indexed: Option<Form>,
    extended: Option<Form>,
    inherent: Option<Form>,
) -> Opcode {
    Opcode::new(mnemonic, immediate, direct, indexed, extended, inherent)
}

const fn inh(mnemonic: &'static str, form: Option<Form>) -> Opcode {
    Opcode::new(mnemonic, __, __, __, __, form)
}

const fn mem(mnemonic: &'static str, direct: u8, indexed: u8, extended: u8) -> Opcode {
    Opcode::new(mnemonic, __, b(direct, 2), bx(indexed, 2), b(extended, 3), __)
}

const fn branch(mnemonic: &'static str, opcode: u8) -> Opcode {
    Opcode::new(mnemonic, b(opcode, 2), __, __, __, __).with_class(OpClass::Branch)
}

const fn long_branch(mnemonic: &'static str, form: Option<Form>) -> Opcode {
    Opcode::new(mnemonic, form, __, __, __, __).with_class(OpClass::LongBranch)
}

const fn register_pair(mnemonic: &'static str, form: Option<Form>) -> Opcode {
    Opcode::new(mnemonic, form, __, __, __, __).with_class(OpClass::RegisterPair)
}

const fn bit_transfer(mnemonic: &'static str, opcode: u8) -> Opcode {
    Opcode::new(mnemonic, __, q(opcode, 4), __, __, __)
        .with_class(OpClass::BitTransfer)
        .only_6309()
}

const fn memory_immediate(mnemonic: &'static str, direct: u8, indexed: u8, extended: u8) -> Opcode {
    Opcode::new(mnemonic, __, b(direct, 3), bx(indexed, 3), b(extended, 4), __)
        .with_class(OpClass::MemoryImmediate)
        .only_6309()
}

/// Accepted spellings that map onto a canonical row.
pub(super) fn alias(mnemonic: &str) -> Option<&'static str> {
    Some(match mnemonic {
        "ldaa" => "lda",
        "ldab" => "ldb",
        "staa" => "sta",
        "stab" => "stb",
        "oraa" => "ora",
        "orab" => "orb",
        "lsl" => "asl",
        "lsla" => "asla",
        "lslb" => "aslb",
        "lsld" => "asld",
        _ => return None,
    })
}

pub(super) static OPCODES: &[Opcode] = &[
    inh("abx", b(0x3A, 1)),
    row("adca", b(0x89, 2), b(0x99, 2), bx(0xA9, 2), b(0xB9, 3), __),
    row("adcb", b(0xC9, 2), b(0xD9, 2), bx(0xE9, 2), b(0xF9, 3), __),
    row("adcd", p(0x89, 4), p(0x99, 3), px(0xA9, 3), p(0xB9, 4), __).only_6309(),
    register_pair("adcr", p(0x31, 3)).only_6309(),
    row("adda", b(0x8B, 2), b(0x9B, 2), bx(0xAB, 2), b(0xBB, 3), __),
    row("addb", b(0xCB, 2), b(0xDB, 2), bx(0xEB, 2), b(0xFB, 3), __),
    row("addd", b(0xC3, 3), b(0xD3, 2), bx(0xE3, 2), b(0xF3, 3), __),
    row("adde", q(0x8B, 3), q(0x9B, 3), qx(0xAB, 3), q(0xBB, 4), __).only_6309(),
    row("addf", q(0xCB, 3), q(0xDB, 3), qx(0xEB, 3), q(0xFB, 4), __).only_6309(),
    register_pair("addr", p(0x30, 3)).only_6309(),
    row("addw", p(0x8B, 4), p(0x9B, 3), px(0xAB, 3), p(0xBB, 4), __).only_6309(),
    memory_immediate("aim", 0x02, 0x62, 0x72),
    row("anda", b(0x84, 2), b(0x94, 2), bx(0xA4, 2), b(0xB4, 3), __),
    row("andb", b(0xC4, 2), b(0xD4, 2), bx(0xE4, 2), b(0xF4, 3), __),
    row("andcc", b(0x1C, 2), __, __, __, __),
    row("andd", p(0x84, 4), p(0x94, 3), px(0xA4, 3), p(0xB4, 4), __).only_6309(),
    register_pair("andr", p(0x34, 3)).only_6309(),
    mem("asl", 0x08, 0x68, 0x78),
    inh("asla", b(0x48, 1)),
    inh("aslb", b(0x58, 1)),
    inh("asld", p(0x48, 2)).only_6309(),
    mem("asr", 0x07, 0x67, 0x77),
    inh("asra", b(0x47, 1)),
    inh("asrb", b(0x57, 1)),
    inh("asrd", p(0x47, 2)).only_6309(),
    bit_transfer("band", 0x30),
    branch("bcc", 0x24),
    branch("bcs", 0x25),
    bit_transfer("beor", 0x34),
    branch("beq", 0x27),
    branch("bge", 0x2C),
    branch("bgt", 0x2E),
    branch("bhi", 0x22),
    branch("bhs", 0x24),
    bit_transfer("biand", 0x31),
    bit_transfer("bieor", 0x35),
    bit_transfer("bior", 0x33),
    row("bita", b(0x85, 2), b(0x95, 2), bx(0xA5, 2), b(0xB5, 3), __),
    row("bitb", b(0xC5, 2), b(0xD5, 2), bx(0xE5, 2), b(0xF5, 3), __),
    row("bitd", p(0x85, 4), p(0x95, 3), px(0xA5, 3), p(0xB5, 4), __).only_6309(),
    row("bitmd", q(0x3C, 3), __, __, __, __).only_6309(),
    branch("ble", 0x2F),
    branch("blo", 0x25),
    branch("bls", 0x23),
    branch("blt", 0x2D),
    branch("bmi", 0x2B),
    branch("bne", 0x26),
    bit_transfer("bor", 0x32),
    branch("bpl", 0x2A),
    branch("bra", 0x20),
    branch("brn", 0x21),
    branch("bsr", 0x8D),
    branch("bvc", 0x28),
    branch("bvs", 0x29),
    mem("clr", 0x0F, 0x6F, 0x7F),
    inh("clra", b(0x4F, 1)),
    inh("clrb", b(0x5F, 1)),
    inh("clrd", p(0x4F, 2)).only_6309(),
    inh("clre", q(0x4F, 2)).only_6309(),
    inh("clrf", q(0x5F, 2)).only_6309(),
    inh("clrw", p(0x5F, 2)).only_6309(),
    row("cmpa", b(0x81, 2), b(0x91, 2), bx(0xA1, 2), b(0xB1, 3), __),
    row("cmpb", b(0xC1, 2), b(0xD1, 2), bx(0xE1, 2), b(0xF1, 3), __),
    row("cmpd", p(0x83, 4), p(0x93, 3), px(0xA3, 3), p(0xB3, 4), __),
    row("cmpe", q(0x81, 3), q(0x91, 3), qx(0xA1, 3), q(0xB1, 4), __).only_6309(),
    row("cmpf", q(0xC1, 3), q(0xD1, 3), qx(0xE1, 3), q(0xF1, 4), __).only_6309(),
    register_pair("cmpr", p(0x37, 3)).only_6309(),
    row("cmps", q(0x8C, 4), q(0x9C, 3), qx(0xAC, 3), q(0xBC, 4), __),
    row("cmpu", q(0x83, 4), q(0x93, 3), qx(0xA3, 3), q(0xB3, 4), __),
    row("cmpw", p(0x81, 4), p(0x91, 3), px(0xA1, 3), p(0xB1, 4), __).only_6309(),
    row("cmpx", b(0x8C, 3), b(0x9C, 2), bx(0xAC, 2), b(0xBC, 3), __),
    row("cmpy", p(0x8C, 4), p(0x9C, 3), px(0xAC, 3), p(0xBC, 4), __),
    mem("com", 0x03, 0x63, 0x73),
    inh("coma", b(0x43, 1)),
    inh("comb", b(0x53, 1)),
    inh("comd", p(0x43, 2)).only_6309(),
    inh("come", q(0x43, 2)).only_6309(),
    inh("comf", q(0x53, 2)).only_6309(),
    inh("comw", p(0x53, 2)).only_6309(),
    row("cwai", b(0x3C, 2), __, __, __, __),
    inh("daa", b(0x19, 1)),
    mem("dec", 0x0A, 0x6A, 0x7A),
    inh("deca", b(0x4A, 1)),
    inh("decb", b(0x5A, 1)),
    inh("decd", p(0x4A, 2)).only_6309(),
    inh("dece", q(0x4A, 2)).only_6309(),
    inh("decf", q(0x5A, 2)).only_6309(),
    inh("decw", p(0x5A, 2)).only_6309(),
    row("divd", q(0x8D, 3), q(0x9D, 3), qx(0xAD, 3), q(0xBD, 4), __).only_6309(),
    row("divq", q(0x8E, 4), q(0x9E, 3), qx(0xAE, 3), q(0xBE, 4), __).only_6309(),
    memory_immediate("eim", 0x05, 0x65, 0x75),
    row("eora", b(0x88, 2), b(0x98, 2), bx(0xA8, 2), b(0xB8, 3), __),
    row("eorb", b(0xC8, 2), b(0xD8, 2), bx(0xE8, 2), b(0xF8, 3), __),
    row("eord", p(0x88, 4), p(0x98, 3), px(0xA8, 3), p(0xB8, 4), __).only_6309(),
    register_pair("eorr", p(0x36, 3)).only_6309(),
    register_pair("exg", b(0x1E, 2)),
    mem("inc", 0x0C, 0x6C, 0x7C),
    inh("inca", b(0x4C, 1)),
    inh("incb", b(0x5C, 1)),
    inh("incd", p(0x4C, 2)).only_6309(),
    inh("ince", q(0x4C, 2)).only_6309(),
    inh("incf", q(0x5C, 2)).only_6309(),
    inh("incw", p(0x5C, 2)).only_6309(),
    row("jmp", __, b(0x0E, 2), bx(0x6E, 2), b(0x7E, 3), __),
    row("jsr", __, b(0x9D, 2), bx(0xAD, 2), b(0xBD, 3), __),
    long_branch("lbcc", p(0x24, 4)),
    long_branch("lbcs", p(0x25, 4)),
    long_branch("lbeq", p(0x27, 4)),
    long_branch("lbge", p(0x2C, 4)),
    long_branch("lbgt", p(0x2E, 4)),
    long_branch("lbhi", p(0x22, 4)),
    long_branch("lbhs", p(0x24, 4)),
    long_branch("lble", p(0x2F, 4)),
    long_branch("lblo", p(0x25, 4)),
    long_branch("lbls", p(0x23, 4)),
    long_branch("lblt", p(0x2D, 4)),
    long_branch("lbmi", p(0x2B, 4)),
    long_branch("lbne", p(0x26, 4)),
    long_branch("lbpl", p(0x2A, 4)),
    long_branch("lbra", b(0x16, 3)),
    long_branch("lbrn", p(0x21, 4)),
    long_branch("lbsr", b(0x17, 3)),
    long_branch("lbvc", p(0x28, 4)),
    long_branch("lbvs", p(0x29, 4)),
    row("lda", b(0x86, 2), b(0x96, 2), bx(0xA6, 2), b(0xB6, 3), __),
    row("ldb", b(0xC6, 2), b(0xD6, 2), bx(0xE6, 2), b(0xF6, 3), __),
    bit_transfer("ldbt", 0x36),
    row("ldd", b(0xCC, 3), b(0xDC, 2), bx(0xEC, 2), b(0xFC, 3), __),
    row("lde", q(0x86, 3), q(0x96, 3), qx(0xA6, 3), q(0xB6, 4), __).only_6309(),
    row("ldf", q(0xC6, 3), q(0xD6, 3), qx(0xE6, 3), q(0xF6, 4), __).only_6309(),
    row("ldmd", q(0x3D, 3), __, __, __, __).only_6309(),
    row("ldq", b(0xCD, 5), p(0xDC, 3), px(0xEC, 3), p(0xFC, 4), __).only_6309(),
    row("lds", p(0xCE, 4), p(0xDE, 3), px(0xEE, 3), p(0xFE, 4), __),
    row("ldu", b(0xCE, 3), b(0xDE, 2), bx(0xEE, 2), b(0xFE, 3), __),
    row("ldw", p(0x86, 4), p(0x96, 3), px(0xA6, 3), p(0xB6, 4), __).only_6309(),
    row("ldx", b(0x8E, 3), b(0x9E, 2), bx(0xAE, 2), b(0xBE, 3), __),
    row("ldy", p(0x8E, 4), p(0x9E, 3), px(0xAE, 3), p(0xBE, 4), __),
    row("leas", __, __, bx(0x32, 2), __, __),
    row("leau", __, __, bx(0x33, 2), __, __),
    row("leax", __, __, bx(0x30, 2), __, __),
    row("leay", __, __, bx(0x31, 2), __, __),
    mem("lsr", 0x04, 0x64, 0x74),
    inh("lsra", b(0x44, 1)),
    inh("lsrb", b(0x54, 1)),
    inh("lsrd", p(0x44, 2)).only_6309(),
    inh("lsrw", p(0x54, 2)).only_6309(),
    inh("mul", b(0x3D, 1)),
    row("muld", q(0x8F, 4), q(0x9F, 3), qx(0xAF, 3), q(0xBF, 4), __).only_6309(),
    mem("neg", 0x00, 0x60, 0x70),
    inh("nega", b(0x40, 1)),
    inh("negb", b(0x50, 1)),
    inh("negd", p(0x40, 2)).only_6309(),
    inh("nop", b(0x12, 1)),
    memory_immediate("oim", 0x01, 0x61, 0x71),
    row("ora", b(0x8A, 2), b(0x9A, 2), bx(0xAA, 2), b(0xBA, 3), __),
    row("orb", b(0xCA, 2), b(0xDA, 2), bx(0xEA, 2), b(0xFA, 3), __),
    row("orcc", b(0x1A, 2), __, __, __, __),
    row("ord", p(0x8A, 4), p(0x9A, 3), px(0xAA, 3), p(0xBA, 4), __).only_6309(),
    register_pair("orr", p(0x35, 3)).only_6309(),
    row("pshs", b(0x34, 2), __, __, __, __).with_class(OpClass::Stack { system: true }),
    inh("pshsw", p(0x38, 2)).only_6309(),
    row("pshu", b(0x36, 2), __, __, __, __).with_class(OpClass::Stack { system: false }),
    inh("pshuw", p(0x3A, 2)).only_6309(),
    row("puls", b(0x35, 2), __, __, __, __).with_class(OpClass::Stack { system: true }),
    inh("pulsw", p(0x39, 2)).only_6309(),
    row("pulu", b(0x37, 2), __, __, __, __).with_class(OpClass::Stack { system: false }),
    inh("puluw", p(0x3B, 2)).only_6309(),
    mem("rol", 0x09, 0x69, 0x79),
    inh("rola", b(0x49, 1)),
    inh("rolb", b(0x59, 1)),
    inh("rold", p(0x49, 2)).only_6309(),
    inh("rolw", p(0x59, 2)).only_6309(),
    mem("ror", 0x06, 0x66, 0x76),
    inh("rora", b(0x46, 1)),
    inh("rorb", b(0x56, 1)),
    inh("rord", p(0x46, 2)).only_6309(),
    inh("rorw", p(0x56, 2)).only_6309(),
    inh("rti", b(0x3B, 1)),
    inh("rts", b(0x39, 1)),
    row("sbca", b(0x82, 2), b(0x92, 2), bx(0xA2, 2), b(0xB2, 3), __),
    row("sbcb", b(0xC2, 2), b(0xD2, 2), bx(0xE2, 2), b(0xF2, 3), __),
    row("sbcd", p(0x82, 4), p(0x92, 3), px(0xA2, 3), p(0xB2, 4), __).only_6309(),
    register_pair("sbcr", p(0x33, 3)).only_6309(),
    inh("sex", b(0x1D, 1)),
    inh("sexw", b(0x14, 1)).only_6309(),
    row("sta", __, b(0x97, 2), bx(0xA7, 2), b(0xB7, 3), __),
    row("stb", __, b(0xD7, 2), bx(0xE7, 2), b(0xF7, 3), __),
    bit_transfer("stbt", 0x37),
    row("std", __, b(0xDD, 2), bx(0xED, 2), b(0xFD, 3), __),
    row("ste", __, q(0x97, 3), qx(0xA7, 3), q(0xB7, 4), __).only_6309(),
    row("stf", __, q(0xD7, 3), qx(0xE7, 3), q(0xF7, 4), __).only_6309(),
    row("stq", __, p(0xDD, 3), px(0xED, 3), p(0xFD, 4), __).only_6309(),
    row("sts", __, p(0xDF, 3), px(0xEF, 3), p(0xFF, 4), __),
    row("stu", __, b(0xDF, 2), bx(0xEF, 2), b(0xFF, 3), __),
    row("stw", __, p(0x97, 3), px(0xA7, 3), p(0xB7, 4), __).only_6309(),
    row("stx", __, b(0x9F, 2), bx(0xAF, 2), b(0xBF, 3), __),
    row("sty", __, p(0x9F, 3), px(0xAF, 3), p(0xBF, 4), __),
    row("suba", b(0x80, 2), b(0x90, 2), bx(0xA0, 2), b(0xB0, 3), __),
    row("subb", b(0xC0, 2), b(0xD0, 2), bx(0xE0, 2), b(0xF0, 3), __),
    row("subd", b(0x83, 3), b(0x93, 2), bx(0xA3, 2), b(0xB3, 3), __),
    row("sube", q(0x80, 3), q(0x90, 3), qx(0xA0, 3), q(0xB0, 4), __).only_6309(),
    row("subf", q(0xC0, 3), q(0xD0, 3), qx(0xE0, 3), q(0xF0, 4), __).only_6309(),
    register_pair("subr", p(0x32, 3)).only_6309(),
    row("subw", p(0x80, 4), p(0x90, 3), px(0xA0, 3), p(0xB0, 4), __).only_6309(),
    inh("swi", b(0x3F, 1)),
    inh("swi2", p(0x3F, 2)),
    inh("swi3", q(0x3F, 2)),
    inh("sync", b(0x13, 1)),
    register_pair("tfr", b(0x1F, 2)),
    row("tfm", q(0x38, 3), __, __, __, __)
        .with_class(OpClass::TransferMemory)
        .only_6309(),
    memory_immediate("tim", 0x0B, 0x6B, 0x7B),
    mem("tst", 0x0D, 0x6D, 0x7D),
    inh("tsta", b(0x4D, 1)),
    inh("tstb", b(0x5D, 1)),
    inh("tstd", p(0x4D, 2)).only_6309(),
    inh("tste", q(0x4D, 2)).only_6309(),
    inh("tstf", q(0x5D, 2)).only_6309(),
    inh("tstw", p(0x5D, 2)).only_6309(),
];
