//! 6800 opcode map. Indexed forms take a single unsigned offset byte.

use super::{Form, OpClass, Opcode};

const __: Option<Form> = None;

const fn f(opcode: u8, length: u8) -> Option<Form> {
    Some(Form::new(None, opcode, length, false))
}

const fn acc(mnemonic: &'static str, base: u8) -> Opcode {
    Opcode::new(
        mnemonic,
        f(base, 2),
        f(base + 0x10, 2),
        f(base + 0x20, 2),
        f(base + 0x30, 3),
        __,
    )
}

const fn store(mnemonic: &'static str, direct: u8) -> Opcode {
    Opcode::new(
        mnemonic,
        __,
        f(direct, 2),
        f(direct + 0x10, 2),
        f(direct + 0x20, 3),
        __,
    )
}

const fn word(mnemonic: &'static str, immediate: u8) -> Opcode {
    Opcode::new(
        mnemonic,
        f(immediate, 3),
        f(immediate + 0x10, 2),
        f(immediate + 0x20, 2),
        f(immediate + 0x30, 3),
        __,
    )
}

const fn mem(mnemonic: &'static str, indexed: u8) -> Opcode {
    Opcode::new(mnemonic, __, __, f(indexed, 2), f(indexed + 0x10, 3), __)
}

const fn inh(mnemonic: &'static str, opcode: u8) -> Opcode {
    Opcode::new(mnemonic, __, __, __, __, f(opcode, 1))
}

const fn branch(mnemonic: &'static str, opcode: u8) -> Opcode {
    Opcode::new(mnemonic, f(opcode, 2), __, __, __, __).with_class(OpClass::Branch)
}

pub(super) fn alias(mnemonic: &str) -> Option<&'static str> {
    Some(match mnemonic {
        "lsl" => "asl",
        "lsla" => "asla",
        "lslb" => "aslb",
        "bhs" => "bcc",
        "blo" => "bcs",
        _ => return None,
    })
}

pub(super) static OPCODES: &[Opcode] = &[
    inh("aba", 0x1B),
    acc("adca", 0x89),
    acc("adcb", 0xC9),
    acc("adda", 0x8B),
    acc("addb", 0xCB),
    acc("anda", 0x84),
    acc("andb", 0xC4),
    mem("asl", 0x68),
    inh("asla", 0x48),
    inh("aslb", 0x58),
    mem("asr", 0x67),
    inh("asra", 0x47),
    inh("asrb", 0x57),
    branch("bcc", 0x24),
    branch("bcs", 0x25),
    branch("beq", 0x27),
    branch("bge", 0x2C),
    branch("bgt", 0x2E),
    branch("bhi", 0x22),
    acc("bita", 0x85),
    acc("bitb", 0xC5),
    branch("ble", 0x2F),
    branch("bls", 0x23),
    branch("blt", 0x2D),
    branch("bmi", 0x2B),
    branch("bne", 0x26),
    branch("bpl", 0x2A),
    branch("bra", 0x20),
    branch("bsr", 0x8D),
    branch("bvc", 0x28),
    branch("bvs", 0x29),
    inh("cba", 0x11),
    inh("clc", 0x0C),
    inh("cli", 0x0E),
    mem("clr", 0x6F),
    inh("clra", 0x4F),
    inh("clrb", 0x5F),
    inh("clv", 0x0A),
    acc("cmpa", 0x81),
    acc("cmpb", 0xC1),
    mem("com", 0x63),
    inh("coma", 0x43),
    inh("comb", 0x53),
    word("cpx", 0x8C),
    inh("daa", 0x19),
    mem("dec", 0x6A),
    inh("deca", 0x4A),
    inh("decb", 0x5A),
    inh("des", 0x34),
    inh("dex", 0x09),
    acc("eora", 0x88),
    acc("eorb", 0xC8),
    mem("inc", 0x6C),
    inh("inca", 0x4C),
    inh("incb", 0x5C),
    inh("ins", 0x31),
    inh("inx", 0x08),
    mem("jmp", 0x6E),
    Opcode::new("jsr", __, __, f(0xAD, 2), f(0xBD, 3), __),
    acc("ldaa", 0x86),
    acc("ldab", 0xC6),
    word("lds", 0x8E),
    word("ldx", 0xCE),
    mem("lsr", 0x64),
    inh("lsra", 0x44),
    inh("lsrb", 0x54),
    mem("neg", 0x60),
    inh("nega", 0x40),
    inh("negb", 0x50),
    inh("nop", 0x01),
    acc("oraa", 0x8A),
    acc("orab", 0xCA),
    inh("psha", 0x36),
    inh("pshb", 0x37),
    inh("pula", 0x32),
    inh("pulb", 0x33),
    mem("rol", 0x69),
    inh("rola", 0x49),
    inh("rolb", 0x59),
    mem("ror", 0x66),
    inh("rora", 0x46),
    inh("rorb", 0x56),
    inh("rti", 0x3B),
    inh("rts", 0x39),
    inh("sba", 0x10),
    acc("sbca", 0x82),
    acc("sbcb", 0xC2),
    inh("sec", 0x0D),
    inh("sei", 0x0F),
    inh("sev", 0x0B),
    store("staa", 0x97),
    store("stab", 0xD7),
    store("sts", 0x9F),
    store("stx", 0xDF),
    acc("suba", 0x80),
    acc("subb", 0xC0),
    inh("swi", 0x3F),
    inh("tab", 0x16),
    inh("tap", 0x06),
    inh("tba", 0x17),
    inh("tpa", 0x07),
    mem("tst", 0x6D),
    inh("tsta", 0x4D),
    inh("tstb", 0x5D),
    inh("tsx", 0x30),
    inh("txs", 0x35),
    inh("wai", 0x3E),
];
