/// Java bytecode instruction opcodes
///
/// The subset the patcher emits, measures or validates, defined according
/// to the Java Virtual Machine Specification and ordered by opcode value.

// 0x00 - 0x0F: Constants
pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ICONST_2: u8 = 0x05;
pub const ICONST_3: u8 = 0x06;
pub const ICONST_4: u8 = 0x07;
pub const ICONST_5: u8 = 0x08;

// 0x10 - 0x14: Extended constants
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;

// 0x15 - 0x2D: Loads
pub const ILOAD: u8 = 0x15;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1a;
pub const ILOAD_1: u8 = 0x1b;
pub const ALOAD_0: u8 = 0x2a;
pub const ALOAD_1: u8 = 0x2b;

// 0x36 - 0x4E: Stores
pub const ISTORE: u8 = 0x36;
pub const ASTORE: u8 = 0x3a;
pub const ISTORE_1: u8 = 0x3c;
pub const ISTORE_2: u8 = 0x3d;
pub const ASTORE_1: u8 = 0x4c;
pub const ASTORE_2: u8 = 0x4d;

// 0x57 - 0x58: Stack
pub const POP: u8 = 0x57;
pub const DUP: u8 = 0x59;

// 0x84: Increment
pub const IINC: u8 = 0x84;

// 0x99 - 0xA8: Branches
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IFLT: u8 = 0x9b;
pub const IFGE: u8 = 0x9c;
pub const IFGT: u8 = 0x9d;
pub const IFLE: u8 = 0x9e;
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ICMPNE: u8 = 0xa0;
pub const IF_ICMPLT: u8 = 0xa1;
pub const IF_ICMPGE: u8 = 0xa2;
pub const IF_ICMPGT: u8 = 0xa3;
pub const IF_ICMPLE: u8 = 0xa4;
pub const IF_ACMPEQ: u8 = 0xa5;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;

// 0xAA - 0xB1: Switches and returns
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const LRETURN: u8 = 0xad;
pub const FRETURN: u8 = 0xae;
pub const DRETURN: u8 = 0xaf;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;

// 0xB2 - 0xBD: Field access, invocation, allocation
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;

// 0xBF - 0xC9: Exceptions, casts, wide forms
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;

/// Byte length of the instruction starting at `pc`, including operands and
/// any switch alignment padding. Truncated variable-length instructions
/// consume the rest of the code array.
pub fn instruction_length(op: u8, code: &[u8], pc: usize) -> usize {
    match op {
        BIPUSH => 2,
        SIPUSH => 3,
        LDC => 2,
        LDC_W | LDC2_W => 3,
        0x15..=0x19 => 2, // iload..aload
        0x36..=0x3a => 2, // istore..astore
        IINC => 3,
        0x99..=JSR | IFNULL | IFNONNULL => 3, // if*, goto, jsr
        RET => 2,
        GOTO_W | JSR_W => 5,
        GETSTATIC..=PUTFIELD => 3,
        INVOKEVIRTUAL..=INVOKESTATIC => 3,
        INVOKEINTERFACE => 5,
        INVOKEDYNAMIC => 5,
        NEW => 3,
        NEWARRAY => 2,
        ANEWARRAY => 3,
        MULTIANEWARRAY => 4,
        CHECKCAST | INSTANCEOF => 3,
        TABLESWITCH => {
            // 0xaa [pad] default:4 low:4 high:4 offsets:4*(high-low+1)
            let pad = switch_pad(pc);
            let idx = pc + 1 + pad;
            if idx + 12 > code.len() {
                return code.len() - pc;
            }
            let low = read_i32(code, idx + 4);
            let high = read_i32(code, idx + 8);
            let count = if high >= low { (high as i64 - low as i64 + 1) as usize } else { 0 };
            (1 + pad + 12).saturating_add(count.saturating_mul(4))
        }
        LOOKUPSWITCH => {
            // 0xab [pad] default:4 npairs:4 (match:4 offset:4)*npairs
            let pad = switch_pad(pc);
            let idx = pc + 1 + pad;
            if idx + 8 > code.len() {
                return code.len() - pc;
            }
            let npairs = read_i32(code, idx + 4).max(0) as usize;
            (1 + pad + 8).saturating_add(npairs.saturating_mul(8))
        }
        WIDE => {
            if pc + 1 < code.len() {
                if code[pc + 1] == IINC { 6 } else { 4 }
            } else {
                1
            }
        }
        _ => 1,
    }
}

/// Alignment padding between a switch opcode at `pc` and its first operand.
pub fn switch_pad(pc: usize) -> usize {
    (4 - ((pc + 1) % 4)) % 4
}

pub(crate) fn read_i32(code: &[u8], idx: usize) -> i32 {
    i32::from_be_bytes([
        *code.get(idx).unwrap_or(&0),
        *code.get(idx + 1).unwrap_or(&0),
        *code.get(idx + 2).unwrap_or(&0),
        *code.get(idx + 3).unwrap_or(&0),
    ])
}
