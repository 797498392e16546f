//! Structural verification for patched methods
//!
//! Runs after a `Code` attribute was rewritten and before the class is
//! serialized. This is not the JVM verifier; it checks the structural
//! facts a patch can break: instruction decode, branch targets, exception
//! ranges and stack map frame offsets.

use crate::classfile::attribute::CodeAttribute;
use crate::classfile::class::ClassFile;
use crate::classfile::constpool::Constant;
use crate::classfile::defs::MAX_CODE_LENGTH;
use crate::classfile::frame::{StackMapFrame, StackMapTable, VerificationType};
use crate::classfile::opcodes;
use crate::classfile::reader::ReadError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Method index {0} out of range")]
    NoSuchMethod(usize),
    #[error("Invalid constant pool index {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("Invalid constant pool index type {0}")]
    InvalidConstantPoolIndexType(u16),
    #[error("Method has no Code attribute")]
    MissingCode,
    #[error("Code length {0} exceeds the 65535 byte limit")]
    CodeTooLong(usize),
    #[error("Code array must not be empty")]
    EmptyCode,
    #[error("Malformed {attribute} attribute: {source}")]
    MalformedAttribute {
        attribute: &'static str,
        #[source]
        source: ReadError,
    },
    #[error("Undecodable code: {0}")]
    Undecodable(&'static str),
    #[error("Branch at {at} targets offset {target} outside the code array")]
    BranchOutOfRange { at: usize, target: i64 },
    #[error("Branch at {at} lands inside the operands of the instruction at {target}")]
    BranchIntoOperand { at: usize, target: usize },
    #[error("Exception table entry {start}..{end} handler {handler} out of range for code length {len}")]
    ExceptionOutOfRange { start: u16, end: u16, handler: u16, len: usize },
    #[error("Stack map frame pc {pc} is not an instruction boundary within code length {len}")]
    FramePcOutOfRange { pc: u32, len: usize },
}

pub type Result<T> = std::result::Result<T, VerifyError>;

/// Verify one method of the given class, decoding its `Code` attribute
/// from the raw attribute payload.
pub fn verify_method(class_file: &ClassFile, method_index: usize) -> Result<()> {
    let method = class_file
        .methods
        .get(method_index)
        .ok_or(VerifyError::NoSuchMethod(method_index))?;
    require_utf8(class_file, method.name_index)?;
    require_utf8(class_file, method.descriptor_index)?;

    let code_index = method
        .code_attribute_index(&class_file.constant_pool)
        .ok_or(VerifyError::MissingCode)?;
    let code_attr = CodeAttribute::parse(&method.attributes[code_index].info)
        .map_err(|source| VerifyError::MalformedAttribute { attribute: "Code", source })?;

    if code_attr.code.is_empty() {
        return Err(VerifyError::EmptyCode);
    }
    if code_attr.code.len() > MAX_CODE_LENGTH {
        return Err(VerifyError::CodeTooLong(code_attr.code.len()));
    }

    let starts = collect_instruction_starts(&code_attr.code)?;
    verify_branches(&code_attr.code, &starts)?;
    verify_exception_table(class_file, &code_attr, &starts)?;
    verify_stack_map(class_file, &code_attr, &starts)?;
    Ok(())
}

fn require_utf8(class_file: &ClassFile, index: u16) -> Result<()> {
    match class_file.constant_pool.get(index) {
        Some(Constant::Utf8(_)) => Ok(()),
        None => Err(VerifyError::InvalidConstantPoolIndex(index)),
        _ => Err(VerifyError::InvalidConstantPoolIndexType(index)),
    }
}

/// Decode pass. Marks every instruction start so later passes can tell a
/// branch to an opcode from a branch into the middle of an operand.
fn collect_instruction_starts(code: &[u8]) -> Result<Vec<bool>> {
    let mut starts = vec![false; code.len()];
    let mut pc = 0usize;
    while pc < code.len() {
        starts[pc] = true;
        let length = opcodes::instruction_length(code[pc], code, pc);
        pc = pc.saturating_add(length);
    }
    if pc != code.len() {
        return Err(VerifyError::Undecodable("instruction overruns end of code"));
    }
    Ok(starts)
}

fn check_target(at: usize, target: i64, starts: &[bool]) -> Result<()> {
    if target < 0 || target >= starts.len() as i64 {
        return Err(VerifyError::BranchOutOfRange { at, target });
    }
    if !starts[target as usize] {
        return Err(VerifyError::BranchIntoOperand { at, target: target as usize });
    }
    Ok(())
}

fn verify_branches(code: &[u8], starts: &[bool]) -> Result<()> {
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        match op {
            opcodes::IFEQ..=opcodes::JSR | opcodes::IFNULL | opcodes::IFNONNULL => {
                let offset = i16::from_be_bytes([code[pc + 1], code[pc + 2]]) as i64;
                check_target(pc, pc as i64 + offset, starts)?;
            }
            opcodes::GOTO_W | opcodes::JSR_W => {
                let offset = opcodes::read_i32(code, pc + 1) as i64;
                check_target(pc, pc as i64 + offset, starts)?;
            }
            opcodes::TABLESWITCH => {
                let idx = pc + 1 + opcodes::switch_pad(pc);
                if idx + 12 > code.len() {
                    return Err(VerifyError::Undecodable("truncated tableswitch"));
                }
                check_target(pc, pc as i64 + opcodes::read_i32(code, idx) as i64, starts)?;
                let low = opcodes::read_i32(code, idx + 4) as i64;
                let high = opcodes::read_i32(code, idx + 8) as i64;
                if high >= low {
                    // Full operand extent was validated by the decode pass.
                    for case in 0..(high - low + 1) as usize {
                        let offset = opcodes::read_i32(code, idx + 12 + case * 4) as i64;
                        check_target(pc, pc as i64 + offset, starts)?;
                    }
                }
            }
            opcodes::LOOKUPSWITCH => {
                let idx = pc + 1 + opcodes::switch_pad(pc);
                if idx + 8 > code.len() {
                    return Err(VerifyError::Undecodable("truncated lookupswitch"));
                }
                check_target(pc, pc as i64 + opcodes::read_i32(code, idx) as i64, starts)?;
                let npairs = opcodes::read_i32(code, idx + 4).max(0) as usize;
                for pair in 0..npairs {
                    let offset = opcodes::read_i32(code, idx + 8 + pair * 8 + 4) as i64;
                    check_target(pc, pc as i64 + offset, starts)?;
                }
            }
            _ => {}
        }
        pc += opcodes::instruction_length(op, code, pc);
    }
    Ok(())
}

fn verify_exception_table(
    class_file: &ClassFile,
    code_attr: &CodeAttribute,
    starts: &[bool],
) -> Result<()> {
    let len = code_attr.code.len();
    for entry in &code_attr.exception_table {
        let start = entry.start_pc as usize;
        let end = entry.end_pc as usize;
        let handler = entry.handler_pc as usize;
        let range_ok = start < end
            && end <= len
            && starts[start]
            && (end == len || starts[end])
            && handler < len
            && starts[handler];
        if !range_ok {
            return Err(VerifyError::ExceptionOutOfRange {
                start: entry.start_pc,
                end: entry.end_pc,
                handler: entry.handler_pc,
                len,
            });
        }
        if entry.catch_type != 0 {
            match class_file.constant_pool.get(entry.catch_type) {
                Some(Constant::Class(_)) => {}
                None => return Err(VerifyError::InvalidConstantPoolIndex(entry.catch_type)),
                _ => return Err(VerifyError::InvalidConstantPoolIndexType(entry.catch_type)),
            }
        }
    }
    Ok(())
}

fn verify_stack_map(
    class_file: &ClassFile,
    code_attr: &CodeAttribute,
    starts: &[bool],
) -> Result<()> {
    let len = code_attr.code.len();
    for attribute in &code_attr.attributes {
        if class_file.constant_pool.utf8_at(attribute.name_index) != Some("StackMapTable") {
            continue;
        }
        let table = StackMapTable::parse(&attribute.info).map_err(|source| {
            VerifyError::MalformedAttribute { attribute: "StackMapTable", source }
        })?;
        // Frame offsets chain: first frame at delta, later ones at
        // previous + delta + 1.
        let mut absolute: Option<u32> = None;
        for frame in &table.frames {
            let delta = frame.offset_delta() as u32;
            let pc = match absolute {
                None => delta,
                Some(previous) => previous + delta + 1,
            };
            if pc as usize >= len || !starts[pc as usize] {
                return Err(VerifyError::FramePcOutOfRange { pc, len });
            }
            verify_frame_types(class_file, frame, &code_attr.code, starts)?;
            absolute = Some(pc);
        }
    }
    Ok(())
}

fn verify_frame_types(
    class_file: &ClassFile,
    frame: &StackMapFrame,
    code: &[u8],
    starts: &[bool],
) -> Result<()> {
    match frame {
        StackMapFrame::Same { .. } | StackMapFrame::Chop { .. } => Ok(()),
        StackMapFrame::SameLocals1 { stack, .. } => {
            verify_verification_type(class_file, stack, code, starts)
        }
        StackMapFrame::Append { locals, .. } => {
            for local in locals {
                verify_verification_type(class_file, local, code, starts)?;
            }
            Ok(())
        }
        StackMapFrame::Full { locals, stack, .. } => {
            for entry in locals.iter().chain(stack.iter()) {
                verify_verification_type(class_file, entry, code, starts)?;
            }
            Ok(())
        }
    }
}

fn verify_verification_type(
    class_file: &ClassFile,
    verification_type: &VerificationType,
    code: &[u8],
    starts: &[bool],
) -> Result<()> {
    match verification_type {
        VerificationType::Object(index) => match class_file.constant_pool.get(*index) {
            Some(Constant::Class(_)) => Ok(()),
            None => Err(VerifyError::InvalidConstantPoolIndex(*index)),
            _ => Err(VerifyError::InvalidConstantPoolIndexType(*index)),
        },
        // Must point at the `new` instruction that produced the value.
        VerificationType::Uninitialized(offset) => {
            let at = *offset as usize;
            if at >= code.len() || !starts[at] || code[at] != opcodes::NEW {
                return Err(VerifyError::FramePcOutOfRange {
                    pc: *offset as u32,
                    len: code.len(),
                });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
