//! Injection of the timeout prologue into a located `connect`
//!
//! The prologue is two independent guards, one per timeout:
//!
//! ```text
//! aload_0
//! invokevirtual getConnectTimeout()I
//! ifne  end_of_guard          ; non-zero means a caller already chose
//! aload_0
//! <push default millis>
//! invokevirtual setConnectTimeout(I)V
//! end_of_guard:
//! ```
//!
//! followed by the same shape for the read timeout, then `nop` padding
//! that rounds the prologue to a multiple of four bytes. Switch operand
//! padding is computed from each opcode's offset modulo four, so a
//! four-aligned prologue keeps every original `tableswitch` and
//! `lookupswitch` byte pattern valid without re-laying out the body.
//!
//! All original branches are pc-relative and survive prepending as-is.
//! The absolute offsets that do not survive live in the exception table,
//! `LineNumberTable`, the local variable tables and the `StackMapTable`;
//! each gets shifted here. A table pc that does not fit the original body
//! is rejected before any shift. Constant pool edits are append-only, so
//! every attribute that is not rewritten stays byte-identical.

use thiserror::Error;

use crate::classfile::attribute::{
    AttributeInfo, CodeAttribute, LineNumberTableAttribute, LocalVariableTableAttribute,
};
use crate::classfile::constpool::{ConstPoolError, ConstantPool};
use crate::classfile::defs::{MAX_CODE_LENGTH, STACK_MAP_MIN_MAJOR};
use crate::classfile::frame::{StackMapFrame, StackMapTable};
use crate::classfile::opcodes;
use crate::classfile::reader::ReadError;
use crate::classfile::verify::{verify_method, VerifyError};
use crate::classfile::ClassfileWritable;
use crate::engine::config::TimeoutDefaults;
use crate::engine::locator::MethodHandle;
use crate::engine::registry::{
    CONNECT_TIMEOUT_GETTER, CONNECT_TIMEOUT_SETTER, READ_TIMEOUT_GETTER, READ_TIMEOUT_SETTER,
    TARGET_METHOD, TIMEOUT_GETTER_DESCRIPTOR, TIMEOUT_SETTER_DESCRIPTOR,
};

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{class}: {method} has no Code attribute")]
    MissingCode { class: String, method: &'static str },

    #[error("{class}: patched {method} would be {len} bytes of code")]
    CodeTooLarge { class: String, method: &'static str, len: usize },

    #[error("{class}: {attribute} references pc {pc} beyond the {len} byte body")]
    PcOutOfRange { class: String, attribute: &'static str, pc: u32, len: usize },

    #[error("{class}: malformed {attribute} attribute")]
    Attribute {
        class: String,
        attribute: &'static str,
        #[source]
        source: ReadError,
    },

    #[error("{class}: constant pool exhausted")]
    Pool {
        class: String,
        #[source]
        source: ConstPoolError,
    },

    #[error("{class}: patched method failed verification")]
    Verify {
        class: String,
        #[source]
        source: VerifyError,
    },
}

struct Prologue {
    code: Vec<u8>,
    connect_guard_len: usize,
    read_guard_len: usize,
    pad: usize,
}

/// Patches the located `connect` and serializes the whole class.
///
/// The unit is detached from the pool before the first edit. Every exit
/// path from here on, success or error, therefore leaves the pool without
/// this unit; a later resolution of the same name starts from the sources
/// and never observes a half-applied or already-applied patch.
pub fn inject(handle: MethodHandle<'_>, defaults: TimeoutDefaults) -> Result<Vec<u8>, PatchError> {
    let method_index = handle.method_index();
    let mut unit = handle.lease.detach();
    let class_name = unit.class_name().unwrap_or_default().to_string();

    let code_index = unit.methods[method_index]
        .code_attribute_index(&unit.constant_pool)
        .ok_or_else(|| PatchError::MissingCode {
            class: class_name.clone(),
            method: TARGET_METHOD,
        })?;
    let mut code_attr = CodeAttribute::parse(&unit.methods[method_index].attributes[code_index].info)
        .map_err(|source| PatchError::Attribute {
            class: class_name.clone(),
            attribute: "Code",
            source,
        })?;

    let this_class = unit.this_class;
    let prologue = build_prologue(&mut unit.constant_pool, this_class, defaults)
        .map_err(|source| PatchError::Pool { class: class_name.clone(), source })?;
    let Prologue { code: prologue_code, connect_guard_len, read_guard_len, pad } = prologue;

    let shift = prologue_code.len();
    let original_len = code_attr.code.len();
    let new_len = original_len + shift;
    if new_len > MAX_CODE_LENGTH {
        return Err(PatchError::CodeTooLarge {
            class: class_name,
            method: TARGET_METHOD,
            len: new_len,
        });
    }
    let shift_u16 = shift as u16;

    let mut new_code = prologue_code;
    new_code.extend_from_slice(&code_attr.code);
    code_attr.code = new_code;

    // Each guard holds at most a receiver and an int.
    code_attr.max_stack = code_attr.max_stack.max(2);

    for entry in &code_attr.exception_table {
        for pc in [entry.start_pc, entry.end_pc, entry.handler_pc] {
            ensure_pc_in_body(pc as u32, original_len, "exception table", &class_name)?;
        }
    }
    for entry in &mut code_attr.exception_table {
        entry.start_pc = entry.start_pc.saturating_add(shift_u16);
        entry.end_pc = entry.end_pc.saturating_add(shift_u16);
        entry.handler_pc = entry.handler_pc.saturating_add(shift_u16);
    }

    let mut saw_stack_map = false;
    for attribute in &mut code_attr.attributes {
        match unit.constant_pool.utf8_at(attribute.name_index) {
            Some("LineNumberTable") => {
                let mut table =
                    LineNumberTableAttribute::parse(&attribute.info).map_err(|source| {
                        PatchError::Attribute {
                            class: class_name.clone(),
                            attribute: "LineNumberTable",
                            source,
                        }
                    })?;
                for entry in &table.entries {
                    ensure_pc_in_body(
                        entry.start_pc as u32,
                        original_len,
                        "LineNumberTable",
                        &class_name,
                    )?;
                }
                table.shift_pcs(shift_u16);
                attribute.info = table.to_bytes();
            }
            Some("LocalVariableTable") => {
                let mut table =
                    LocalVariableTableAttribute::parse(&attribute.info).map_err(|source| {
                        PatchError::Attribute {
                            class: class_name.clone(),
                            attribute: "LocalVariableTable",
                            source,
                        }
                    })?;
                for entry in &table.entries {
                    ensure_pc_in_body(
                        entry.start_pc as u32 + entry.length as u32,
                        original_len,
                        "LocalVariableTable",
                        &class_name,
                    )?;
                }
                table.shift_pcs(shift_u16);
                attribute.info = table.to_bytes();
            }
            Some("LocalVariableTypeTable") => {
                let mut table =
                    LocalVariableTableAttribute::parse(&attribute.info).map_err(|source| {
                        PatchError::Attribute {
                            class: class_name.clone(),
                            attribute: "LocalVariableTypeTable",
                            source,
                        }
                    })?;
                for entry in &table.entries {
                    ensure_pc_in_body(
                        entry.start_pc as u32 + entry.length as u32,
                        original_len,
                        "LocalVariableTypeTable",
                        &class_name,
                    )?;
                }
                table.shift_pcs(shift_u16);
                attribute.info = table.to_bytes();
            }
            Some("StackMapTable") => {
                saw_stack_map = true;
                let mut table = StackMapTable::parse(&attribute.info).map_err(|source| {
                    PatchError::Attribute {
                        class: class_name.clone(),
                        attribute: "StackMapTable",
                        source,
                    }
                })?;
                // The leading delta is the first frame's absolute pc and the
                // only one insert_guard_frames re-bases.
                if let Some(first) = table.frames.first() {
                    ensure_pc_in_body(
                        first.offset_delta() as u32,
                        original_len,
                        "StackMapTable",
                        &class_name,
                    )?;
                }
                if let Some(offset) = table.max_uninitialized_offset() {
                    ensure_pc_in_body(offset as u32, original_len, "StackMapTable", &class_name)?;
                }
                table.shift_uninitialized(shift_u16);
                insert_guard_frames(&mut table, connect_guard_len, read_guard_len, pad);
                attribute.info = table.to_bytes();
            }
            _ => {}
        }
    }

    // The guards introduce branch targets, and class files at version 50+
    // must describe every branch target with a stack map frame.
    if !saw_stack_map && unit.major_version >= STACK_MAP_MIN_MAJOR {
        let mut table = StackMapTable::new();
        insert_guard_frames(&mut table, connect_guard_len, read_guard_len, pad);
        let name_index = unit
            .constant_pool
            .add_utf8("StackMapTable")
            .map_err(|source| PatchError::Pool { class: class_name.clone(), source })?;
        code_attr
            .attributes
            .push(AttributeInfo::new(name_index, table.to_bytes()));
    }

    unit.methods[method_index].attributes[code_index].info = code_attr.to_bytes();

    verify_method(&unit, method_index)
        .map_err(|source| PatchError::Verify { class: class_name, source })?;

    Ok(unit.to_classfile_bytes())
}

/// Rejects table pcs that point outside the original body. A pc at or
/// below `original_len` stays within `u16` once shifted, because the
/// spliced length was already checked against `MAX_CODE_LENGTH`.
fn ensure_pc_in_body(
    pc: u32,
    original_len: usize,
    attribute: &'static str,
    class: &str,
) -> Result<(), PatchError> {
    if pc as usize > original_len {
        return Err(PatchError::PcOutOfRange {
            class: class.to_string(),
            attribute,
            pc,
            len: original_len,
        });
    }
    Ok(())
}

fn build_prologue(
    pool: &mut ConstantPool,
    this_class: u16,
    defaults: TimeoutDefaults,
) -> Result<Prologue, ConstPoolError> {
    // invokevirtual through this_class; the accessors themselves are
    // inherited from java/net/URLConnection and resolve at run time.
    let connect_getter =
        pool.add_method_ref(this_class, CONNECT_TIMEOUT_GETTER, TIMEOUT_GETTER_DESCRIPTOR)?;
    let connect_setter =
        pool.add_method_ref(this_class, CONNECT_TIMEOUT_SETTER, TIMEOUT_SETTER_DESCRIPTOR)?;
    let read_getter =
        pool.add_method_ref(this_class, READ_TIMEOUT_GETTER, TIMEOUT_GETTER_DESCRIPTOR)?;
    let read_setter =
        pool.add_method_ref(this_class, READ_TIMEOUT_SETTER, TIMEOUT_SETTER_DESCRIPTOR)?;

    let connect_push = push_int(pool, defaults.connect_millis())?;
    let read_push = push_int(pool, defaults.read_millis())?;

    let connect_guard = build_guard(connect_getter, connect_setter, &connect_push);
    let read_guard = build_guard(read_getter, read_setter, &read_push);

    let connect_guard_len = connect_guard.len();
    let read_guard_len = read_guard.len();
    let unpadded = connect_guard_len + read_guard_len;
    let pad = (4 - unpadded % 4) % 4;

    let mut code = connect_guard;
    code.extend_from_slice(&read_guard);
    code.resize(unpadded + pad, opcodes::NOP);

    Ok(Prologue { code, connect_guard_len, read_guard_len, pad })
}

/// One zero-sentinel guard. Position independent: the only branch inside
/// is the `ifne` skipping its own setter call.
fn build_guard(getter: u16, setter: u16, push: &[u8]) -> Vec<u8> {
    // ifne sits 4 bytes in; its target is the end of the guard at
    // 11 + push.len(), so the pc-relative operand is 7 + push.len().
    let skip = 7 + push.len() as i16;
    let mut guard = Vec::with_capacity(11 + push.len());
    guard.push(opcodes::ALOAD_0);
    guard.push(opcodes::INVOKEVIRTUAL);
    guard.extend_from_slice(&getter.to_be_bytes());
    guard.push(opcodes::IFNE);
    guard.extend_from_slice(&skip.to_be_bytes());
    guard.push(opcodes::ALOAD_0);
    guard.extend_from_slice(push);
    guard.push(opcodes::INVOKEVIRTUAL);
    guard.extend_from_slice(&setter.to_be_bytes());
    guard
}

/// Shortest instruction sequence pushing `value` onto the operand stack.
fn push_int(pool: &mut ConstantPool, value: i32) -> Result<Vec<u8>, ConstPoolError> {
    Ok(match value {
        -1 => vec![opcodes::ICONST_M1],
        0..=5 => vec![opcodes::ICONST_0 + value as u8],
        -128..=127 => vec![opcodes::BIPUSH, value as i8 as u8],
        -32768..=32767 => {
            let operand = (value as i16).to_be_bytes();
            vec![opcodes::SIPUSH, operand[0], operand[1]]
        }
        _ => {
            let index = pool.add_integer(value)?;
            if index <= u8::MAX as u16 {
                vec![opcodes::LDC, index as u8]
            } else {
                let operand = index.to_be_bytes();
                vec![opcodes::LDC_W, operand[0], operand[1]]
            }
        }
    })
}

/// Adds frames for the two branch targets the guards introduce: the end
/// of the first guard and the end of the second. Both are reached with an
/// empty stack and untouched locals, so plain same_frames suffice.
///
/// Frame offsets chain as previous + delta + 1, which is why only the
/// first original delta needs re-basing: new_delta = old_delta + pad - 1
/// relative to the second inserted frame. When the original leading frame
/// sat at offset 0 and there is no padding, that formula would collide
/// with the second guard frame, so the original frame absorbs its slot
/// instead.
fn insert_guard_frames(
    table: &mut StackMapTable,
    connect_guard_len: usize,
    read_guard_len: usize,
    pad: usize,
) {
    let frame_a = StackMapFrame::Same { offset_delta: connect_guard_len as u16 };
    let frame_b = StackMapFrame::Same { offset_delta: read_guard_len as u16 - 1 };
    match table.frames.first().map(|frame| frame.offset_delta()) {
        None => {
            table.frames.push(frame_a);
            table.frames.push(frame_b);
        }
        Some(0) if pad == 0 => {
            table.frames[0].set_offset_delta(read_guard_len as u16 - 1);
            table.frames.insert(0, frame_a);
        }
        Some(first_delta) => {
            table.frames[0].set_offset_delta(first_delta + pad as u16 - 1);
            table.frames.insert(0, frame_b);
            table.frames.insert(0, frame_a);
        }
    }
}
