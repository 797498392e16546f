//! Attribute structures for class files
//!
//! Attributes a patch never touches stay as raw `AttributeInfo` blobs so
//! their bytes survive a read/write cycle exactly. Only the attributes the
//! injector must rewrite get structured forms: `Code` itself plus the
//! pc-bearing tables nested inside it.

use crate::classfile::reader::{ClassReader, ReadError};

/// An attribute kept as an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self { name_index, info }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

impl ExceptionTableEntry {
    pub fn new(start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: u16) -> Self {
        Self { start_pc, end_pc, handler_pc, catch_type }
    }

    fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0..2].copy_from_slice(&self.start_pc.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.end_pc.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.handler_pc.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.catch_type.to_be_bytes());
        bytes
    }
}

/// Structured form of a `Code` attribute payload.
///
/// Nested attributes stay raw; the injector re-parses the ones it has to
/// shift and leaves the rest byte-identical.
#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self { max_stack, max_locals, code, exception_table: Vec::new(), attributes: Vec::new() }
    }

    /// Parses the info payload of a `Code` attribute. The payload must be
    /// consumed exactly; leftover bytes mean a malformed attribute.
    pub fn parse(info: &[u8]) -> Result<Self, ReadError> {
        let mut reader = ClassReader::new(info);
        let max_stack = reader.read_u16()?;
        let max_locals = reader.read_u16()?;
        let code_length = reader.read_u32()? as usize;
        let code = reader.take(code_length)?.to_vec();

        let exception_table_length = reader.read_u16()?;
        let mut exception_table = Vec::with_capacity(exception_table_length as usize);
        for _ in 0..exception_table_length {
            exception_table.push(ExceptionTableEntry::new(
                reader.read_u16()?,
                reader.read_u16()?,
                reader.read_u16()?,
                reader.read_u16()?,
            ));
        }

        let attributes_count = reader.read_u16()?;
        let mut attributes = Vec::with_capacity(attributes_count as usize);
        for _ in 0..attributes_count {
            let name_index = reader.read_u16()?;
            let length = reader.read_u32()? as usize;
            let payload = reader.take(length)?.to_vec();
            attributes.push(AttributeInfo::new(name_index, payload));
        }

        let trailing = reader.remaining();
        if trailing > 0 {
            return Err(ReadError::TrailingBytes { count: trailing });
        }
        Ok(Self { max_stack, max_locals, code, exception_table, attributes })
    }

    /// Serializes back into an info payload for the enclosing attribute.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.max_stack.to_be_bytes());
        bytes.extend_from_slice(&self.max_locals.to_be_bytes());
        bytes.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.code);
        bytes.extend_from_slice(&(self.exception_table.len() as u16).to_be_bytes());
        for entry in &self.exception_table {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        bytes.extend_from_slice(&(self.attributes.len() as u16).to_be_bytes());
        for attribute in &self.attributes {
            bytes.extend_from_slice(&attribute.name_index.to_be_bytes());
            bytes.extend_from_slice(&(attribute.info.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&attribute.info);
        }
        bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineNumberTableAttribute {
    pub entries: Vec<LineNumberEntry>,
}

impl LineNumberTableAttribute {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn add_line_number(&mut self, start_pc: u16, line_number: u16) {
        self.entries.push(LineNumberEntry { start_pc, line_number });
    }

    pub fn parse(info: &[u8]) -> Result<Self, ReadError> {
        let mut reader = ClassReader::new(info);
        let count = reader.read_u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(LineNumberEntry {
                start_pc: reader.read_u16()?,
                line_number: reader.read_u16()?,
            });
        }
        let trailing = reader.remaining();
        if trailing > 0 {
            return Err(ReadError::TrailingBytes { count: trailing });
        }
        Ok(Self { entries })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.start_pc.to_be_bytes());
            bytes.extend_from_slice(&entry.line_number.to_be_bytes());
        }
        bytes
    }

    /// Shifts entry pcs after code was prepended, saturating at `u16::MAX`.
    pub fn shift_pcs(&mut self, by: u16) {
        for entry in &mut self.entries {
            entry.start_pc = entry.start_pc.saturating_add(by);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

/// `LocalVariableTable` and `LocalVariableTypeTable` share this layout; the
/// descriptor slot holds a signature index in the latter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalVariableTableAttribute {
    pub entries: Vec<LocalVariableEntry>,
}

impl LocalVariableTableAttribute {
    pub fn parse(info: &[u8]) -> Result<Self, ReadError> {
        let mut reader = ClassReader::new(info);
        let count = reader.read_u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(LocalVariableEntry {
                start_pc: reader.read_u16()?,
                length: reader.read_u16()?,
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
                index: reader.read_u16()?,
            });
        }
        let trailing = reader.remaining();
        if trailing > 0 {
            return Err(ReadError::TrailingBytes { count: trailing });
        }
        Ok(Self { entries })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.start_pc.to_be_bytes());
            bytes.extend_from_slice(&entry.length.to_be_bytes());
            bytes.extend_from_slice(&entry.name_index.to_be_bytes());
            bytes.extend_from_slice(&entry.descriptor_index.to_be_bytes());
            bytes.extend_from_slice(&entry.index.to_be_bytes());
        }
        bytes
    }

    /// Shifts variable ranges after code was prepended. A slot covering the
    /// old pc 0 keeps covering the prologue as well, so `this` and parameters
    /// stay visible to debuggers inside the injected code. Shifted values
    /// saturate at `u16::MAX`.
    pub fn shift_pcs(&mut self, by: u16) {
        for entry in &mut self.entries {
            if entry.start_pc == 0 {
                entry.length = entry.length.saturating_add(by);
            } else {
                entry.start_pc = entry.start_pc.saturating_add(by);
            }
        }
    }
}
