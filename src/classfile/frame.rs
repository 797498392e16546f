//! StackMapTable frames and verification types
//!
//! Offset deltas chain: the first frame sits at bytecode offset `delta_0`,
//! every later frame at `previous + delta + 1`. Prepending code therefore
//! only needs the first delta re-based; the rest of the chain follows.
//! `Uninitialized` entries are the exception, they carry absolute offsets
//! of `new` instructions and must be shifted individually.

use crate::classfile::reader::{ClassReader, ReadError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(u16),
    Uninitialized(u16),
}

impl VerificationType {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ReadError> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(reader.read_u16()?),
            8 => VerificationType::Uninitialized(reader.read_u16()?),
            _ => return Err(ReadError::UnknownVerificationTag { tag }),
        })
    }

    fn write_to(&self, bytes: &mut Vec<u8>) {
        match self {
            VerificationType::Top => bytes.push(0),
            VerificationType::Integer => bytes.push(1),
            VerificationType::Float => bytes.push(2),
            VerificationType::Double => bytes.push(3),
            VerificationType::Long => bytes.push(4),
            VerificationType::Null => bytes.push(5),
            VerificationType::UninitializedThis => bytes.push(6),
            VerificationType::Object(index) => {
                bytes.push(7);
                bytes.extend_from_slice(&index.to_be_bytes());
            }
            VerificationType::Uninitialized(offset) => {
                bytes.push(8);
                bytes.extend_from_slice(&offset.to_be_bytes());
            }
        }
    }

    fn shift_uninitialized(&mut self, by: u16) {
        if let VerificationType::Uninitialized(offset) = self {
            *offset = offset.saturating_add(by);
        }
    }

    fn uninitialized_offset(&self) -> Option<u16> {
        match self {
            VerificationType::Uninitialized(offset) => Some(*offset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    Same { offset_delta: u16 },
    SameLocals1 { offset_delta: u16, stack: VerificationType },
    Chop { absent: u8, offset_delta: u16 },
    Append { offset_delta: u16, locals: Vec<VerificationType> },
    Full { offset_delta: u16, locals: Vec<VerificationType>, stack: Vec<VerificationType> },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameLocals1 { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }

    pub fn set_offset_delta(&mut self, delta: u16) {
        match self {
            StackMapFrame::Same { offset_delta }
            | StackMapFrame::SameLocals1 { offset_delta, .. }
            | StackMapFrame::Chop { offset_delta, .. }
            | StackMapFrame::Append { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta = delta,
        }
    }

    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ReadError> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            0..=63 => StackMapFrame::Same { offset_delta: tag as u16 },
            64..=127 => StackMapFrame::SameLocals1 {
                offset_delta: (tag - 64) as u16,
                stack: VerificationType::parse(reader)?,
            },
            247 => StackMapFrame::SameLocals1 {
                offset_delta: reader.read_u16()?,
                stack: VerificationType::parse(reader)?,
            },
            248..=250 => StackMapFrame::Chop {
                absent: 251 - tag,
                offset_delta: reader.read_u16()?,
            },
            251 => StackMapFrame::Same { offset_delta: reader.read_u16()? },
            252..=254 => {
                let offset_delta = reader.read_u16()?;
                let count = (tag - 251) as usize;
                let mut locals = Vec::with_capacity(count);
                for _ in 0..count {
                    locals.push(VerificationType::parse(reader)?);
                }
                StackMapFrame::Append { offset_delta, locals }
            }
            255 => {
                let offset_delta = reader.read_u16()?;
                let locals_count = reader.read_u16()?;
                let mut locals = Vec::with_capacity(locals_count as usize);
                for _ in 0..locals_count {
                    locals.push(VerificationType::parse(reader)?);
                }
                let stack_count = reader.read_u16()?;
                let mut stack = Vec::with_capacity(stack_count as usize);
                for _ in 0..stack_count {
                    stack.push(VerificationType::parse(reader)?);
                }
                StackMapFrame::Full { offset_delta, locals, stack }
            }
            _ => return Err(ReadError::UnknownFrameTag { tag }),
        })
    }

    fn write_to(&self, bytes: &mut Vec<u8>) {
        match self {
            StackMapFrame::Same { offset_delta } => {
                if *offset_delta <= 63 {
                    bytes.push(*offset_delta as u8);
                } else {
                    bytes.push(251);
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
            }
            StackMapFrame::SameLocals1 { offset_delta, stack } => {
                if *offset_delta <= 63 {
                    bytes.push(64 + *offset_delta as u8);
                } else {
                    bytes.push(247);
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
                stack.write_to(bytes);
            }
            StackMapFrame::Chop { absent, offset_delta } => {
                bytes.push(251 - absent);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
            }
            StackMapFrame::Append { offset_delta, locals } => {
                bytes.push(251 + locals.len() as u8);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                for local in locals {
                    local.write_to(bytes);
                }
            }
            StackMapFrame::Full { offset_delta, locals, stack } => {
                bytes.push(255);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                bytes.extend_from_slice(&(locals.len() as u16).to_be_bytes());
                for local in locals {
                    local.write_to(bytes);
                }
                bytes.extend_from_slice(&(stack.len() as u16).to_be_bytes());
                for entry in stack {
                    entry.write_to(bytes);
                }
            }
        }
    }

    fn shift_uninitialized(&mut self, by: u16) {
        match self {
            StackMapFrame::Same { .. } | StackMapFrame::Chop { .. } => {}
            StackMapFrame::SameLocals1 { stack, .. } => stack.shift_uninitialized(by),
            StackMapFrame::Append { locals, .. } => {
                for local in locals {
                    local.shift_uninitialized(by);
                }
            }
            StackMapFrame::Full { locals, stack, .. } => {
                for local in locals {
                    local.shift_uninitialized(by);
                }
                for entry in stack {
                    entry.shift_uninitialized(by);
                }
            }
        }
    }

    fn max_uninitialized_offset(&self) -> Option<u16> {
        match self {
            StackMapFrame::Same { .. } | StackMapFrame::Chop { .. } => None,
            StackMapFrame::SameLocals1 { stack, .. } => stack.uninitialized_offset(),
            StackMapFrame::Append { locals, .. } => locals
                .iter()
                .filter_map(VerificationType::uninitialized_offset)
                .max(),
            StackMapFrame::Full { locals, stack, .. } => locals
                .iter()
                .chain(stack.iter())
                .filter_map(VerificationType::uninitialized_offset)
                .max(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackMapTable {
    pub frames: Vec<StackMapFrame>,
}

impl StackMapTable {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn parse(info: &[u8]) -> Result<Self, ReadError> {
        let mut reader = ClassReader::new(info);
        let count = reader.read_u16()?;
        let mut frames = Vec::with_capacity(count as usize);
        for _ in 0..count {
            frames.push(StackMapFrame::parse(&mut reader)?);
        }
        let trailing = reader.remaining();
        if trailing > 0 {
            return Err(ReadError::TrailingBytes { count: trailing });
        }
        Ok(Self { frames })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.frames.len() as u16).to_be_bytes());
        for frame in &self.frames {
            frame.write_to(&mut bytes);
        }
        bytes
    }

    /// Shifts the absolute `new` offsets carried by `Uninitialized` entries.
    /// Frame positions themselves are delta-chained and re-based separately.
    /// Offsets saturate at `u16::MAX` instead of wrapping.
    pub fn shift_uninitialized(&mut self, by: u16) {
        for frame in &mut self.frames {
            frame.shift_uninitialized(by);
        }
    }

    /// Largest absolute `new` offset carried by any `Uninitialized` entry.
    pub fn max_uninitialized_offset(&self) -> Option<u16> {
        self.frames
            .iter()
            .filter_map(StackMapFrame::max_uninitialized_offset)
            .max()
    }
}
