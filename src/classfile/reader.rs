//! Class file parser
//!
//! Parses the structural skeleton only: constant pool, member lists and
//! attribute boundaries. Attribute payloads are kept raw so anything the
//! patcher does not rewrite survives byte-for-byte. Floats are carried as
//! raw bit patterns for the same reason.

use thiserror::Error;

use crate::classfile::attribute::AttributeInfo;
use crate::classfile::class::ClassFile;
use crate::classfile::constpool::{Constant, ConstantPool};
use crate::classfile::defs::{constant_tags, MAGIC};
use crate::classfile::field::FieldInfo;
use crate::classfile::method::MethodInfo;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("unexpected end of class data at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("bad magic number 0x{found:08X}")]
    BadMagic { found: u32 },

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("constant pool entry {index} is not valid UTF-8")]
    InvalidUtf8 { index: u16 },

    #[error("wide constant at index {index} overruns the constant pool")]
    WideConstantOverrun { index: u16 },

    #[error("unknown stack map frame tag {tag}")]
    UnknownFrameTag { tag: u8 },

    #[error("unknown verification type tag {tag}")]
    UnknownVerificationTag { tag: u8 },

    #[error("{count} trailing bytes after class data")]
    TrailingBytes { count: usize },
}

/// Big-endian cursor over class data.
pub struct ClassReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, ReadError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(ReadError::UnexpectedEof { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ReadError> {
        let slice = self.take(2)?;
        Ok(u16::from_be_bytes([slice[0], slice[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ReadError> {
        let slice = self.take(4)?;
        Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    pub(crate) fn take(&mut self, count: usize) -> Result<&'a [u8], ReadError> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ReadError::UnexpectedEof { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Parses a complete class file. The input must be consumed exactly.
    pub fn parse(mut self) -> Result<ClassFile, ReadError> {
        let magic = self.read_u32()?;
        if magic != MAGIC {
            return Err(ReadError::BadMagic { found: magic });
        }
        let minor_version = self.read_u16()?;
        let major_version = self.read_u16()?;

        let constant_pool = self.read_constant_pool()?;

        let access_flags = self.read_u16()?;
        let this_class = self.read_u16()?;
        let super_class = self.read_u16()?;

        let interfaces_count = self.read_u16()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(self.read_u16()?);
        }

        let fields_count = self.read_u16()?;
        let mut fields = Vec::with_capacity(fields_count as usize);
        for _ in 0..fields_count {
            fields.push(self.read_field()?);
        }

        let methods_count = self.read_u16()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            methods.push(self.read_method()?);
        }

        let attributes = self.read_attributes()?;

        let trailing = self.remaining();
        if trailing > 0 {
            return Err(ReadError::TrailingBytes { count: trailing });
        }

        Ok(ClassFile {
            magic,
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn read_constant_pool(&mut self) -> Result<ConstantPool, ReadError> {
        let count = self.read_u16()?;
        let mut entries = Vec::with_capacity(count.saturating_sub(1) as usize);
        // Slots are 1-based; wide constants occupy two, and the second
        // slot must itself be inside the pool.
        let mut index: u16 = 1;
        while index < count {
            let constant = self.read_constant(index)?;
            if constant.is_wide() {
                if index + 1 >= count {
                    return Err(ReadError::WideConstantOverrun { index });
                }
                entries.push(constant);
                entries.push(Constant::Placeholder);
                index += 2;
            } else {
                entries.push(constant);
                index += 1;
            }
        }
        Ok(ConstantPool::from_entries(entries))
    }

    fn read_constant(&mut self, index: u16) -> Result<Constant, ReadError> {
        let tag = self.read_u8()?;
        Ok(match tag {
            constant_tags::CONSTANT_UTF8 => {
                let length = self.read_u16()? as usize;
                let bytes = self.take(length)?;
                let value = String::from_utf8(bytes.to_vec())
                    .map_err(|_| ReadError::InvalidUtf8 { index })?;
                Constant::Utf8(value)
            }
            constant_tags::CONSTANT_INTEGER => Constant::Integer(self.read_u32()? as i32),
            constant_tags::CONSTANT_FLOAT => Constant::Float(f32::from_bits(self.read_u32()?)),
            constant_tags::CONSTANT_LONG => {
                let high = self.read_u32()? as u64;
                let low = self.read_u32()? as u64;
                Constant::Long(((high << 32) | low) as i64)
            }
            constant_tags::CONSTANT_DOUBLE => {
                let high = self.read_u32()? as u64;
                let low = self.read_u32()? as u64;
                Constant::Double(f64::from_bits((high << 32) | low))
            }
            constant_tags::CONSTANT_CLASS => Constant::Class(self.read_u16()?),
            constant_tags::CONSTANT_STRING => Constant::String(self.read_u16()?),
            constant_tags::CONSTANT_FIELD_REF => {
                Constant::FieldRef(self.read_u16()?, self.read_u16()?)
            }
            constant_tags::CONSTANT_METHOD_REF => {
                Constant::MethodRef(self.read_u16()?, self.read_u16()?)
            }
            constant_tags::CONSTANT_INTERFACE_METHOD_REF => {
                Constant::InterfaceMethodRef(self.read_u16()?, self.read_u16()?)
            }
            constant_tags::CONSTANT_NAME_AND_TYPE => {
                Constant::NameAndType(self.read_u16()?, self.read_u16()?)
            }
            constant_tags::CONSTANT_METHOD_HANDLE => {
                Constant::MethodHandle(self.read_u8()?, self.read_u16()?)
            }
            constant_tags::CONSTANT_METHOD_TYPE => Constant::MethodType(self.read_u16()?),
            constant_tags::CONSTANT_DYNAMIC => {
                Constant::Dynamic(self.read_u16()?, self.read_u16()?)
            }
            constant_tags::CONSTANT_INVOKE_DYNAMIC => {
                Constant::InvokeDynamic(self.read_u16()?, self.read_u16()?)
            }
            constant_tags::CONSTANT_MODULE => Constant::Module(self.read_u16()?),
            constant_tags::CONSTANT_PACKAGE => Constant::Package(self.read_u16()?),
            _ => return Err(ReadError::UnknownConstantTag { tag, index }),
        })
    }

    fn read_field(&mut self) -> Result<FieldInfo, ReadError> {
        let access_flags = self.read_u16()?;
        let name_index = self.read_u16()?;
        let descriptor_index = self.read_u16()?;
        let attributes = self.read_attributes()?;
        Ok(FieldInfo { access_flags, name_index, descriptor_index, attributes })
    }

    fn read_method(&mut self) -> Result<MethodInfo, ReadError> {
        let access_flags = self.read_u16()?;
        let name_index = self.read_u16()?;
        let descriptor_index = self.read_u16()?;
        let attributes = self.read_attributes()?;
        Ok(MethodInfo { access_flags, name_index, descriptor_index, attributes })
    }

    fn read_attributes(&mut self) -> Result<Vec<AttributeInfo>, ReadError> {
        let count = self.read_u16()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = self.read_u16()?;
            let length = self.read_u32()? as usize;
            let info = self.take(length)?.to_vec();
            attributes.push(AttributeInfo::new(name_index, info));
        }
        Ok(attributes)
    }
}
