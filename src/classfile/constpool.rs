//! Constant pool management for parsed class files
//!
//! Indices are 1-based as in the class-file format; `Long` and `Double`
//! constants occupy two slots, with a `Placeholder` holding the hidden
//! second slot. The pool is append-only: patched classes gain entries at
//! the end and every pre-existing index stays valid, which is what lets
//! opaque attributes round-trip untouched.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConstPoolError {
    #[error("constant pool size limit exceeded: current={current}, adding={adding}, max={max}")]
    SizeLimitExceeded { current: usize, adding: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
    /// Hidden second slot of a Long or Double entry; never serialized.
    Placeholder,
}

impl Constant {
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    pub(crate) entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn from_entries(entries: Vec<Constant>) -> Self {
        Self { entries }
    }

    /// Number of occupied slots (wide constants take two).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The constant_pool_count value written to the class file.
    pub fn count(&self) -> u16 {
        (self.entries.len() + 1) as u16
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        if index == 0 {
            return None;
        }
        self.entries.get((index - 1) as usize)
    }

    pub fn utf8_at(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Some(Constant::Utf8(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn class_name_at(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Some(Constant::Class(name_index)) => self.utf8_at(*name_index),
            _ => None,
        }
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<u16, ConstPoolError> {
        let existing = self
            .entries
            .iter()
            .position(|c| matches!(c, Constant::Utf8(s) if s == value));
        if let Some(pos) = existing {
            return Ok((pos + 1) as u16);
        }
        self.push(Constant::Utf8(value.to_string()))
    }

    pub fn add_integer(&mut self, value: i32) -> Result<u16, ConstPoolError> {
        let existing = self
            .entries
            .iter()
            .position(|c| matches!(c, Constant::Integer(v) if *v == value));
        if let Some(pos) = existing {
            return Ok((pos + 1) as u16);
        }
        self.push(Constant::Integer(value))
    }

    pub fn add_class(&mut self, name: &str) -> Result<u16, ConstPoolError> {
        let name_index = self.add_utf8(name)?;
        let existing = self
            .entries
            .iter()
            .position(|c| matches!(c, Constant::Class(n) if *n == name_index));
        if let Some(pos) = existing {
            return Ok((pos + 1) as u16);
        }
        self.push(Constant::Class(name_index))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ConstPoolError> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        let existing = self.entries.iter().position(
            |c| matches!(c, Constant::NameAndType(n, d) if *n == name_index && *d == descriptor_index),
        );
        if let Some(pos) = existing {
            return Ok((pos + 1) as u16);
        }
        self.push(Constant::NameAndType(name_index, descriptor_index))
    }

    /// `class_index` must refer to an existing `Class` entry, typically the
    /// `this_class` of the unit being patched.
    pub fn add_method_ref(
        &mut self,
        class_index: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ConstPoolError> {
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        let existing = self.entries.iter().position(
            |c| matches!(c, Constant::MethodRef(cl, nat) if *cl == class_index && *nat == name_and_type_index),
        );
        if let Some(pos) = existing {
            return Ok((pos + 1) as u16);
        }
        self.push(Constant::MethodRef(class_index, name_and_type_index))
    }

    fn push(&mut self, constant: Constant) -> Result<u16, ConstPoolError> {
        let adding = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + adding + 1 > u16::MAX as usize {
            return Err(ConstPoolError::SizeLimitExceeded {
                current: self.entries.len(),
                adding,
                max: (u16::MAX as usize) - 1,
            });
        }
        let wide = constant.is_wide();
        self.entries.push(constant);
        let index = self.entries.len() as u16;
        if wide {
            self.entries.push(Constant::Placeholder);
        }
        Ok(index)
    }
}
