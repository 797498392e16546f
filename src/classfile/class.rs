//! Top-level class file structure

use crate::classfile::attribute::AttributeInfo;
use crate::classfile::constpool::ConstantPool;
use crate::classfile::defs::{major_versions, MAGIC};
use crate::classfile::field::FieldInfo;
use crate::classfile::method::MethodInfo;

/// A parsed class file.
///
/// Parsing keeps every attribute payload byte-for-byte, so a class that is
/// read and written without edits comes back identical. Patches only ever
/// append constants and rewrite the one `Code` attribute they target.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub magic: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            minor_version: 0,
            major_version: major_versions::JAVA_8,
            constant_pool: ConstantPool::new(),
            access_flags: 0,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Internal name of this class, e.g. `sun/net/www/protocol/http/HttpURLConnection`.
    pub fn class_name(&self) -> Option<&str> {
        self.constant_pool.class_name_at(self.this_class)
    }

    /// Internal name of the direct superclass; `None` for `java/lang/Object`.
    pub fn super_class_name(&self) -> Option<&str> {
        if self.super_class == 0 {
            return None;
        }
        self.constant_pool.class_name_at(self.super_class)
    }

    /// Index into `methods` of a method declared directly on this class.
    /// Inherited methods are invisible here on purpose: the caller decides
    /// whether a missing declaration is an error.
    pub fn declared_method(&self, name: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|method| method.name(&self.constant_pool) == Some(name))
    }
}

impl Default for ClassFile {
    fn default() -> Self {
        Self::new()
    }
}
