use crate::classfile::attribute::AttributeInfo;
use crate::classfile::constpool::ConstantPool;

/// A method_info entry. Attributes stay raw until a patch needs to open
/// the `Code` attribute.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl MethodInfo {
    pub fn new(access_flags: u16, name_index: u16, descriptor_index: u16) -> Self {
        Self { access_flags, name_index, descriptor_index, attributes: Vec::new() }
    }

    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Option<&'a str> {
        pool.utf8_at(self.name_index)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Option<&'a str> {
        pool.utf8_at(self.descriptor_index)
    }

    /// Index into `attributes` of the `Code` attribute. Absent for
    /// abstract and native methods.
    pub fn code_attribute_index(&self, pool: &ConstantPool) -> Option<usize> {
        self.attributes
            .iter()
            .position(|attribute| pool.utf8_at(attribute.name_index) == Some("Code"))
    }
}
