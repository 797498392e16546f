//! Class file model of the patcher
//!
//! Parsing, in-memory representation, serialization and structural
//! verification of Java class files. Everything a patch does not rewrite
//! is carried as raw bytes so untouched classes round-trip exactly.

pub mod attribute;
pub mod class;
pub mod constpool;
pub mod defs;
pub mod field;
pub mod frame;
pub mod method;
pub mod opcodes;
pub mod reader;
pub mod verify;
pub mod writer;

// Re-export commonly used types
pub use attribute::{
    AttributeInfo, CodeAttribute, ExceptionTableEntry, LineNumberTableAttribute,
    LocalVariableTableAttribute,
};
pub use class::ClassFile;
pub use constpool::{ConstPoolError, Constant, ConstantPool};
pub use field::FieldInfo;
pub use frame::{StackMapFrame, StackMapTable, VerificationType};
pub use method::MethodInfo;
pub use reader::{ClassReader, ReadError};
pub use verify::{verify_method, VerifyError};
pub use writer::ClassfileWritable;
