//! Generic class-file format definitions

/// Header of a Java class file (magic number)
pub const MAGIC: u32 = 0xCAFEBABE;

/// Longest method body the JVM accepts, in bytes
pub const MAX_CODE_LENGTH: usize = 65535;

/// JVM version constants
pub mod major_versions {
    pub const JAVA_1_1: u16 = 45;
    pub const JAVA_1_2: u16 = 46;
    pub const JAVA_1_3: u16 = 47;
    pub const JAVA_1_4: u16 = 48;
    pub const JAVA_5_0: u16 = 49;
    pub const JAVA_6_0: u16 = 50;
    pub const JAVA_7: u16 = 51;
    pub const JAVA_8: u16 = 52;
    pub const JAVA_9: u16 = 53;
    pub const JAVA_10: u16 = 54;
    pub const JAVA_11: u16 = 55;
    pub const JAVA_12: u16 = 56;
    pub const JAVA_13: u16 = 57;
    pub const JAVA_14: u16 = 58;
    pub const JAVA_15: u16 = 59;
    pub const JAVA_16: u16 = 60;
    pub const JAVA_17: u16 = 61;
    pub const JAVA_18: u16 = 62;
    pub const JAVA_19: u16 = 63;
    pub const JAVA_20: u16 = 64;
    pub const JAVA_21: u16 = 65;
}

/// First class-file version that requires StackMapTable frames for any
/// method containing branches
pub const STACK_MAP_MIN_MAJOR: u16 = major_versions::JAVA_6_0;

/// Class, field and method access flags
pub mod access_flags {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_PROTECTED: u16 = 0x0004;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_SYNCHRONIZED: u16 = 0x0020;
    pub const ACC_VOLATILE: u16 = 0x0040;
    pub const ACC_BRIDGE: u16 = 0x0040;
    pub const ACC_TRANSIENT: u16 = 0x0080;
    pub const ACC_VARARGS: u16 = 0x0080;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
    pub const ACC_STRICT: u16 = 0x0800;
    pub const ACC_SYNTHETIC: u16 = 0x1000;
    pub const ACC_ANNOTATION: u16 = 0x2000;
    pub const ACC_ENUM: u16 = 0x4000;
    pub const ACC_MODULE: u16 = 0x8000;
}

/// Constant pool tags
pub mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELD_REF: u8 = 9;
    pub const CONSTANT_METHOD_REF: u8 = 10;
    pub const CONSTANT_INTERFACE_METHOD_REF: u8 = 11;
    pub const CONSTANT_NAME_AND_TYPE: u8 = 12;
    pub const CONSTANT_METHOD_HANDLE: u8 = 15;
    pub const CONSTANT_METHOD_TYPE: u8 = 16;
    pub const CONSTANT_DYNAMIC: u8 = 17;
    pub const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
    pub const CONSTANT_MODULE: u8 = 19;
    pub const CONSTANT_PACKAGE: u8 = 20;
}
