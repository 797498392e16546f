// Shared builders for the integration tests.
//
// Classes are assembled through the classfile model and serialized with
// ClassfileWritable, the same bytes an exploded jar would hold on disk.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use timeout_weaver::classfile::attribute::{LocalVariableEntry, LocalVariableTableAttribute};
use timeout_weaver::classfile::defs::access_flags;
use timeout_weaver::classfile::opcodes;
use timeout_weaver::classfile::{
    AttributeInfo, ClassFile, ClassReader, ClassfileWritable, CodeAttribute, Constant,
    ExceptionTableEntry, LineNumberTableAttribute, MethodInfo, StackMapFrame, StackMapTable,
    VerificationType,
};
use timeout_weaver::pool::{BytecodeSource, ClassPool, MemorySource};

pub const HTTP_TARGET: &str = "sun/net/www/protocol/http/HttpURLConnection";
pub const HTTPS_TARGET: &str = "sun/net/www/protocol/https/AbstractDelegateHttpsURLConnection";

fn class_skeleton(name: &str, super_name: &str) -> ClassFile {
    let mut class_file = ClassFile::new();
    class_file.access_flags = access_flags::ACC_PUBLIC | access_flags::ACC_SUPER;
    class_file.this_class = class_file.constant_pool.add_class(name).unwrap();
    class_file.super_class = class_file.constant_pool.add_class(super_name).unwrap();
    class_file
}

/// Adds a method and returns its index into `methods`.
pub fn add_method(
    class_file: &mut ClassFile,
    access: u16,
    name: &str,
    descriptor: &str,
    code: Option<CodeAttribute>,
) -> usize {
    let name_index = class_file.constant_pool.add_utf8(name).unwrap();
    let descriptor_index = class_file.constant_pool.add_utf8(descriptor).unwrap();
    let mut method = MethodInfo::new(access, name_index, descriptor_index);
    if let Some(code_attr) = code {
        let code_name = class_file.constant_pool.add_utf8("Code").unwrap();
        method
            .attributes
            .push(AttributeInfo::new(code_name, code_attr.to_bytes()));
    }
    class_file.methods.push(method);
    class_file.methods.len() - 1
}

/// A connection class declaring `connect()V` with the given body.
/// `disconnect` comes first so `connect` is never at method index zero.
pub fn connection_class_with_code(name: &str, code_attr: CodeAttribute) -> ClassFile {
    let mut class_file = class_skeleton(name, "java/net/URLConnection");
    add_method(
        &mut class_file,
        access_flags::ACC_PROTECTED,
        "disconnect",
        "()V",
        Some(CodeAttribute::new(0, 1, vec![opcodes::RETURN])),
    );
    add_method(
        &mut class_file,
        access_flags::ACC_PUBLIC,
        "connect",
        "()V",
        Some(code_attr),
    );
    class_file
}

/// The smallest patchable connection class: `connect` is an empty body.
pub fn connection_class(name: &str) -> ClassFile {
    connection_class_with_code(name, CodeAttribute::new(0, 1, vec![opcodes::RETURN]))
}

/// A subclass that inherits `connect` from `super_name` without declaring
/// its own.
pub fn subclass_without_connect(name: &str, super_name: &str) -> ClassFile {
    let mut class_file = class_skeleton(name, super_name);
    add_method(
        &mut class_file,
        access_flags::ACC_PUBLIC,
        "close",
        "()V",
        Some(CodeAttribute::new(0, 1, vec![opcodes::RETURN])),
    );
    add_method(
        &mut class_file,
        access_flags::ACC_PROTECTED,
        "disconnect",
        "()V",
        Some(CodeAttribute::new(0, 1, vec![opcodes::RETURN])),
    );
    class_file
}

/// A `connect` with every pc-bearing structure a patch must preserve: an
/// exception handler, line numbers, local variable ranges and stack map
/// frames for both the branch target and the handler.
///
/// ```text
///  0: iconst_0          line 100
///  1: istore_1
///  2: iload_1
///  3: ifne 8
///  6: iconst_1          line 101
///  7: istore_1
///  8: return            line 102   branch target, locals [this, int]
///  9: astore_2          line 103   handler, stack [Throwable]
/// 10: return
/// ```
pub fn instrumented_connection_class(name: &str) -> ClassFile {
    let mut class_file = class_skeleton(name, "java/net/URLConnection");
    let this_class = class_file.this_class;
    let throwable = class_file.constant_pool.add_class("java/lang/Throwable").unwrap();

    let code = vec![
        opcodes::ICONST_0,
        opcodes::ISTORE_1,
        opcodes::ILOAD_1,
        opcodes::IFNE,
        0,
        5,
        opcodes::ICONST_1,
        opcodes::ISTORE_1,
        opcodes::RETURN,
        opcodes::ASTORE_2,
        opcodes::RETURN,
    ];
    let mut code_attr = CodeAttribute::new(1, 3, code);
    code_attr
        .exception_table
        .push(ExceptionTableEntry::new(0, 8, 9, throwable));

    let mut line_numbers = LineNumberTableAttribute::new();
    line_numbers.add_line_number(0, 100);
    line_numbers.add_line_number(6, 101);
    line_numbers.add_line_number(8, 102);
    line_numbers.add_line_number(9, 103);

    let this_name = class_file.constant_pool.add_utf8("this").unwrap();
    let this_descriptor = class_file
        .constant_pool
        .add_utf8(&format!("L{};", name))
        .unwrap();
    let flag_name = class_file.constant_pool.add_utf8("established").unwrap();
    let flag_descriptor = class_file.constant_pool.add_utf8("Z").unwrap();
    let variables = LocalVariableTableAttribute {
        entries: vec![
            LocalVariableEntry {
                start_pc: 0,
                length: 11,
                name_index: this_name,
                descriptor_index: this_descriptor,
                index: 0,
            },
            LocalVariableEntry {
                start_pc: 2,
                length: 9,
                name_index: flag_name,
                descriptor_index: flag_descriptor,
                index: 1,
            },
        ],
    };

    let stack_map = StackMapTable {
        frames: vec![
            StackMapFrame::Append {
                offset_delta: 8,
                locals: vec![VerificationType::Integer],
            },
            StackMapFrame::Full {
                offset_delta: 0,
                locals: vec![
                    VerificationType::Object(this_class),
                    VerificationType::Integer,
                ],
                stack: vec![VerificationType::Object(throwable)],
            },
        ],
    };

    let line_numbers_name = class_file.constant_pool.add_utf8("LineNumberTable").unwrap();
    let variables_name = class_file.constant_pool.add_utf8("LocalVariableTable").unwrap();
    let stack_map_name = class_file.constant_pool.add_utf8("StackMapTable").unwrap();
    code_attr
        .attributes
        .push(AttributeInfo::new(line_numbers_name, line_numbers.to_bytes()));
    code_attr
        .attributes
        .push(AttributeInfo::new(variables_name, variables.to_bytes()));
    code_attr
        .attributes
        .push(AttributeInfo::new(stack_map_name, stack_map.to_bytes()));

    add_method(
        &mut class_file,
        access_flags::ACC_PUBLIC,
        "connect",
        "()V",
        Some(code_attr),
    );
    class_file
}

/// A `connect` whose body starts with a `tableswitch` padded for its
/// position at offset one.
///
/// ```text
///  0: iconst_0
///  1: tableswitch { 0 -> 20, default -> 21 }   two pad bytes
/// 20: nop
/// 21: return
/// ```
pub fn switch_connection_class(name: &str) -> ClassFile {
    let mut code = vec![opcodes::ICONST_0, opcodes::TABLESWITCH, 0, 0];
    code.extend_from_slice(&20i32.to_be_bytes()); // default -> 21
    code.extend_from_slice(&0i32.to_be_bytes()); // low
    code.extend_from_slice(&0i32.to_be_bytes()); // high
    code.extend_from_slice(&19i32.to_be_bytes()); // case 0 -> 20
    code.push(opcodes::NOP);
    code.push(opcodes::RETURN);

    let mut class_file = class_skeleton(name, "java/net/URLConnection");
    let mut code_attr = CodeAttribute::new(1, 1, code);
    let stack_map = StackMapTable {
        frames: vec![
            StackMapFrame::Same { offset_delta: 20 },
            StackMapFrame::Same { offset_delta: 0 },
        ],
    };
    let stack_map_name = class_file.constant_pool.add_utf8("StackMapTable").unwrap();
    code_attr
        .attributes
        .push(AttributeInfo::new(stack_map_name, stack_map.to_bytes()));
    add_method(
        &mut class_file,
        access_flags::ACC_PUBLIC,
        "connect",
        "()V",
        Some(code_attr),
    );
    class_file
}

/// A `connect` that loops back to offset zero, so its leading stack map
/// frame sits at pc 0.
pub fn looping_connection_class(name: &str) -> ClassFile {
    // 0: nop   loop head, frame at delta 0
    // 1: goto 0
    let code = vec![opcodes::NOP, opcodes::GOTO, 0xff, 0xff];
    let mut class_file = class_skeleton(name, "java/net/URLConnection");
    let mut code_attr = CodeAttribute::new(0, 1, code);
    let stack_map = StackMapTable {
        frames: vec![StackMapFrame::Same { offset_delta: 0 }],
    };
    let stack_map_name = class_file.constant_pool.add_utf8("StackMapTable").unwrap();
    code_attr
        .attributes
        .push(AttributeInfo::new(stack_map_name, stack_map.to_bytes()));
    add_method(
        &mut class_file,
        access_flags::ACC_PUBLIC,
        "connect",
        "()V",
        Some(code_attr),
    );
    class_file
}

/// `connect` declared native, so it carries no Code attribute.
pub fn native_connection_class(name: &str) -> ClassFile {
    let mut class_file = class_skeleton(name, "java/net/URLConnection");
    add_method(
        &mut class_file,
        access_flags::ACC_PUBLIC | access_flags::ACC_NATIVE,
        "connect",
        "()V",
        None,
    );
    class_file
}

/// `connect` big enough that prepending any prologue overflows the
/// 65535 byte code limit.
pub fn oversized_connection_class(name: &str) -> ClassFile {
    let mut code = vec![opcodes::NOP; 65_530];
    code.push(opcodes::RETURN);
    connection_class_with_code(name, CodeAttribute::new(0, 1, code))
}

/// A pool whose single memory source carries the given classes under
/// their own names.
pub fn memory_pool(classes: Vec<ClassFile>) -> ClassPool {
    let mut source = MemorySource::new();
    for class_file in classes {
        let name = class_file.class_name().unwrap().to_string();
        source.insert(name, class_file.to_classfile_bytes());
    }
    ClassPool::with_source(Box::new(source))
}

/// Counts the loads delegated to an inner source, proving when
/// resolution does or does not reach the sources.
pub struct CountingSource {
    inner: MemorySource,
    loads: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(inner: MemorySource) -> (Self, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        (Self { inner, loads }, counter)
    }
}

impl BytecodeSource for CountingSource {
    fn load(&self, internal_name: &str) -> io::Result<Option<Vec<u8>>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(internal_name)
    }
}

/// Fails every load with an io error.
pub struct FailingSource;

impl BytecodeSource for FailingSource {
    fn load(&self, _internal_name: &str) -> io::Result<Option<Vec<u8>>> {
        Err(io::Error::new(io::ErrorKind::Other, "source unavailable"))
    }
}

/// Parses `bytes` and opens the `Code` attribute of the declared `connect`.
pub fn parsed_connect_code(bytes: &[u8]) -> (ClassFile, CodeAttribute) {
    let class_file = ClassReader::new(bytes).parse().unwrap();
    let method_index = class_file.declared_method("connect").unwrap();
    let method = &class_file.methods[method_index];
    let code_index = method.code_attribute_index(&class_file.constant_pool).unwrap();
    let code_attr = CodeAttribute::parse(&method.attributes[code_index].info).unwrap();
    (class_file, code_attr)
}

/// The nested code attribute with the given name, if present.
pub fn attribute_named<'a>(
    class_file: &ClassFile,
    code_attr: &'a CodeAttribute,
    name: &str,
) -> Option<&'a AttributeInfo> {
    code_attr
        .attributes
        .iter()
        .find(|attribute| class_file.constant_pool.utf8_at(attribute.name_index) == Some(name))
}

/// The stack map table nested in the given code attribute, if any.
pub fn connect_stack_map(class_file: &ClassFile, code_attr: &CodeAttribute) -> Option<StackMapTable> {
    attribute_named(class_file, code_attr, "StackMapTable")
        .map(|attribute| StackMapTable::parse(&attribute.info).unwrap())
}

/// Resolves the method reference invoked at `at`, asserting the call goes
/// through `this_class`. Returns the referenced name and descriptor.
pub fn invoked_method(class_file: &ClassFile, code: &[u8], at: usize) -> (String, String) {
    assert_eq!(code[at], opcodes::INVOKEVIRTUAL);
    let reference = u16::from_be_bytes([code[at + 1], code[at + 2]]);
    let (class_index, name_and_type) = match class_file.constant_pool.get(reference) {
        Some(Constant::MethodRef(class_index, nat)) => (*class_index, *nat),
        other => panic!("expected MethodRef at {}: {:?}", reference, other),
    };
    assert_eq!(class_index, class_file.this_class);
    match class_file.constant_pool.get(name_and_type) {
        Some(Constant::NameAndType(name_index, descriptor_index)) => (
            class_file.constant_pool.utf8_at(*name_index).unwrap().to_string(),
            class_file
                .constant_pool
                .utf8_at(*descriptor_index)
                .unwrap()
                .to_string(),
        ),
        other => panic!("expected NameAndType: {:?}", other),
    }
}

/// Pool index of the `Class` entry naming `name`.
pub fn class_index_of(class_file: &ClassFile, name: &str) -> u16 {
    (1..class_file.constant_pool.count())
        .find(|index| class_file.constant_pool.class_name_at(*index) == Some(name))
        .unwrap()
}
