use timeout_weaver::classfile::defs::access_flags;
use timeout_weaver::classfile::{AttributeInfo, ClassReader, ClassfileWritable, Constant, ReadError};

mod common;
use common::{connection_class, instrumented_connection_class, HTTP_TARGET};

#[test]
fn parse_and_write_round_trip_a_rich_class() {
    let mut original = instrumented_connection_class(HTTP_TARGET);
    let source_file = original.constant_pool.add_utf8("SourceFile").unwrap();
    let file_name = original.constant_pool.add_utf8("HttpURLConnection.java").unwrap();
    original
        .attributes
        .push(AttributeInfo::new(source_file, file_name.to_be_bytes().to_vec()));

    let bytes = original.to_classfile_bytes();
    let parsed = ClassReader::new(&bytes).parse().unwrap();
    assert_eq!(parsed.class_name(), Some(HTTP_TARGET));
    assert_eq!(parsed.super_class_name(), Some("java/net/URLConnection"));
    assert_eq!(parsed.methods.len(), original.methods.len());
    assert_eq!(parsed.to_classfile_bytes(), bytes);
}

#[test]
fn rejects_wrong_magic() {
    let error = ClassReader::new(&[0x00, 0x00, 0x00, 0x2a]).parse().unwrap_err();
    assert_eq!(error, ReadError::BadMagic { found: 0x2a });
}

#[test]
fn reports_truncated_input_as_unexpected_eof() {
    let bytes = connection_class(HTTP_TARGET).to_classfile_bytes();
    let error = ClassReader::new(&bytes[..bytes.len() / 2]).parse().unwrap_err();
    assert!(matches!(error, ReadError::UnexpectedEof { .. }));
}

#[test]
fn rejects_trailing_bytes_after_the_class() {
    let mut bytes = connection_class(HTTP_TARGET).to_classfile_bytes();
    bytes.push(0);
    let error = ClassReader::new(&bytes).parse().unwrap_err();
    assert_eq!(error, ReadError::TrailingBytes { count: 1 });
}

#[test]
fn rejects_unknown_constant_pool_tags() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 52]); // minor 0, major 52
    bytes.extend_from_slice(&2u16.to_be_bytes()); // one pool slot
    bytes.push(99);
    let error = ClassReader::new(&bytes).parse().unwrap_err();
    assert_eq!(error, ReadError::UnknownConstantTag { tag: 99, index: 1 });
}

#[test]
fn rejects_invalid_utf8_in_the_pool() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 52]);
    bytes.extend_from_slice(&2u16.to_be_bytes());
    bytes.push(1); // Utf8, one byte, 0xff
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.push(0xff);
    let error = ClassReader::new(&bytes).parse().unwrap_err();
    assert_eq!(error, ReadError::InvalidUtf8 { index: 1 });
}

#[test]
fn long_constants_occupy_two_pool_slots() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 52]);
    bytes.extend_from_slice(&5u16.to_be_bytes()); // four slots, the Long takes two
    bytes.push(5); // Long
    bytes.extend_from_slice(&0x1122_3344_5566_7788u64.to_be_bytes());
    bytes.push(1); // Utf8 "Wide" at slot 3
    bytes.extend_from_slice(&4u16.to_be_bytes());
    bytes.extend_from_slice(b"Wide");
    bytes.push(7); // Class at slot 4
    bytes.extend_from_slice(&3u16.to_be_bytes());
    bytes.extend_from_slice(&access_flags::ACC_PUBLIC.to_be_bytes());
    bytes.extend_from_slice(&4u16.to_be_bytes()); // this_class
    bytes.extend_from_slice(&0u16.to_be_bytes()); // super_class
    bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]); // no interfaces, fields, methods, attributes

    let parsed = ClassReader::new(&bytes).parse().unwrap();
    assert_eq!(parsed.constant_pool.get(1), Some(&Constant::Long(0x1122_3344_5566_7788)));
    assert_eq!(parsed.constant_pool.get(2), Some(&Constant::Placeholder));
    assert_eq!(parsed.class_name(), Some("Wide"));
    assert_eq!(parsed.to_classfile_bytes(), bytes);
}

#[test]
fn wide_constant_in_the_last_pool_slot_is_rejected() {
    // the count claims slots 1 through 65534; a Long landing at 65534
    // would spill its second slot past the end of the pool
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 52]);
    bytes.extend_from_slice(&u16::MAX.to_be_bytes());
    bytes.push(3); // Integer at slot 1
    bytes.extend_from_slice(&7u32.to_be_bytes());
    for _ in 0..32_767 {
        bytes.push(5); // Longs at slots 2-3, 4-5, .., the last at 65534
        bytes.extend_from_slice(&0u64.to_be_bytes());
    }

    let error = ClassReader::new(&bytes).parse().unwrap_err();
    assert_eq!(error, ReadError::WideConstantOverrun { index: 65_534 });
}

#[test]
fn float_bit_patterns_survive_exactly() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 52]);
    bytes.extend_from_slice(&4u16.to_be_bytes());
    bytes.push(4); // Float with a NaN payload no arithmetic would preserve
    bytes.extend_from_slice(&0x7fc0_0001u32.to_be_bytes());
    bytes.push(1);
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.push(b'F');
    bytes.push(7);
    bytes.extend_from_slice(&2u16.to_be_bytes());
    bytes.extend_from_slice(&access_flags::ACC_PUBLIC.to_be_bytes());
    bytes.extend_from_slice(&3u16.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);

    let parsed = ClassReader::new(&bytes).parse().unwrap();
    assert!(matches!(
        parsed.constant_pool.get(1),
        Some(Constant::Float(value)) if value.to_bits() == 0x7fc0_0001
    ));
    assert_eq!(parsed.to_classfile_bytes(), bytes);
}

#[test]
fn declared_method_finds_only_declared_names() {
    let class_file = connection_class(HTTP_TARGET);
    assert_eq!(class_file.declared_method("disconnect"), Some(0));
    assert_eq!(class_file.declared_method("connect"), Some(1));
    assert_eq!(class_file.declared_method("finalize"), None);
}
