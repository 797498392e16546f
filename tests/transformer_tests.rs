use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use timeout_weaver::classfile::opcodes;
use timeout_weaver::classfile::{ClassFile, ClassfileWritable};
use timeout_weaver::engine::TransformError;
use timeout_weaver::pool::{ClassPool, MemorySource};
use timeout_weaver::{TimeoutDefaults, TimeoutTransformer};

mod common;
use common::{
    connection_class, instrumented_connection_class, memory_pool, parsed_connect_code,
    subclass_without_connect, CountingSource, HTTPS_TARGET, HTTP_TARGET,
};

fn scenario_defaults() -> TimeoutDefaults {
    TimeoutDefaults::new(5, 10).unwrap()
}

fn transformer_over(classes: Vec<ClassFile>) -> TimeoutTransformer {
    TimeoutTransformer::new(scenario_defaults(), Arc::new(memory_pool(classes)))
}

#[test]
fn unregistered_classes_pass_through_byte_identical() {
    let transformer = transformer_over(vec![connection_class(HTTP_TARGET)]);
    // not even valid class data; passthrough must not look at it
    let bytes = b"\xde\xad\xbe\xef definitely not a class file".to_vec();
    let out = transformer.transform("com/example/shop/Checkout", &bytes).unwrap();
    assert_eq!(out, bytes);
}

#[test]
fn passthrough_never_touches_the_pool() {
    let mut inner = MemorySource::new();
    inner.insert(HTTP_TARGET, connection_class(HTTP_TARGET).to_classfile_bytes());
    let (source, loads) = CountingSource::new(inner);
    let pool = Arc::new(ClassPool::with_source(Box::new(source)));
    let transformer = TimeoutTransformer::new(scenario_defaults(), pool);

    for name in [
        "java/net/HttpURLConnection",
        "sun/net/www/protocol/https/DelegateHttpsURLConnection",
        "sun/net/www/protocol/http/httpurlconnection",
        "sun.net.www.protocol.http.HttpURLConnection",
    ] {
        let out = transformer.transform(name, &[1, 2, 3]).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[test]
fn both_registered_classes_are_patched_from_the_pool_view() {
    let transformer = transformer_over(vec![
        connection_class(HTTP_TARGET),
        connection_class(HTTPS_TARGET),
    ]);
    for name in [HTTP_TARGET, HTTPS_TARGET] {
        // host-supplied bytes are ignored for registered names
        let out = transformer.transform(name, b"stale host copy").unwrap();
        let (class_file, code_attr) = parsed_connect_code(&out);
        assert_eq!(class_file.class_name(), Some(name));
        assert_eq!(code_attr.code[8], opcodes::ICONST_5);
        assert_eq!(code_attr.code[20], opcodes::BIPUSH);
        assert_eq!(code_attr.code[21], 10);
    }
}

#[test]
fn registered_class_without_declared_connect_is_fatal() {
    let transformer = transformer_over(vec![
        connection_class(HTTP_TARGET),
        subclass_without_connect(HTTPS_TARGET, HTTP_TARGET),
    ]);
    let error = transformer.transform(HTTPS_TARGET, &[]).unwrap_err();
    assert_eq!(error.class_name(), HTTPS_TARGET);
    assert_eq!(
        error.to_string(),
        format!("transformation of {} failed: no declared method connect", HTTPS_TARGET)
    );
    assert!(matches!(error, TransformError::MethodNotFound { .. }));
}

#[test]
fn unresolvable_registered_class_is_fatal_even_with_host_bytes() {
    let transformer = transformer_over(Vec::new());
    let host_bytes = connection_class(HTTP_TARGET).to_classfile_bytes();
    let error = transformer.transform(HTTP_TARGET, &host_bytes).unwrap_err();
    assert!(matches!(error, TransformError::UnitUnresolved { .. }));
    assert_eq!(error.class_name(), HTTP_TARGET);
}

#[test]
fn repeat_invocations_produce_identical_output() {
    let transformer = transformer_over(vec![instrumented_connection_class(HTTP_TARGET)]);
    let first = transformer.transform(HTTP_TARGET, &[]).unwrap();
    // feeding the patched bytes back must not stack a second prologue
    let second = transformer.transform(HTTP_TARGET, &first).unwrap();
    assert_eq!(second, first);

    let (_, code_attr) = parsed_connect_code(&second);
    assert_eq!(code_attr.code.len(), 28 + 11);
}

#[test]
fn the_pool_is_left_clean_after_transformations() {
    let pool = Arc::new(memory_pool(vec![
        connection_class(HTTP_TARGET),
        subclass_without_connect(HTTPS_TARGET, HTTP_TARGET),
    ]));
    let transformer = TimeoutTransformer::new(scenario_defaults(), Arc::clone(&pool));

    // a successful patch detaches its unit
    transformer.transform(HTTP_TARGET, &[]).unwrap();
    assert_eq!(pool.attached_len(), 0);

    // a failed lookup re-attaches the unit it never touched
    transformer.transform(HTTPS_TARGET, &[]).unwrap_err();
    assert!(pool.is_attached(HTTPS_TARGET));
}

#[test]
fn transformer_is_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<TimeoutTransformer>();

    let transformer = Arc::new(transformer_over(vec![
        connection_class(HTTP_TARGET),
        connection_class(HTTPS_TARGET),
    ]));
    let expected = transformer.transform(HTTP_TARGET, &[]).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let transformer = Arc::clone(&transformer);
            thread::spawn(move || transformer.transform(HTTP_TARGET, &[]).unwrap())
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), expected);
    }
}
