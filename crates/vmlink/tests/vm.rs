//! VM lifecycle, configuration, userdata, buffers and backend loading.

use vmlink::callback;
use vmlink::{
    Backend, ChunkMode, ChunkOptions, CompilerOptions, DebugLevel, Error, OptimizationLevel, Value, Vm,
};

fn new_vm() -> Vm {
    Vm::new(Backend::from_api(vmlink_heap::api()).unwrap()).unwrap()
}

#[test]
fn test_memory_limit() {
    let vm = new_vm();
    vm.set_memory_limit(1024).unwrap();
    match vm.create_table_with_capacity(1_000_000, 0) {
        Err(Error::Native(msg)) => assert!(msg.contains("not enough memory"), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
    vm.create_table_with_capacity(4, 4).unwrap();
}

#[test]
fn test_compiler_options() {
    let vm = new_vm();
    assert_eq!(vm.compiler_options(), CompilerOptions::default());
    let opts = CompilerOptions {
        optimization_level: OptimizationLevel::Full,
        debug_level: DebugLevel::Full,
        ..Default::default()
    };
    vm.set_compiler_options(opts).unwrap();
    assert_eq!(vm.compiler_options(), opts);
}

#[test]
fn test_load_reports_native_errors() {
    let vm = new_vm();
    assert_eq!(
        vm.load("", &ChunkOptions::named("main")).unwrap_err(),
        Error::Native("main: chunk is empty".into())
    );

    let env = vm.create_table().unwrap();
    env.set_safeenv(true);
    let opts = ChunkOptions::named("main")
        .with_env(env)
        .with_mode(ChunkMode::Text)
        .with_compiler(CompilerOptions::default());
    match vm.load("return 1", &opts) {
        Err(Error::Native(msg)) => assert!(msg.starts_with("main: "), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_load_with_closed_env() {
    let vm = new_vm();
    let env = vm.create_table().unwrap();
    env.close().unwrap();
    let err = vm.load("return 1", &ChunkOptions::default().with_env(env)).unwrap_err();
    assert!(err.is_closed_handle());
}

#[test]
fn test_closed_vm() {
    let vm = new_vm();
    let clone = vm.clone();
    assert!(vm.ptr_eq(&clone));
    vm.close().unwrap();
    assert!(clone.is_closed());
    assert_eq!(
        clone.create_table().unwrap_err(),
        Error::ClosedHandle { kind: "vm" }
    );
    assert!(clone.set_memory_limit(1).is_err());
    assert_eq!(
        clone.create_error("late").unwrap_err(),
        Error::ClosedHandle { kind: "vm" }
    );
    assert!(clone.create_multivalue(1).unwrap_err().is_closed_handle());
    assert!(clone.create_string("late").unwrap_err().is_closed_handle());
    vm.close().unwrap();
}

struct Counter(u32);

#[test]
fn test_userdata_associated_data() {
    let vm = new_vm();
    let mt = vm.create_table().unwrap();
    let ud = vm.create_userdata(Counter(5), Some(&mt)).unwrap();
    assert_eq!(ud.data::<Counter>().unwrap().unwrap().0, 5);
    assert!(ud.data::<String>().unwrap().is_none());

    let token = ud.token().unwrap();
    assert!(callback::is_registered(token));

    // A table reference keeps the userdata, and its data, alive.
    let t = vm.create_table().unwrap();
    t.set("ud", ud.clone()).unwrap();
    ud.close().unwrap();
    assert!(callback::is_registered(token));

    let stored = t.get("ud").unwrap();
    let stored = stored.as_userdata().unwrap();
    let data = stored.associated_data().unwrap().unwrap();
    assert_eq!(data.downcast_ref::<Counter>().map(|c| c.0), Some(5));
    stored.close().unwrap();

    // Removing the last native reference drops the token.
    t.clear().unwrap();
    assert!(!callback::is_registered(token));
    assert!(ud.token().unwrap_err().is_closed_handle());
}

#[test]
fn test_buffer() {
    let vm = new_vm();
    let buf = vm.create_buffer([1u8, 2, 3]).unwrap();
    assert_eq!(buf.len().unwrap(), 3);
    buf.write(1, &[9]).unwrap();
    assert_eq!(buf.to_vec().unwrap(), vec![1, 9, 3]);

    let mut out = [0u8; 2];
    buf.read(1, &mut out).unwrap();
    assert_eq!(out, [9, 3]);
    assert!(matches!(buf.read(2, &mut out), Err(Error::Native(_))));
    assert!(buf.write(3, &[1]).is_err());

    let empty = vm.create_buffer([]).unwrap();
    assert!(empty.is_empty().unwrap());
}

#[test]
fn test_error_value() {
    let vm = new_vm();
    let err = vm.create_error("bad input").unwrap();
    assert_eq!(err.message().unwrap(), "bad input");
    let value = Value::from(err.clone());
    assert_eq!(value.type_name(), "error");
    err.close().unwrap();
    assert!(err.message().unwrap_err().is_closed_handle());
}

#[test]
fn test_string_identity() {
    let vm = new_vm();
    let s = vm.create_string(b"bytes\xff").unwrap();
    assert_eq!(s.as_bytes().unwrap(), b"bytes\xff");
    assert_eq!(s.to_string_lossy().unwrap(), "bytes\u{fffd}");
    assert_eq!(s.to_pointer().unwrap(), s.clone().to_pointer().unwrap());
}

#[test]
fn test_backend_version_check() {
    let mut api = vmlink_heap::api();
    api.version = 99;
    assert_eq!(
        Backend::from_api(api).unwrap_err(),
        Error::AbiMismatch { expected: 1, found: 99 }
    );
}

#[test]
fn test_backend_open_missing_library() {
    match Backend::open("/nonexistent/libvmlink_missing.so") {
        Err(Error::Load(_)) => {}
        other => panic!("unexpected {:?}", other),
    }
}
