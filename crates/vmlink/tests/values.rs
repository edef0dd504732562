//! Value marshaling: scalar round-trips, clone-on-send for handle-backed
//! values, and conversion failures.

use std::ffi::c_void;

use vmlink::abi::Tag;
use vmlink::{Backend, Error, LightUserData, Table, Value, Vm};

fn new_vm() -> Vm {
    Vm::new(Backend::from_api(vmlink_heap::api()).unwrap()).unwrap()
}

/// Send `value` into a table slot and read it back.
fn roundtrip(t: &Table, value: Value) -> Value {
    t.raw_set(1, value).unwrap();
    t.raw_get(1).unwrap()
}

#[test]
fn test_scalar_roundtrip() {
    let vm = new_vm();
    let t = vm.create_table().unwrap();

    assert_eq!(roundtrip(&t, true.into()).as_boolean(), Some(true));
    assert_eq!(roundtrip(&t, false.into()).as_boolean(), Some(false));
    for i in [i64::MIN, -1, 0, i64::MAX] {
        assert_eq!(roundtrip(&t, i.into()).as_integer(), Some(i));
    }
    for n in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.5] {
        let back = roundtrip(&t, n.into()).as_number().unwrap();
        assert_eq!(back.to_bits(), n.to_bits(), "{}", n);
    }
    assert_eq!(roundtrip(&t, [1.0f32, 2.0, 3.0].into()).as_vector(), Some([1.0, 2.0, 3.0]));

    let p = LightUserData(0xdead_beef as *mut c_void);
    match roundtrip(&t, p.into()) {
        Value::LightUserData(back) => assert_eq!(back, p),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_roundtrip_through_call() {
    let vm = new_vm();
    let identity = vm.create_function(|_, args| Ok(args)).unwrap();
    let args: Vec<Value> = vec![
        Value::Nil,
        i64::MIN.into(),
        f64::NAN.into(),
        [1.0f32, 2.0, 3.0].into(),
        "text".into(),
    ];
    let rets = identity.call(&args).unwrap();
    assert_eq!(rets.len(), 5);
    assert!(rets[0].is_nil());
    assert_eq!(rets[1].as_integer(), Some(i64::MIN));
    assert_eq!(rets[2].as_number().map(f64::to_bits), Some(f64::NAN.to_bits()));
    assert_eq!(rets[3].as_vector(), Some([1.0, 2.0, 3.0]));
    assert_eq!(rets[4].to_string(), "text");
}

#[test]
fn test_string_send_clones() {
    let vm = new_vm();
    let t = vm.create_table().unwrap();
    let s = vm.create_string("hello").unwrap();

    t.set("k", s.clone()).unwrap();
    // The original handle is untouched by sending it.
    assert_eq!(s.as_bytes().unwrap(), b"hello");
    assert_eq!(s.as_bytes_with_nul().unwrap(), b"hello\0");

    s.close().unwrap();
    // The table holds its own reference.
    let stored = t.get("k").unwrap();
    assert_eq!(stored.as_string().unwrap().to_string_lossy().unwrap(), "hello");
}

#[test]
fn test_closed_value_fails_conversion() {
    let vm = new_vm();
    let t = vm.create_table().unwrap();
    let s = vm.create_string("gone").unwrap();
    s.close().unwrap();

    match t.set("k", s) {
        Err(Error::Conversion(msg)) => assert!(msg.contains("closed string"), "{}", msg),
        other => panic!("unexpected {:?}", other),
    }
    assert!(t.is_empty().unwrap());
}

#[test]
fn test_host_string_arrives_as_string() {
    let vm = new_vm();
    let t = vm.create_table().unwrap();
    let back = roundtrip(&t, "abc".into());
    assert!(matches!(back, Value::String(_)));
    assert_eq!(back.tag(), Tag::String);
    assert_eq!(back.to_string(), "abc");
}

#[test]
fn test_handle_backed_roundtrip() {
    let vm = new_vm();
    let t = vm.create_table().unwrap();

    let inner = vm.create_table().unwrap();
    inner.push(5).unwrap();
    let back = roundtrip(&t, inner.clone().into());
    let back = back.as_table().unwrap();
    assert!(back.equals(&inner).unwrap());

    let buf = vm.create_buffer([1u8, 2, 3]).unwrap();
    let back = roundtrip(&t, buf.into());
    assert_eq!(back.as_buffer().unwrap().to_vec().unwrap(), vec![1, 2, 3]);

    let err = vm.create_error("bad thing").unwrap();
    let back = roundtrip(&t, err.into());
    assert_eq!(back.as_error().unwrap().message().unwrap(), "bad thing");
    assert_eq!(back.type_name(), "error");
}

#[test]
fn test_value_close() {
    let vm = new_vm();
    let s = Value::from(vm.create_string("x").unwrap());
    let copy = s.clone();
    s.close().unwrap();
    // Clones share the handle.
    assert!(copy.as_string().unwrap().as_bytes().unwrap_err().is_closed_handle());

    // Non-handle values have nothing to close.
    Value::Integer(1).close().unwrap();
    Value::from("host").close().unwrap();
    Value::Other.close().unwrap();
}

#[test]
fn test_other_passes_through() {
    let vm = new_vm();
    let f = vm.create_function(|_, args| Ok(args)).unwrap();
    let rets = f.call(&[Value::Other]).unwrap();
    assert!(matches!(rets[0], Value::Other));
    assert_eq!(rets[0].type_name(), "other");
}
