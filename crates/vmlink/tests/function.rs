//! Host functions, calls and multivalues.

use std::sync::Arc;

use vmlink::{Backend, Error, Value, Vm};

fn new_vm() -> Vm {
    Vm::new(Backend::from_api(vmlink_heap::api()).unwrap()).unwrap()
}

#[test]
fn test_call_returns_results_in_order() {
    let vm = new_vm();
    let reverse = vm
        .create_function(|_, args| Ok(args.into_iter().rev().collect()))
        .unwrap();
    let rets = reverse.call(&[1.into(), "two".into(), true.into()]).unwrap();
    assert_eq!(rets.len(), 3);
    assert_eq!(rets[0].as_boolean(), Some(true));
    assert_eq!(rets[1].to_string(), "two");
    assert_eq!(rets[2].as_integer(), Some(1));

    assert!(reverse.call(&[]).unwrap().is_empty());
}

#[test]
fn test_callback_receives_vm() {
    let vm = new_vm();
    let wrap = vm
        .create_function(|vm, args| {
            let t = vm.create_table()?;
            for arg in args {
                t.push(arg)?;
            }
            Ok(vec![t.into()])
        })
        .unwrap();
    let rets = wrap.call(&[10.into(), 20.into()]).unwrap();
    let t = rets[0].as_table().unwrap();
    assert_eq!(t.raw_len().unwrap(), 2);
    assert_eq!(t.raw_get(2).unwrap().as_integer(), Some(20));
}

#[test]
fn test_error_propagates() {
    let vm = new_vm();
    let failing = vm
        .create_function(|_, _| Err(Error::external("something went wrong")))
        .unwrap();
    assert_eq!(
        failing.call(&[]).unwrap_err(),
        Error::Native("something went wrong".into())
    );
}

#[test]
fn test_panic_becomes_error() {
    let vm = new_vm();
    let panicking = vm.create_function(|_, _| panic!("kaboom")).unwrap();
    match panicking.call(&[]) {
        Err(Error::Native(msg)) => {
            assert!(msg.contains("panic"), "{}", msg);
            assert!(msg.contains("kaboom"), "{}", msg);
        }
        other => panic!("unexpected {:?}", other),
    }
    // A failed call leaves the function usable.
    assert!(panicking.call(&[]).is_err());
}

#[test]
fn test_function_stored_in_table() {
    let vm = new_vm();
    let double = vm
        .create_function(|_, args| {
            let n = args.first().and_then(Value::as_integer).unwrap_or_default();
            Ok(vec![(n * 2).into()])
        })
        .unwrap();
    let t = vm.create_table().unwrap();
    t.set("double", double.clone()).unwrap();
    double.close().unwrap();

    let stored = t.get("double").unwrap();
    let f = stored.as_function().unwrap();
    assert_eq!(f.call(&[21.into()]).unwrap()[0].as_integer(), Some(42));
    assert!(f.to_pointer().unwrap() != 0);
}

#[test]
fn test_closing_function_releases_closure() {
    let vm = new_vm();
    let marker = Arc::new(());
    let captured = marker.clone();
    let f = vm
        .create_function(move |_, _| {
            let _ = &captured;
            Ok(Vec::new())
        })
        .unwrap();
    assert_eq!(Arc::strong_count(&marker), 2);

    f.close().unwrap();
    assert_eq!(Arc::strong_count(&marker), 1);
    assert!(f.call(&[]).unwrap_err().is_closed_handle());
}

#[test]
fn test_nested_calls() {
    let vm = new_vm();
    let inner = vm.create_function(|_, _| Ok(vec![7.into()])).unwrap();
    let outer = vm
        .create_function(move |_, _| {
            let mut rets = inner.call(&[])?;
            rets.push(8.into());
            Ok(rets)
        })
        .unwrap();
    let rets = outer.call(&[]).unwrap();
    let ints: Vec<_> = rets.iter().filter_map(Value::as_integer).collect();
    assert_eq!(ints, vec![7, 8]);
}

#[test]
fn test_multivalue_fifo() {
    let vm = new_vm();
    let mut mv = vm.create_multivalue(2).unwrap();
    assert!(mv.is_empty());
    mv.push(&1.into()).unwrap();
    mv.push(&"x".into()).unwrap();
    assert_eq!(mv.len(), 2);

    assert_eq!(mv.pop().as_integer(), Some(1));
    assert!(matches!(mv.pop(), Value::String(_)));
    assert!(mv.pop().is_nil());
    assert!(mv.pop().is_nil());
}

#[test]
fn test_thread_handle() {
    let vm = new_vm();
    let f = vm.create_function(|_, _| Ok(Vec::new())).unwrap();
    let co = vm.create_thread(&f).unwrap();
    let t = vm.create_table().unwrap();
    t.set("co", co.clone()).unwrap();
    assert!(matches!(t.get("co").unwrap(), Value::Thread(_)));

    co.close().unwrap();
    assert!(co.is_closed());
    f.close().unwrap();
    assert!(vm.create_thread(&f).unwrap_err().is_closed_handle());
}
