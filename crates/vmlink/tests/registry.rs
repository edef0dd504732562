//! Registry bookkeeping. Kept in its own test binary so that no other test
//! registers tokens concurrently with the baseline check.

use std::collections::HashSet;
use std::sync::Arc;

use vmlink::callback::{self, Callback};

#[test]
fn test_register_drop_cycles_return_to_baseline() {
    let baseline = callback::live_count();
    let mut tokens = HashSet::new();

    for i in 0..10_000usize {
        let token = if i % 2 == 0 {
            callback::register_callback(Callback::new(|_| Ok(())), None)
        } else {
            callback::register_data(Arc::new(i), None)
        };
        assert!(token != 0);
        assert!(tokens.insert(token), "token {} reused", token);
        assert_eq!(callback::live_count(), baseline + 1);

        let desc = callback::descriptor(token);
        unsafe { (desc.drop)(desc.token) };
        assert!(!callback::is_registered(token));
    }

    assert_eq!(callback::live_count(), baseline);
}
