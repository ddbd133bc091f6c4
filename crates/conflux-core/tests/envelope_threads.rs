#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use conflux_core::msg::{Data, Msg};
use conflux_core::{SharedMsg, Value};

/// Counts live instances so the test can see when the payload is freed.
struct DropCounter(Arc<AtomicUsize>);

impl DropCounter {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live.clone())
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn sharing_across_threads_frees_exactly_once() {
    let live = Arc::new(AtomicUsize::new(0));

    let mut data = Data::new("tracked");
    data.set_property("tracked", Value::ptr(DropCounter::new(&live))).unwrap();
    let shared = SharedMsg::share(data);
    assert_eq!(live.load(Ordering::SeqCst), 1);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let h = shared.clone();
            thread::spawn(move || {
                assert_eq!(h.name(), "tracked");
                let copies: Vec<SharedMsg> = (0..16).map(|_| h.clone()).collect();
                drop(copies);
                drop(h);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(shared.handle_count(), 1);
    assert_eq!(live.load(Ordering::SeqCst), 1);
    drop(shared);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn copied_payload_shares_pointer_values() {
    let live = Arc::new(AtomicUsize::new(0));
    let mut data = Data::new("tracked");
    data.set_property("tracked", Value::ptr(DropCounter::new(&live))).unwrap();

    let a = SharedMsg::share(data);
    let b = a.clone();
    let owned = a.into_message();
    drop(b);
    assert_eq!(live.load(Ordering::SeqCst), 1);
    drop(owned);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}
