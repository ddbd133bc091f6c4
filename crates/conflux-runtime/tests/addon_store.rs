#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use conflux_core::{ConfluxError, ErrorCode};
use conflux_runtime::addon::{
    Addon, AddonContext, AddonInstance, AddonKind, AddonStore, CreateDone, UnregisterPolicy,
};

/// Holds every completion until the test releases it.
#[derive(Default)]
struct Deferred {
    waiting: Mutex<Vec<CreateDone>>,
    destroyed: AtomicUsize,
}

impl Deferred {
    fn release_all(&self) {
        let waiting = std::mem::take(&mut *self.waiting.lock().unwrap());
        for done in waiting {
            done(Ok(AddonInstance::Other(Box::new(()))));
        }
    }
}

struct DeferredAddon(Arc<Deferred>);

impl Addon for DeferredAddon {
    fn create_instance(&self, _ctx: &AddonContext, _name: &str, done: CreateDone) {
        self.0.waiting.lock().unwrap().push(done);
    }

    fn destroy_instance(&self, _ctx: &AddonContext, _instance: AddonInstance) {
        self.0.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

fn store_with_deferred() -> (AddonStore, Arc<Deferred>) {
    let store = AddonStore::new();
    let state = Arc::new(Deferred::default());
    store
        .register(AddonKind::Protocol, "slow", Arc::new(DeferredAddon(state.clone())), None)
        .unwrap();
    (store, state)
}

fn request(store: &AddonStore, tx: &mpsc::Sender<Result<AddonInstance, ConfluxError>>) {
    let tx = tx.clone();
    store
        .create_instance(AddonKind::Protocol, "slow", "p", Box::new(move |r| {
            tx.send(r).unwrap();
        }))
        .unwrap();
}

#[tokio::test]
async fn drain_waits_for_pending_completions() {
    let (store, state) = store_with_deferred();
    let (tx, rx) = mpsc::channel();
    request(&store, &tx);
    request(&store, &tx);
    assert_eq!(store.in_flight(), 2);

    let draining = tokio::spawn({
        let store = store.clone();
        async move { store.unregister_all(UnregisterPolicy::Drain).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!draining.is_finished());

    // nothing new starts while draining
    let err = store
        .create_instance(AddonKind::Protocol, "slow", "late", Box::new(|_| {}))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cancelled);

    state.release_all();
    tokio::time::timeout(Duration::from_secs(2), draining)
        .await
        .expect("drain must finish once completions arrived")
        .unwrap();

    assert!(rx.try_recv().unwrap().is_ok());
    assert!(rx.try_recv().unwrap().is_ok());
    assert!(store.is_empty());
    assert_eq!(state.destroyed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_turns_late_completions_into_errors() {
    let (store, state) = store_with_deferred();
    let (tx, rx) = mpsc::channel();
    request(&store, &tx);

    store.unregister_all(UnregisterPolicy::Cancel).await;
    assert!(store.is_empty());

    state.release_all();
    let err = rx.try_recv().unwrap().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cancelled);
    // the instance made it back to its addon
    assert_eq!(state.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(store.in_flight(), 0);
}

#[tokio::test]
async fn completion_dropped_by_addon_does_not_block_drain() {
    let (store, state) = store_with_deferred();
    let (tx, _rx) = mpsc::channel();
    request(&store, &tx);
    state.waiting.lock().unwrap().clear();
    assert_eq!(store.in_flight(), 0);
    tokio::time::timeout(Duration::from_secs(1), store.unregister_all(UnregisterPolicy::Drain))
        .await
        .unwrap();
}

#[test]
fn addon_loaders_are_removed_with_the_rest() {
    let store = AddonStore::new();
    store
        .register(AddonKind::AddonLoader, "loader", Arc::new(DeferredAddon(Arc::default())), None)
        .unwrap();
    store
        .register(AddonKind::Extension, "ext", Arc::new(DeferredAddon(Arc::default())), None)
        .unwrap();
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    rt.block_on(store.unregister_all(UnregisterPolicy::Cancel));
    assert!(store.find(AddonKind::AddonLoader, "loader").is_none());
    assert!(store.is_empty());
}
