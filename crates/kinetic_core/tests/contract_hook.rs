//! # Contract Hook Verification
//!
//! The violation hook is process-wide, so every test here installs its own
//! recorder and holds `HOOK_LOCK` until the default hook is restored.
//!
//! Run with: cargo test --package kinetic_core --test contract_hook

use std::sync::Arc;

use bytemuck::Zeroable;
use kinetic_core::{
    reset_violation_hook, set_violation_hook, ArenaAllocator, ArenaConfig, ArenaError, BitSet,
    IdPool, TypeSlabRegistry,
};
use parking_lot::{Mutex, MutexGuard};

static HOOK_LOCK: Mutex<()> = parking_lot::const_mutex(());

#[allow(dead_code)]
#[derive(Clone, Copy, Zeroable)]
#[repr(C)]
struct Manifold {
    depth: [f32; 8],
}

/// Collects violation messages while alive.
struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
    _serial: MutexGuard<'static, ()>,
}

impl Recorder {
    fn install() -> Self {
        let serial = HOOK_LOCK.lock();
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&seen);
        set_violation_hook(move |violation| {
            assert!(violation.location().file().ends_with(".rs"));
            sink.lock().push(violation.message().to_owned());
        });
        Self {
            seen,
            _serial: serial,
        }
    }

    fn messages(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        reset_violation_hook();
    }
}

fn arena(capacity: usize) -> ArenaAllocator {
    ArenaAllocator::with_registry(ArenaConfig::new(capacity), Arc::new(TypeSlabRegistry::new()))
}

#[test]
fn verify_out_of_order_drop_is_reclaimed() {
    let recorder = Recorder::install();

    // Dropping out of order is checked in every build.
    let mut arena = arena(64);
    let outer = arena.allocate_item::<Manifold>(8, "outer");
    let mut inner = arena.allocate_item::<Manifold>(8, "inner");
    inner[0].depth[0] = 0.5;
    assert_eq!(inner[0].depth[0], 0.5);
    drop(outer);
    assert_eq!(arena.allocation(), 16);
    drop(inner);

    let seen = recorder.messages();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("outer"));
    assert!(seen[0].contains("inner"));

    // The abandoned entry went with the one above it.
    assert_eq!(arena.allocation(), 0);
    assert_eq!(arena.grow(), Ok(0));
}

#[test]
fn verify_rejected_free_returns_the_item() {
    let recorder = Recorder::install();

    let mut arena = arena(16);
    let a = arena.allocate_item::<Manifold>(4, "a");
    let b = arena.allocate_item::<Manifold>(20, "b");
    assert!(b.used_malloc());

    let rejected = a.free().unwrap_err();
    assert!(matches!(
        rejected.error(),
        ArenaError::OutOfOrderFree {
            freed: "a",
            expected: "b",
            ..
        }
    ));
    assert_eq!(recorder.messages().len(), 1);
    assert!(recorder.messages()[0].contains("out-of-order free"));

    // Nothing changed; the caller can still release in order.
    let a = rejected.into_item();
    assert_eq!(a.len(), 4);
    assert_eq!(arena.allocation(), 24);
    b.free().unwrap();
    a.free().unwrap();

    assert_eq!(arena.allocation(), 0);
    assert_eq!(arena.grow(), Ok(1));
    assert_eq!(arena.capacity(), 36);
    assert_eq!(recorder.messages().len(), 1);
}

#[test]
fn verify_unissued_id_never_comes_back() {
    let recorder = Recorder::install();

    let mut pool = IdPool::new();
    assert_eq!(pool.allocate(), 0);
    pool.free(5);

    assert_eq!(pool.free_count(), 0);
    assert_eq!(pool.allocate(), 1);
    assert_eq!(pool.live_count(), 2);

    let expected = usize::from(cfg!(debug_assertions));
    assert_eq!(recorder.messages().len(), expected);
    if cfg!(debug_assertions) {
        assert!(recorder.messages()[0].contains("never issued"));
    }
}

#[test]
fn verify_debug_checks_reach_installed_hook() {
    let recorder = Recorder::install();

    // An empty pool fails both issuance checks.
    let mut pool = IdPool::new();
    pool.free(0);
    assert!(pool.is_empty());
    let mut bits = BitSet::new(64);
    bits.set_bit(64);
    assert!(!bits.get_bit(64));

    let seen = recorder.messages();
    if cfg!(debug_assertions) {
        assert_eq!(seen.len(), 3);
        assert!(seen[0].contains("empty id pool"));
        assert!(seen[1].contains("never issued"));
        assert!(seen[2].contains("beyond bit capacity"));
    } else {
        assert!(seen.is_empty());
    }
}
