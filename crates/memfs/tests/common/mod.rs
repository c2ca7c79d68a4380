//! Test host: registers an `FsOps` implementation backed by std.

use std::cell::Cell;
use std::sync::Once;
use std::sync::atomic::{AtomicI64, Ordering};

use memfs::{Cred, FsOps, TimeSpec};

static INIT: Once = Once::new();

thread_local! {
    static CRED: Cell<Cred> = const { Cell::new(Cred { uid: 0, gid: 0 }) };
}

struct TestHost {
    clock_ns: AtomicI64,
}

impl FsOps for TestHost {
    fn page_size(&self) -> usize {
        4096
    }

    fn timespec_now(&self) -> TimeSpec {
        let ns = self.clock_ns.fetch_add(1, Ordering::Relaxed);
        TimeSpec::new(ns / 1_000_000_000, ns % 1_000_000_000)
    }

    fn current_cred(&self) -> Cred {
        CRED.with(Cell::get)
    }
}

static TEST_HOST: TestHost = TestHost {
    clock_ns: AtomicI64::new(1_700_000_000_000_000_000),
};

pub fn init_once() {
    INIT.call_once(|| unsafe {
        memfs::register_fs_ops(&TEST_HOST);
    });
}

/// Runs `f` with the calling thread's credentials set to `cred`.
#[allow(dead_code)]
pub fn with_cred<R>(cred: Cred, f: impl FnOnce() -> R) -> R {
    let prev = CRED.with(|c| c.replace(cred));
    let out = f();
    CRED.with(|c| c.set(prev));
    out
}
