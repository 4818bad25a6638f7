//! Shared helpers for the test suites
//!
//! Builders for the common chain shapes the tests exercise, plus an
//! environment guard that points the storage paths at a temporary directory.
//! `CORDON_DATA_DIR`/`CORDON_STATE_DIR` are process-wide, so tests that touch
//! them must serialize through [`TestDirs::new`].

use crate::core::chain::{Action, Chain, PortRange, Protocol, Rule};
use crate::core::reconcile::{Intent, Workload};
use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

/// Temporary storage directories, held for the duration of a test.
///
/// The mutex guard serializes all tests that read or write the environment
/// overrides; the tempdir is removed on drop.
pub struct TestDirs {
    _guard: MutexGuard<'static, ()>,
    pub dir: tempfile::TempDir,
}

impl TestDirs {
    pub fn new() -> Self {
        let guard = ENV_MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let dir = tempfile::tempdir().unwrap();
        // SAFETY: the mutex guard above keeps other tests from reading these
        // variables while they are set.
        unsafe {
            std::env::set_var("CORDON_DATA_DIR", dir.path().join("data"));
            std::env::set_var("CORDON_STATE_DIR", dir.path().join("state"));
        }
        crate::utils::ensure_dirs().unwrap();

        Self { _guard: guard, dir }
    }
}

impl Drop for TestDirs {
    fn drop(&mut self) {
        unsafe {
            std::env::remove_var("CORDON_DATA_DIR");
            std::env::remove_var("CORDON_STATE_DIR");
        }
    }
}

/// An admin DROP rule for a single tcp port.
pub fn admin_deny(port: u16) -> Rule {
    Rule::admin(
        format!("block tcp/{port}"),
        Protocol::Tcp,
        Some(PortRange::single(port)),
        None,
        Action::Drop,
    )
}

/// An admin ACCEPT rule for a single tcp port.
pub fn admin_allow(port: u16) -> Rule {
    Rule::admin(
        format!("allow tcp/{port}"),
        Protocol::Tcp,
        Some(PortRange::single(port)),
        None,
        Action::Accept,
    )
}

/// A runtime-injected publish rule for a single tcp port.
pub fn runtime_publish(workload: &str, port: u16) -> Rule {
    Rule::runtime(
        workload,
        format!("publish {workload} tcp/{port}"),
        Protocol::Tcp,
        Some(PortRange::single(port)),
    )
}

/// The documented bypass shape: runtime ACCEPT at the head, admin DROP
/// behind it, both for the same port.
pub fn bypass_chain(port: u16) -> Chain {
    let mut chain = Chain::new(Action::Drop);
    chain.append(admin_deny(port));
    chain.insert_head(runtime_publish("api", port));
    chain
}

/// An intent with one deny rule and one workload publishing the same port.
pub fn conflicted_intent(port: u16) -> Intent {
    let mut intent = Intent::new();
    intent.rules.push(admin_deny(port));
    intent.workloads.push(Workload::new(
        "api",
        vec![format!("{port}:8080/tcp").parse().unwrap()],
    ));
    intent
}
