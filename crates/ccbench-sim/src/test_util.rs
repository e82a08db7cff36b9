use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::topology::Namespace;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Check whether we have sufficient privileges (root or passwordless sudo)
/// and tools (`ip`) to create network namespaces. Probes by creating a
/// throwaway namespace. Returns `false` if the environment cannot support
/// namespace-based tests.
pub fn check_privileges() -> bool {
    let has_ip = match Command::new("ip").arg("netns").output() {
        Ok(o) => o.status.success(),
        Err(_) => false,
    };
    if !has_ip {
        return false;
    }

    // SAFETY: geteuid has no preconditions and cannot fail.
    let is_root = unsafe { libc::geteuid() } == 0;
    if !is_root {
        let sudo_ok = Command::new("sudo")
            .args(["-n", "true"])
            .status()
            .is_ok_and(|s| s.success());
        if !sudo_ok {
            return false;
        }
    }

    Namespace::new(&unique_prefix("probe")).is_ok()
}

/// Generates a unique namespace prefix for parallel test runs.
///
/// Combines the given tag, process ID, and an atomic counter.
pub fn unique_prefix(tag: &str) -> String {
    let seq = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    format!("{}{:x}{}", tag, pid % 0xFFFF, seq)
}
