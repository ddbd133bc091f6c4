//! Process-level failure handling.
//!
//! Allocation failures are never propagated as values: the process logs what it
//! can, optionally dumps a backtrace, and aborts.

use std::backtrace::Backtrace;

/// Environment toggle for dumping a backtrace before aborting.
pub const BACKTRACE_DUMP_ENV: &str = "CONFLUX_BACKTRACE_DUMP";

/// Parse a boolean-like flag (`1`, `true`, `yes`, `on`).
pub fn flag_enabled(raw: Option<&str>) -> bool {
    match raw {
        Some(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => false,
    }
}

pub fn backtrace_dump_enabled() -> bool {
    flag_enabled(std::env::var(BACKTRACE_DUMP_ENV).ok().as_deref())
}

/// Abort after failing to allocate `bytes`.
pub fn allocation_failure(bytes: usize) -> ! {
    tracing::error!(bytes, "allocation failed, aborting");
    if backtrace_dump_enabled() {
        eprintln!("{}", Backtrace::force_capture());
    }
    std::process::abort()
}

/// Allocate a zero-filled buffer of `len` bytes or abort.
pub fn alloc_zeroed(len: usize) -> Vec<u8> {
    let mut v: Vec<u8> = Vec::new();
    if v.try_reserve_exact(len).is_err() {
        allocation_failure(len);
    }
    v.resize(len, 0);
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing() {
        assert!(flag_enabled(Some("1")));
        assert!(flag_enabled(Some(" TRUE ")));
        assert!(flag_enabled(Some("on")));
        assert!(!flag_enabled(Some("0")));
        assert!(!flag_enabled(Some("nope")));
        assert!(!flag_enabled(None));
    }

    #[test]
    fn alloc_zeroed_len() {
        let v = alloc_zeroed(16);
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|b| *b == 0));
    }
}
