//! Re-entrancy guard that stops a handler from being re-entered by its own
//! synchronous side effects.

use std::cell::Cell;

/// One flag per binding. Not a lock: it only sees the current call stack.
#[derive(Debug, Default)]
pub struct EchoGuard {
    active: Cell<bool>,
}

impl EchoGuard {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Run `f` unless an exclusive section is already running.
    ///
    /// A skipped call is dropped, not queued, and returns None. The flag is
    /// cleared when `f` finishes, including by unwinding.
    pub fn run_exclusive<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if self.active.replace(true) {
            tracing::trace!("dropping re-entrant call");
            return None;
        }
        let _reset = Reset(&self.active);
        Some(f())
    }
}

struct Reset<'a>(&'a Cell<bool>);

impl Drop for Reset<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn test_nested_call_is_dropped() {
        let guard = EchoGuard::new();
        let mut inner_ran = false;

        let outer = guard.run_exclusive(|| {
            assert!(guard.is_active());
            inner_ran = guard.run_exclusive(|| ()).is_some();
            7
        });

        assert_eq!(outer, Some(7));
        assert!(!inner_ran);
        assert!(!guard.is_active());
    }

    #[test]
    fn test_sequential_calls_run() {
        let guard = EchoGuard::new();
        assert_eq!(guard.run_exclusive(|| 1), Some(1));
        assert_eq!(guard.run_exclusive(|| 2), Some(2));
    }

    #[test]
    fn test_flag_cleared_on_panic() {
        let guard = EchoGuard::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            guard.run_exclusive(|| panic!("handler failed"));
        }));
        assert!(result.is_err());
        assert!(!guard.is_active());
        assert_eq!(guard.run_exclusive(|| "ran"), Some("ran"));
    }
}
