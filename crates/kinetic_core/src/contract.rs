//! # Contract Violations
//!
//! The single boundary through which invariant violations surface when
//! there is no `Result` to carry them: debug-only checks (id pool frees,
//! bit indices) and the LIFO check an [`ArenaItem`] runs when it is
//! dropped without an explicit `free`.
//!
//! The default hook logs the violation and panics. Tools that want to keep
//! running (editors, fuzzers) can install their own hook.
//!
//! [`ArenaItem`]: crate::memory::ArenaItem

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::RwLock;

/// Callback invoked for every contract violation.
pub type ViolationHook = Arc<dyn Fn(&ContractViolation) + Send + Sync>;

static HOOK: RwLock<Option<ViolationHook>> = parking_lot::const_rwlock(None);

/// A detected misuse of the substrate.
#[derive(Clone, Debug)]
pub struct ContractViolation {
    message: String,
    location: &'static Location<'static>,
}

impl ContractViolation {
    /// Human readable description of the violated invariant.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Call site that detected the violation.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contract violation at {}: {}", self.location, self.message)
    }
}

/// Installs a process-wide violation hook, replacing the previous one.
pub fn set_violation_hook<F>(hook: F)
where
    F: Fn(&ContractViolation) + Send + Sync + 'static,
{
    *HOOK.write() = Some(Arc::new(hook));
}

/// Restores the default log-and-panic behaviour.
pub fn reset_violation_hook() {
    *HOOK.write() = None;
}

/// Reports a violation through the installed hook.
///
/// With the default hook this panics, unless the thread is already
/// unwinding, in which case the violation is only logged.
#[track_caller]
pub(crate) fn violation(message: fmt::Arguments<'_>) {
    let violation = ContractViolation {
        message: message.to_string(),
        location: Location::caller(),
    };

    // Clone out of the lock so a hook may reinstall hooks.
    let hook = HOOK.read().clone();
    match hook {
        Some(hook) => hook(&violation),
        None => {
            tracing::error!("{}", violation);
            if !std::thread::panicking() {
                panic!("{violation}");
            }
        }
    }
}

/// Reports a violation that leaves no way to continue.
#[track_caller]
pub(crate) fn fatal(message: fmt::Arguments<'_>) -> ! {
    violation(message);
    panic!("unrecoverable contract violation: {message}");
}

/// Checks `$cond` in debug builds only, reporting through [`violation`].
macro_rules! debug_contract {
    ($cond:expr, $($arg:tt)+) => {
        if cfg!(debug_assertions) && !($cond) {
            $crate::contract::violation(format_args!($($arg)+));
        }
    };
}

pub(crate) use debug_contract;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "contract violation")]
    fn test_default_hook_panics() {
        violation(format_args!("bad index {}", 7));
    }

    #[test]
    fn test_debug_contract_passes_when_condition_holds() {
        debug_contract!(1 + 1 == 2, "arithmetic is broken");
    }

    #[test]
    fn test_display_includes_location() {
        let violation = ContractViolation {
            message: "boom".to_owned(),
            location: Location::caller(),
        };
        let text = violation.to_string();
        assert!(text.contains("boom"));
        assert!(text.contains("contract.rs"));
    }
}
