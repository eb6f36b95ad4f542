//! Single-slot storage for faults raised inside engine callbacks.
//!
//! Completion handlers run inside the engine's dispatch frame, which must never
//! unwind. Whatever a handler raises (a returned error or a panic) is parked
//! here and raised again by the pump once control is back in ordinary code.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// CapturedFault
// ---------------------------------------------------------------------------

/// A fault taken out of a callback, with its original identity intact.
pub enum CapturedFault {
    /// An error returned by a handler.
    Error(anyhow::Error),
    /// A panic payload caught with `catch_unwind`.
    Panic(Box<dyn Any + Send + 'static>),
}

impl CapturedFault {
    /// Human-readable description of the fault.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Error(err) => err.to_string(),
            Self::Panic(payload) => panic_message(payload.as_ref()),
        }
    }

    /// Raises the fault again: errors are returned, panics resume unwinding.
    ///
    /// # Errors
    ///
    /// Returns the captured error unchanged.
    pub fn raise(self) -> anyhow::Result<()> {
        Err(self.into_error())
    }

    /// Unwraps the captured error. A captured panic resumes unwinding here.
    #[must_use]
    pub fn into_error(self) -> anyhow::Error {
        match self {
            Self::Error(err) => err,
            Self::Panic(payload) => panic::resume_unwind(payload),
        }
    }
}

impl fmt::Debug for CapturedFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
            Self::Panic(payload) => f
                .debug_tuple("Panic")
                .field(&panic_message(payload.as_ref()))
                .finish(),
        }
    }
}

/// Extracts the message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// HandlerOutcome
// ---------------------------------------------------------------------------

/// Return types a completion handler may have.
///
/// `()` never fails. `Result<(), E>` fails with its error, which the catcher
/// treats exactly like a panic.
pub trait HandlerOutcome {
    fn into_fault(self) -> Option<anyhow::Error>;
}

impl HandlerOutcome for () {
    fn into_fault(self) -> Option<anyhow::Error> {
        None
    }
}

impl<E> HandlerOutcome for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_fault(self) -> Option<anyhow::Error> {
        self.err().map(Into::into)
    }
}

// ---------------------------------------------------------------------------
// FaultCatcher
// ---------------------------------------------------------------------------

/// What happens when a fault arrives while another one is still parked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CapturePolicy {
    /// Keep the parked fault and discard the newcomer.
    #[default]
    KeepFirst,
    /// Replace the parked fault with the newcomer.
    KeepLatest,
}

#[derive(Debug, Default)]
struct Slot {
    fault: Option<CapturedFault>,
    discarded: u64,
}

/// Per-connection single-slot fault box.
///
/// At most one fault is held at a time. A second capture before the slot is
/// drained is resolved by the [`CapturePolicy`]; the loser is logged and
/// counted in [`FaultCatcher::discarded`].
#[derive(Debug, Default)]
pub struct FaultCatcher {
    policy: CapturePolicy,
    slot: Mutex<Slot>,
}

impl FaultCatcher {
    #[must_use]
    pub fn new(policy: CapturePolicy) -> Self {
        Self {
            policy,
            slot: Mutex::new(Slot::default()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> CapturePolicy {
        self.policy
    }

    /// Parks a fault, applying the capture policy if the slot is occupied.
    pub fn capture(&self, fault: CapturedFault) {
        let mut slot = self.slot.lock();
        if slot.fault.is_none() {
            slot.fault = Some(fault);
            return;
        }

        slot.discarded += 1;
        match self.policy {
            CapturePolicy::KeepFirst => {
                tracing::warn!(
                    discarded = %fault.message(),
                    "fault already captured, discarding newer fault"
                );
            }
            CapturePolicy::KeepLatest => {
                let replaced = slot.fault.replace(fault);
                if let Some(replaced) = replaced {
                    tracing::warn!(
                        discarded = %replaced.message(),
                        "fault already captured, replacing it with newer fault"
                    );
                }
            }
        }
    }

    #[must_use]
    pub fn has_fault(&self) -> bool {
        self.slot.lock().fault.is_some()
    }

    /// Number of faults lost to the capture policy since creation.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.slot.lock().discarded
    }

    /// Removes the parked fault without raising it.
    pub fn take(&self) -> Option<CapturedFault> {
        self.slot.lock().fault.take()
    }

    /// Clears the slot and raises its fault. No-op when the slot is empty.
    ///
    /// # Errors
    ///
    /// Returns the parked error. A parked panic resumes unwinding instead.
    pub fn rethrow(&self) -> anyhow::Result<()> {
        // The lock is released before raising so a resumed panic never
        // unwinds through the guard.
        let fault = self.take();
        match fault {
            Some(fault) => fault.raise(),
            None => Ok(()),
        }
    }

    /// Runs `f` and parks whatever it raises. Never unwinds.
    ///
    /// Returns `true` when `f` completed without a fault.
    pub fn invoke<F, O>(&self, f: F) -> bool
    where
        F: FnOnce() -> O,
        O: HandlerOutcome,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(outcome) => match outcome.into_fault() {
                None => true,
                Some(err) => {
                    self.capture(CapturedFault::Error(err));
                    false
                }
            },
            Err(payload) => {
                self.capture(CapturedFault::Panic(payload));
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("CompletionHandler")]
    struct HandlerError;

    fn error_fault(msg: &'static str) -> CapturedFault {
        CapturedFault::Error(anyhow::anyhow!(msg))
    }

    #[test]
    fn empty_catcher_rethrow_is_noop() {
        let catcher = FaultCatcher::default();
        assert!(!catcher.has_fault());
        assert!(catcher.rethrow().is_ok());
        assert_eq!(catcher.discarded(), 0);
    }

    #[test]
    fn rethrow_returns_original_error_and_clears() {
        let catcher = FaultCatcher::default();
        catcher.capture(CapturedFault::Error(HandlerError.into()));
        assert!(catcher.has_fault());

        let err = catcher.rethrow().unwrap_err();
        assert!(err.downcast_ref::<HandlerError>().is_some());
        assert_eq!(err.to_string(), "CompletionHandler");
        assert!(!catcher.has_fault());
        assert!(catcher.rethrow().is_ok());
    }

    #[test]
    fn rethrow_resumes_original_panic() {
        let catcher = FaultCatcher::default();
        assert!(!catcher.invoke::<_, ()>(|| panic!("CompletionHandler")));
        assert!(catcher.has_fault());

        let payload = panic::catch_unwind(AssertUnwindSafe(|| catcher.rethrow())).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "CompletionHandler");
        assert!(!catcher.has_fault());
    }

    #[test]
    fn invoke_captures_returned_error() {
        let catcher = FaultCatcher::default();
        let ok = catcher.invoke(|| -> Result<(), HandlerError> { Err(HandlerError) });
        assert!(!ok);
        let fault = catcher.take().unwrap();
        assert_eq!(fault.message(), "CompletionHandler");
    }

    #[test]
    fn invoke_success_captures_nothing() {
        let catcher = FaultCatcher::default();
        assert!(catcher.invoke(|| {}));
        assert!(catcher.invoke(|| Ok::<(), anyhow::Error>(())));
        assert!(!catcher.has_fault());
    }

    #[test]
    fn keep_first_discards_second_fault() {
        let catcher = FaultCatcher::new(CapturePolicy::KeepFirst);
        catcher.capture(error_fault("first"));
        catcher.capture(error_fault("second"));

        assert_eq!(catcher.discarded(), 1);
        assert_eq!(catcher.rethrow().unwrap_err().to_string(), "first");
        assert!(catcher.rethrow().is_ok());
    }

    #[test]
    fn keep_latest_replaces_first_fault() {
        let catcher = FaultCatcher::new(CapturePolicy::KeepLatest);
        catcher.capture(error_fault("first"));
        catcher.capture(error_fault("second"));

        assert_eq!(catcher.discarded(), 1);
        assert_eq!(catcher.rethrow().unwrap_err().to_string(), "second");
    }

    #[test]
    fn slot_is_reusable_after_drain() {
        let catcher = FaultCatcher::default();
        catcher.capture(error_fault("first"));
        let _ = catcher.rethrow();
        catcher.capture(error_fault("second"));
        assert_eq!(catcher.discarded(), 0);
        assert_eq!(catcher.rethrow().unwrap_err().to_string(), "second");
    }

    #[test]
    fn debug_shows_panic_message() {
        let fault = CapturedFault::Panic(Box::new("boom"));
        assert_eq!(format!("{fault:?}"), "Panic(\"boom\")");
    }

    #[test]
    fn panic_message_handles_owned_strings() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    proptest! {
        #[test]
        fn policy_keeps_exactly_one_fault(count in 1usize..16, keep_latest in any::<bool>()) {
            let policy = if keep_latest { CapturePolicy::KeepLatest } else { CapturePolicy::KeepFirst };
            let catcher = FaultCatcher::new(policy);
            for i in 0..count {
                catcher.capture(CapturedFault::Error(anyhow::anyhow!("fault-{i}")));
            }

            prop_assert_eq!(catcher.discarded(), (count - 1) as u64);
            let expected = if keep_latest { count - 1 } else { 0 };
            let message = catcher.rethrow().unwrap_err().to_string();
            prop_assert_eq!(message, format!("fault-{expected}"));
            prop_assert!(!catcher.has_fault());
        }
    }
}
