//! Cooperative deadline checks and progress reporting for long valuations.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use tracing::warn;

use crate::core::ValuationError;

/// Progress sink and deadline of one valuation call.
pub(crate) struct RunControl<'a> {
    started: Instant,
    deadline: Option<Instant>,
    progress: Option<&'a dyn Fn(f64)>,
    reported: Cell<f64>,
    callback_panicked: Cell<bool>,
}

impl<'a> RunControl<'a> {
    pub fn new(deadline: Option<Instant>, progress: Option<&'a dyn Fn(f64)>) -> Self {
        Self {
            started: Instant::now(),
            deadline,
            progress,
            reported: Cell::new(0.0),
            callback_panicked: Cell::new(false),
        }
    }

    /// Fails with `Timeout` once the deadline has passed.
    pub fn check_deadline(&self) -> Result<(), ValuationError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ValuationError::Timeout {
                elapsed: self.started.elapsed(),
            }),
            _ => Ok(()),
        }
    }

    /// Reports `fraction` clamped to `[0, 1]` and never below an earlier report.
    pub fn report(&self, fraction: f64) {
        let Some(callback) = self.progress else {
            return;
        };
        let fraction = if fraction.is_nan() {
            self.reported.get()
        } else {
            fraction.clamp(0.0, 1.0).max(self.reported.get())
        };
        self.reported.set(fraction);
        if catch_unwind(AssertUnwindSafe(|| callback(fraction))).is_err()
            && !self.callback_panicked.replace(true)
        {
            warn!("progress callback panicked; further panics are ignored");
        }
    }

    pub fn finish(&self) {
        self.report(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;

    #[test]
    fn reports_are_monotone_and_end_at_one() {
        let seen = RefCell::new(Vec::new());
        let sink = |f: f64| seen.borrow_mut().push(f);
        let control = RunControl::new(None, Some(&sink));
        control.report(0.3);
        control.report(0.2);
        control.report(1.7);
        control.finish();
        assert_eq!(*seen.borrow(), vec![0.3, 0.3, 1.0, 1.0]);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let sink = |f: f64| {
            if f >= 0.0 {
                panic!("sink failure");
            }
        };
        let control = RunControl::new(None, Some(&sink));
        control.report(0.5);
        control.finish();
    }

    #[test]
    fn past_deadline_times_out() {
        let control = RunControl::new(Some(Instant::now() - Duration::from_millis(1)), None);
        assert!(matches!(
            control.check_deadline(),
            Err(ValuationError::Timeout { .. })
        ));
        let open = RunControl::new(Some(Instant::now() + Duration::from_secs(3600)), None);
        assert!(open.check_deadline().is_ok());
    }
}
