//! Write-once cancellation shared by every worker of a run.

use std::sync::atomic::{AtomicU8, Ordering};

use dbbench_core::StopCause;
use tokio::sync::Notify;

const LIVE: u8 = 0;
const DEADLINE: u8 = 1;
const TERMINAL: u8 = 2;

/// Cancellation token with a cause. The first `fire` wins; later calls are
/// no-ops and the signal is never reset.
#[derive(Debug, Default)]
pub struct StopSignal {
    state: AtomicU8,
    notify: Notify,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Returns `true` if this call set the cause.
    pub fn fire(&self, cause: StopCause) -> bool {
        let code = match cause {
            StopCause::DeadlineReached => DEADLINE,
            StopCause::TerminalConditionMet => TERMINAL,
        };
        let won = self
            .state
            .compare_exchange(LIVE, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) != LIVE
    }

    /// The cause that won, if fired.
    #[must_use]
    pub fn cause(&self) -> Option<StopCause> {
        match self.state.load(Ordering::Acquire) {
            DEADLINE => Some(StopCause::DeadlineReached),
            TERMINAL => Some(StopCause::TerminalConditionMet),
            _ => None,
        }
    }

    /// Resolves once the signal has fired.
    pub async fn fired(&self) {
        loop {
            // Register before checking so a concurrent fire is not missed.
            let notified = self.notify.notified();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}
