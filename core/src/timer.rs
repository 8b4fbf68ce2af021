use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Outcome of a one-shot press timer, observed once via [`PressTimer::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerVerdict {
    /// Stopped before the delay elapsed; the armed action never ran.
    Cancelled,
    /// The delay elapsed and the action ran, yielding this outcome.
    Fired(bool),
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    cond: Condvar,
}

#[derive(Default)]
struct TimerState {
    cancelled: bool,
    fired: Option<bool>,
}

/// One-shot delayable action on its own thread. Armed on button-down,
/// disarmed on button-up; re-armable after every `stop`.
#[derive(Default)]
pub struct PressTimer {
    shared: Option<Arc<TimerShared>>,
    thread: Option<JoinHandle<()>>,
}

impl PressTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer. No-op while already armed.
    pub fn start<F>(&mut self, delay: Duration, action: F)
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        if self.thread.is_some() {
            return;
        }

        let shared = Arc::new(TimerShared::default());
        self.shared = Some(Arc::clone(&shared));
        self.thread = Some(thread::spawn(move || {
            let deadline = Instant::now() + delay;
            let Ok(mut state) = shared.state.lock() else {
                return;
            };
            loop {
                if state.cancelled {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let (next, _timeout) = match shared.cond.wait_timeout(state, deadline - now) {
                    Ok(result) => result,
                    Err(_) => return,
                };
                state = next;
            }
            drop(state);
            let outcome = action();
            if let Ok(mut state) = shared.state.lock() {
                state.fired = Some(outcome);
            }
        }));
    }

    /// Disarm and report what happened. `Cancelled` when the timer never
    /// fired (including when it was never started).
    pub fn stop(&mut self) -> TimerVerdict {
        let Some(shared) = self.shared.take() else {
            return TimerVerdict::Cancelled;
        };
        if let Ok(mut state) = shared.state.lock() {
            state.cancelled = true;
        }
        shared.cond.notify_all();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        let verdict = match shared.state.lock() {
            Ok(state) => match state.fired {
                Some(outcome) => TimerVerdict::Fired(outcome),
                None => TimerVerdict::Cancelled,
            },
            Err(_) => TimerVerdict::Cancelled,
        };
        verdict
    }
}

impl Drop for PressTimer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
