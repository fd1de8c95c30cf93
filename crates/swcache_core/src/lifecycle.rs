//! Install/activate state machine of one cache version.

use std::{
    fmt,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Built, install not started.
    Parsed,
    Installing,
    Installed,
    Activating,
    /// The only state that intercepts with cache strategies.
    Activated,
    /// Install failed; this version never takes control.
    Redundant,
}

impl WorkerState {
    fn can_become(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installing, Redundant)
                | (Installed, Activating)
                | (Activating, Activated)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cannot move from {from} to {to}")]
pub struct LifecycleError {
    pub from: WorkerState,
    pub to: WorkerState,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> WorkerState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.state() == WorkerState::Activated
    }

    /// Forward-only transition; there is no way back.
    pub fn advance(&self, to: WorkerState) -> Result<(), LifecycleError> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !state.can_become(to) {
            return Err(LifecycleError { from: *state, to });
        }
        *state = to;
        Ok(())
    }

    /// Supersede the active version without waiting for clients to leave.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::{Lifecycle, WorkerState};

    #[test]
    fn happy_path() {
        let lc = Lifecycle::default();
        for next in [
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
        ] {
            lc.advance(next).expect("valid transition");
        }
        assert!(lc.is_active());
    }

    #[test]
    fn no_way_back() {
        let lc = Lifecycle::default();
        lc.advance(WorkerState::Installing).expect("install");
        lc.advance(WorkerState::Redundant).expect("fail");
        let err = lc.advance(WorkerState::Installing).unwrap_err();
        assert_eq!(err.from, WorkerState::Redundant);
        assert!(!lc.is_active());
    }

    #[test]
    fn cannot_skip_install() {
        let lc = Lifecycle::default();
        assert!(lc.advance(WorkerState::Activating).is_err());
        assert_eq!(lc.state(), WorkerState::Parsed);
    }
}
