//! Immutable widget state snapshots and the store that swaps them.
//!
//! Every transition builds a fresh [`WidgetState`] from the previous one and
//! the [`StateStore`] replaces it in a single commit, then notifies the view.

use std::cell::RefCell;

/// Lifecycle phase of the capture widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting on camera acquisition.
    Initializing,
    /// Preview live, no capture taken yet.
    Ready,
    /// Camera unsupported or unavailable. Terminal until reload.
    NoCamera,
    /// A capture/upload cycle is in flight.
    Capturing,
    /// Preview live, last cycle concluded.
    IdleWithResult,
}

/// Outcome of the most recent capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptStatus {
    #[default]
    Idle,
    Capturing,
    Succeeded,
    Failed,
}

/// One snapshot of everything the view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetState {
    pub phase: Phase,
    pub attempt: AttemptStatus,
    pub success_count: u32,
    pub error: Option<String>,
    pub flash: bool,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self {
            phase: Phase::Initializing,
            attempt: AttemptStatus::Idle,
            success_count: 0,
            error: None,
            flash: false,
        }
    }
}

impl WidgetState {
    /// The in-progress flag guarding overlapping cycles.
    pub fn is_capturing(&self) -> bool {
        self.phase == Phase::Capturing
    }

    /// Whether a new capture cycle may start.
    pub fn can_capture(&self) -> bool {
        matches!(self.phase, Phase::Ready | Phase::IdleWithResult)
    }

    pub fn camera_ready(&self) -> Self {
        Self {
            phase: Phase::Ready,
            error: None,
            ..self.clone()
        }
    }

    pub fn camera_failed(&self, message: String) -> Self {
        Self {
            phase: Phase::NoCamera,
            error: Some(message),
            ..self.clone()
        }
    }

    /// Start a cycle. The previous attempt's error is cleared.
    pub fn capture_started(&self) -> Self {
        Self {
            phase: Phase::Capturing,
            attempt: AttemptStatus::Capturing,
            error: None,
            flash: true,
            ..self.clone()
        }
    }

    pub fn upload_succeeded(&self) -> Self {
        Self {
            phase: Phase::IdleWithResult,
            attempt: AttemptStatus::Succeeded,
            success_count: self.success_count.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn upload_failed(&self, message: String) -> Self {
        Self {
            phase: Phase::IdleWithResult,
            attempt: AttemptStatus::Failed,
            error: Some(message),
            ..self.clone()
        }
    }

    /// Encoding produced nothing; release the guard without reporting.
    pub fn capture_aborted(&self) -> Self {
        Self {
            phase: Phase::IdleWithResult,
            attempt: AttemptStatus::Idle,
            ..self.clone()
        }
    }

    pub fn flash_cleared(&self) -> Self {
        Self {
            flash: false,
            ..self.clone()
        }
    }
}

type Observer = Box<dyn Fn(&WidgetState)>;

/// Holds the current snapshot and notifies a single observer on change.
pub struct StateStore {
    current: RefCell<WidgetState>,
    observer: RefCell<Option<Observer>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            current: RefCell::new(WidgetState::default()),
            observer: RefCell::new(None),
        }
    }

    /// Register the observer and immediately hand it the current snapshot.
    pub fn subscribe(&self, observer: impl Fn(&WidgetState) + 'static) {
        let snapshot = self.snapshot();
        observer(&snapshot);
        *self.observer.borrow_mut() = Some(Box::new(observer));
    }

    pub fn snapshot(&self) -> WidgetState {
        self.current.borrow().clone()
    }

    /// Replace the snapshot with `transition(current)`.
    ///
    /// No borrow is held while the observer runs, so it may read the store.
    pub fn update(&self, transition: impl FnOnce(&WidgetState) -> WidgetState) -> WidgetState {
        let next = {
            let current = self.current.borrow();
            transition(&current)
        };
        let changed = {
            let mut current = self.current.borrow_mut();
            let changed = *current != next;
            *current = next.clone();
            changed
        };
        if changed {
            if let Some(observer) = self.observer.borrow().as_ref() {
                observer(&next);
            }
        }
        next
    }
}
