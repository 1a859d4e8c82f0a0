//! Fire-and-forget capture flash.
//!
//! The flash only toggles `WidgetState::flash`; it never touches the capture
//! pipeline and nothing waits on it.

use std::rc::Rc;
use std::time::Duration;

use gloo::timers::callback::Timeout;

use crate::state::StateStore;

/// Schedules a one-shot callback.
pub trait Timer {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>);
}

/// `setTimeout` backed timer.
#[derive(Default)]
pub struct BrowserTimer;

impl Timer for BrowserTimer {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        Timeout::new(millis, task).forget();
    }
}

/// Turn the flash off after `duration`. The caller has already turned it on.
///
/// Holds only a weak reference, so a widget torn down mid-flash is not kept
/// alive by the pending timer.
pub fn schedule_flash_off(store: &Rc<StateStore>, timer: &dyn Timer, duration: Duration) {
    let store = Rc::downgrade(store);
    timer.schedule(
        duration,
        Box::new(move || {
            if let Some(store) = store.upgrade() {
                store.update(|s| s.flash_cleared());
            }
        }),
    );
}
