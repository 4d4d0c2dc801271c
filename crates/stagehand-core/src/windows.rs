//! Top-level window tracking and proximity ordering.
//!
//! Windows are re-queried from the [`Application`] on every call; the
//! registry keeps no list of its own. The only state is the session's
//! last-targeted pointer, which is revalidated against the live window list
//! each time it is read so a closed window is never handed back.

use std::sync::Arc;

use crate::app::Application;
use crate::element::Window;
use crate::session::AutomationSession;

/// Ordering of windows relative to a reference window.
#[derive(Clone)]
pub struct WindowRegistry {
    app: Arc<dyn Application>,
    session: Arc<AutomationSession>,
}

impl WindowRegistry {
    /// Creates a registry over `app`'s windows, sharing `session`'s target.
    pub fn new(app: Arc<dyn Application>, session: Arc<AutomationSession>) -> Self {
        Self { app, session }
    }

    /// The session whose target this registry reads.
    pub fn session(&self) -> &Arc<AutomationSession> {
        &self.session
    }

    /// All current windows in enumeration order. Empty during startup and
    /// teardown, never an error.
    pub fn list_windows(&self) -> Vec<Window> {
        self.app.windows()
    }

    /// Windows ordered by ownership proximity to `target`.
    ///
    /// Rank 0 is the target itself, rank 1 is any window whose owner chain
    /// reaches the target, rank 2 is everything else. The sort is stable,
    /// so ties keep enumeration order.
    pub fn list_by_proximity_to(&self, target: Option<&Window>) -> Vec<Window> {
        order_by_proximity(self.list_windows(), target)
    }

    /// Windows ordered by proximity to the last-targeted window.
    pub fn list_targeted(&self) -> Vec<Window> {
        let windows = self.list_windows();
        let target = live_target(self.last_target(), &windows);
        order_by_proximity(windows, target.as_ref())
    }

    /// The last-targeted window, if the application still lists it.
    pub fn targeted(&self) -> Option<Window> {
        live_target(self.last_target(), &self.list_windows())
    }

    // The lock is released before the application is asked for windows.
    fn last_target(&self) -> Option<Window> {
        self.session.lock_target().get()
    }

    /// Makes `window` the last-targeted window.
    pub fn target(&self, window: &Window) {
        self.session.lock_target().set(window);
    }
}

impl std::fmt::Debug for WindowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowRegistry")
            .field("session", &self.session.id)
            .finish_non_exhaustive()
    }
}

fn live_target(target: Option<Window>, windows: &[Window]) -> Option<Window> {
    target.filter(|target| windows.iter().any(|w| w.same(target)))
}

fn proximity_rank(window: &Window, target: Option<&Window>) -> u8 {
    match target {
        Some(target) if window.same(target) => 0,
        Some(target) if window.is_owned_by(target) => 1,
        _ => 2,
    }
}

fn order_by_proximity(mut windows: Vec<Window>, target: Option<&Window>) -> Vec<Window> {
    // sort_by_key is stable
    windows.sort_by_key(|window| proximity_rank(window, target));
    windows
}
