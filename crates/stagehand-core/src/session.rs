//! Per-run automation session state.
//!
//! An [`AutomationSession`] is the one piece of state shared by the window
//! registry, the point resolver and the controller of a test run. It holds:
//!
//! - the "last targeted" window, updated whenever a resolution lands on an
//!   element, and read to order window searches by proximity
//! - a ring buffer of recent [`ActionLog`] entries
//! - a broadcast channel of [`SessionEvent`]s for anything watching the run
//!
//! Exactly one session is expected per process. The target pointer is only
//! reachable through [`AutomationSession::lock_target`]. Holders keep the
//! lock for a single read or write and never across scene-graph calls.
//!
//! # Example
//!
//! ```
//! use stagehand_core::session::AutomationSession;
//! use stagehand_core::action::{ActionKind, ActionResult};
//!
//! let session = AutomationSession::new();
//! let mut rx = session.subscribe();
//! session.log_action(ActionKind::Write { text: "hi".into() }, ActionResult::Success, None);
//! assert_eq!(session.action_log().len(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::action::{ActionKind, ActionLog, ActionResult};
use crate::element::{Window, WindowNode};

/// Maximum number of action log entries to retain in the ring buffer.
const MAX_ACTION_LOG_SIZE: usize = 1000;

/// Events broadcast while a session runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A controller action finished.
    ActionLogged(ActionLog),

    /// The last-targeted window changed.
    TargetChanged {
        /// Description of the new target window.
        window: String,
    },

    /// A synchronization wait gave up and execution continued.
    SyncTimedOut {
        /// What was being waited for.
        waiting_for: String,
        /// How long the wait lasted.
        waited_ms: u64,
    },
}

/// Shared state for one automation run.
pub struct AutomationSession {
    /// Unique identifier for this session.
    pub id: Uuid,

    /// When this session was created.
    pub created_at: DateTime<Utc>,

    last_target: Mutex<Option<Weak<dyn WindowNode>>>,

    action_log: Mutex<VecDeque<ActionLog>>,

    event_tx: broadcast::Sender<SessionEvent>,
}

/// Exclusive access to the session's last-targeted window.
///
/// Each read and update is atomic. Drop the slot before calling into the
/// scene graph; the lock is not re-entrant.
pub struct TargetSlot<'a> {
    guard: MutexGuard<'a, Option<Weak<dyn WindowNode>>>,
    event_tx: &'a broadcast::Sender<SessionEvent>,
}

impl TargetSlot<'_> {
    /// The last-targeted window, if it is still alive.
    ///
    /// This only checks that the handle is alive; the window registry also
    /// checks that the application still lists it.
    pub fn get(&self) -> Option<Window> {
        self.guard.as_ref().and_then(Window::from_weak)
    }

    /// Makes `window` the last-targeted window.
    pub fn set(&mut self, window: &Window) {
        let changed = self.get().map_or(true, |current| !current.same(window));
        *self.guard = Some(window.downgrade());
        if changed {
            let _ = self.event_tx.send(SessionEvent::TargetChanged {
                window: window.describe(),
            });
        }
    }

    /// Forgets the last-targeted window.
    pub fn clear(&mut self) {
        *self.guard = None;
    }
}

impl AutomationSession {
    /// Creates a new session with no target and an empty log.
    pub fn new() -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(100);
        Arc::new(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            last_target: Mutex::new(None),
            action_log: Mutex::new(VecDeque::with_capacity(64)),
            event_tx,
        })
    }

    /// Locks the last-targeted window pointer.
    pub fn lock_target(&self) -> TargetSlot<'_> {
        TargetSlot {
            guard: self.last_target.lock().unwrap_or_else(PoisonError::into_inner),
            event_tx: &self.event_tx,
        }
    }

    /// Subscribes to session events.
    ///
    /// Receivers that lag too far behind miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Records an action and broadcasts it.
    pub fn log_action(
        &self,
        action: ActionKind,
        result: ActionResult,
        duration_ms: Option<u64>,
    ) -> ActionLog {
        let log = ActionLog::new(action, result, duration_ms);
        {
            let mut action_log = self.action_log.lock().unwrap_or_else(PoisonError::into_inner);
            if action_log.len() >= MAX_ACTION_LOG_SIZE {
                action_log.pop_front();
            }
            action_log.push_back(log.clone());
        }
        // No subscribers is the common case.
        let _ = self.event_tx.send(SessionEvent::ActionLogged(log.clone()));
        log
    }

    /// Broadcasts a soft synchronization timeout.
    pub fn report_sync_timeout(&self, waiting_for: &str, waited_ms: u64) {
        let _ = self.event_tx.send(SessionEvent::SyncTimedOut {
            waiting_for: waiting_for.to_string(),
            waited_ms,
        });
    }

    /// All retained log entries, oldest first.
    pub fn action_log(&self) -> Vec<ActionLog> {
        self.action_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The retained log rendered as JSON Lines.
    pub fn export_log(&self) -> String {
        self.action_log()
            .iter()
            .filter_map(|entry| serde_json::to_string(entry).ok())
            .map(|line| line + "\n")
            .collect()
    }
}

impl std::fmt::Debug for AutomationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationSession")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("last_target", &"<Mutex<Option<Weak<dyn WindowNode>>>>")
            .field("action_log", &"<Mutex<VecDeque<ActionLog>>>")
            .field("event_tx", &"<broadcast::Sender>")
            .finish()
    }
}
