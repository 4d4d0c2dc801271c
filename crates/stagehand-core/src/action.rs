//! Records of the actions a controller performed.
//!
//! Every high-level controller call produces one [`ActionLog`] entry in the
//! session, so a failing test can be read back step by step.
//!
//! # Example
//!
//! ```
//! use stagehand_core::action::{ActionKind, ActionLog, ActionResult};
//!
//! let log = ActionLog::new(
//!     ActionKind::Write { text: "hello".to_string() },
//!     ActionResult::Success,
//!     Some(12),
//! );
//! println!("{} at {}", log.action.name(), log.timestamp);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::ScreenPoint;
use crate::input::{InputId, Key, MouseButton, ScrollDirection};

/// The result of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionResult {
    /// The action completed.
    Success,

    /// The action completed but the UI thread did not acknowledge it in time.
    Unsettled(String),

    /// The action failed with the given error message.
    Failure(String),
}

/// Actions a controller performs.
///
/// Serialized with a `type` tag so exported logs are self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Pointer travel to a resolved point.
    MoveTo {
        /// Description of the target.
        target: String,
        /// Where the pointer ended up.
        point: Option<ScreenPoint>,
    },

    Press { inputs: Vec<InputId> },

    Release { inputs: Vec<InputId> },

    Click {
        target: String,
        button: MouseButton,
        count: u32,
    },

    Drag {
        from: String,
        to: Option<String>,
        button: MouseButton,
    },

    Scroll {
        amount: u32,
        direction: ScrollDirection,
    },

    /// Text entry.
    Write { text: String },

    /// Individual key strokes.
    TypeKeys { keys: Vec<Key> },

    /// A key chord: all pressed, then released in reverse.
    Push { keys: Vec<Key> },
}

impl ActionKind {
    /// Short, static name for tracing span metadata.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::MoveTo { .. } => "move_to",
            ActionKind::Press { .. } => "press",
            ActionKind::Release { .. } => "release",
            ActionKind::Click { .. } => "click",
            ActionKind::Drag { .. } => "drag",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Write { .. } => "write",
            ActionKind::TypeKeys { .. } => "type_keys",
            ActionKind::Push { .. } => "push",
        }
    }
}

/// A logged action with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    /// Unique identifier for this entry.
    pub id: Uuid,

    /// When the action finished.
    pub timestamp: DateTime<Utc>,

    /// What was done.
    pub action: ActionKind,

    /// How it went.
    pub result: ActionResult,

    /// Wall time the action took, including synchronization waits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ActionLog {
    /// Creates a new entry stamped with a fresh UUID and the current time.
    pub fn new(action: ActionKind, result: ActionResult, duration_ms: Option<u64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            result,
            duration_ms,
        }
    }
}
