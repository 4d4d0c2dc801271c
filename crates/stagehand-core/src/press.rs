//! Idempotent press/release bookkeeping.
//!
//! [`PressStateTracker`] remembers which buttons and keys are currently held
//! so that a second press of a held input never reaches the backend, and a
//! release of an input that is not held is skipped. Releasing with no ids
//! releases everything, which is how tests avoid leaking stuck input into
//! the next test.
//!
//! The tracker belongs to exactly one controller and is not meant to be
//! shared.

use tracing::{debug, trace};

use crate::backend::{BackendError, InputBackend};
use crate::error::AutomationError;
use crate::input::InputId;

/// The set of inputs currently held, in press order.
#[derive(Debug, Default)]
pub struct PressStateTracker {
    held: Vec<InputId>,
}

impl PressStateTracker {
    /// A tracker with nothing held.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inputs currently held, oldest first.
    pub fn held(&self) -> &[InputId] {
        &self.held
    }

    pub fn is_held(&self, input: InputId) -> bool {
        self.held.contains(&input)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Presses every id in `inputs` that is not already held.
    ///
    /// Returns the ids that were actually pressed. On a backend failure the
    /// ids pressed so far stay recorded as held.
    pub async fn press(
        &mut self,
        backend: &dyn InputBackend,
        inputs: &[InputId],
    ) -> Result<Vec<InputId>, BackendError> {
        let mut pressed = Vec::new();
        for &input in inputs {
            if self.is_held(input) {
                trace!(%input, "already held, skipping press");
                continue;
            }
            backend.press(input).await?;
            self.held.push(input);
            pressed.push(input);
        }
        Ok(pressed)
    }

    /// Releases `inputs`, or everything held when `inputs` is empty.
    ///
    /// Ids that are not held are skipped. A failed release leaves its id
    /// recorded as held; the remaining ids are still attempted and the first
    /// failure is returned.
    pub async fn release(
        &mut self,
        backend: &dyn InputBackend,
        inputs: &[InputId],
    ) -> Result<Vec<InputId>, BackendError> {
        let targets: Vec<InputId> = if inputs.is_empty() {
            // Most recently pressed first, like letting go of a chord.
            self.held.iter().rev().copied().collect()
        } else {
            inputs.to_vec()
        };

        let mut released = Vec::new();
        let mut first_error = None;
        for input in targets {
            if !self.is_held(input) {
                debug!("{}, skipping release", AutomationError::InconsistentPressState { input });
                continue;
            }
            match backend.release(input).await {
                Ok(()) => {
                    self.held.retain(|held| *held != input);
                    released.push(input);
                }
                Err(e) => {
                    debug!(%input, error = %e, "release failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(released),
        }
    }
}
