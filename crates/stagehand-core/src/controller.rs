//! The chainable automation API.
//!
//! A [`Controller`] owns the active input backend and the press-state
//! tracker, and composes lookup, resolution, motion planning and
//! synchronization into user-level gestures. Every gesture:
//!
//! - runs inside an `action` tracing span and logs its duration on completion
//! - waits for the UI thread before returning
//! - is recorded in the session's action log
//!
//! Query and resolution failures are returned as errors. Synchronization
//! timeouts are not: the gesture is logged as
//! [`ActionResult::Unsettled`] and execution continues.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stagehand_core::app::Application;
//! use stagehand_core::config::AutomationConfig;
//! use stagehand_core::controller::Controller;
//! use stagehand_core::input::{Key, MouseButton};
//!
//! async fn log_in(app: Arc<dyn Application>) -> Result<(), stagehand_core::error::AutomationError> {
//!     let mut robot = Controller::new(app, AutomationConfig::from_env())?;
//!     robot
//!         .click_on("#username", MouseButton::Primary).await?
//!         .write("alice").await?
//!         .type_keys(&[Key::Tab]).await?
//!         .write("hunter2").await?
//!         .click_on("Log In", MouseButton::Primary).await?;
//!     robot.release_all().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info_span, warn, Instrument, Span};

use crate::action::{ActionKind, ActionResult};
use crate::app::{Application, UiEventKind};
use crate::backend::{select_backend, InputBackend};
use crate::config::AutomationConfig;
use crate::diagnostics::FailureReport;
use crate::error::AutomationError;
use crate::geometry::ScreenPoint;
use crate::input::{InputId, Key, MouseButton, ScrollDirection};
use crate::motion::{self, Motion};
use crate::press::PressStateTracker;
use crate::query::{Criterion, ElementSet, SceneGraphIndex};
use crate::resolve::{PointQuery, PointResolver, Target};
use crate::session::AutomationSession;
use crate::sync::{EventSynchronizer, EventWaitSpec, SyncOutcome};
use crate::windows::WindowRegistry;

/// Drives one application on behalf of one test.
///
/// Not meant to be shared: a test has exactly one controller, and the
/// controller's press state is only consistent if every press and release
/// goes through it.
pub struct Controller {
    session: Arc<AutomationSession>,
    config: AutomationConfig,
    backend: Box<dyn InputBackend>,
    resolver: PointResolver,
    sync: EventSynchronizer,
    presses: PressStateTracker,
    /// Button held by a [`Drag`] that has not released it yet.
    open_drag: Option<MouseButton>,
}

impl Controller {
    /// Creates a controller with a fresh session and the backend selected
    /// by `config`.
    pub fn new(app: Arc<dyn Application>, config: AutomationConfig) -> Result<Self, AutomationError> {
        let backend = select_backend(&config, app.clone())?;
        Ok(Self::with_backend(app, AutomationSession::new(), config, backend))
    }

    /// Creates a controller around an existing session and backend.
    pub fn with_backend(
        app: Arc<dyn Application>,
        session: Arc<AutomationSession>,
        config: AutomationConfig,
        backend: Box<dyn InputBackend>,
    ) -> Self {
        let registry = WindowRegistry::new(app.clone(), session.clone());
        let resolver = PointResolver::new(SceneGraphIndex::new(registry));
        let sync = EventSynchronizer::new(app, session.clone(), &config);
        debug!(backend = backend.name(), session = %session.id, "controller created");
        Self {
            session,
            config,
            backend,
            resolver,
            sync,
            presses: PressStateTracker::new(),
            open_drag: None,
        }
    }

    pub fn session(&self) -> &Arc<AutomationSession> {
        &self.session
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn InputBackend {
        self.backend.as_ref()
    }

    pub fn windows(&self) -> &WindowRegistry {
        self.resolver.index().windows()
    }

    pub fn synchronizer(&self) -> &EventSynchronizer {
        &self.sync
    }

    /// Inputs currently held by this controller, oldest first.
    pub fn held(&self) -> &[InputId] {
        self.presses.held()
    }

    // -------------------------------------------------------------------------
    // Lookup and points
    // -------------------------------------------------------------------------

    /// Visible elements matching `criterion` across all windows.
    pub fn lookup(&self, criterion: impl Into<Criterion>) -> Result<ElementSet, AutomationError> {
        self.resolver.index().lookup(&criterion.into())
    }

    /// Visible elements matching `criterion` below `scope`.
    pub fn lookup_from(
        &self,
        criterion: impl Into<Criterion>,
        scope: &ElementSet,
    ) -> Result<ElementSet, AutomationError> {
        self.resolver.index().query_from(&criterion.into(), scope)
    }

    /// A point query for `target`, centered unless adjusted.
    pub fn point(&self, target: impl Into<Target>) -> PointQuery {
        self.resolver.point(target)
    }

    // -------------------------------------------------------------------------
    // Pointer
    // -------------------------------------------------------------------------

    /// Moves the pointer to the center of `target`.
    pub async fn move_to(&mut self, target: impl Into<Target>) -> Result<&mut Self, AutomationError> {
        let query = self.point(target);
        self.move_to_with(query, Motion::Default).await
    }

    /// Moves the pointer to `query` along `motion`.
    pub async fn move_to_with(&mut self, query: PointQuery, motion: Motion) -> Result<&mut Self, AutomationError> {
        self.finish_abandoned_drag().await;
        self.move_action(query, motion).await?;
        Ok(self)
    }

    async fn move_action(&mut self, query: PointQuery, motion: Motion) -> Result<(), AutomationError> {
        let mut action = ActionKind::MoveTo {
            target: query.describe(),
            point: None,
        };
        let (span, start) = begin(&action);
        let outcome = self.travel(&query, motion).instrument(span.clone()).await;
        let outcome = outcome.map(|(sync, arrived)| {
            if let ActionKind::MoveTo { point, .. } = &mut action {
                *point = Some(arrived);
            }
            sync
        });
        self.finish(&span, action, start, outcome)
    }

    /// Presses buttons and keys, skipping any already held.
    pub async fn press<I>(&mut self, inputs: I) -> Result<&mut Self, AutomationError>
    where
        I: IntoIterator,
        I::Item: Into<InputId>,
    {
        self.finish_abandoned_drag().await;
        let inputs: Vec<InputId> = inputs.into_iter().map(Into::into).collect();
        let action = ActionKind::Press { inputs: inputs.clone() };
        let (span, start) = begin(&action);
        let outcome = self.press_settled(&inputs).instrument(span.clone()).await;
        self.finish(&span, action, start, outcome)?;
        Ok(self)
    }

    /// Releases buttons and keys; an empty list releases everything held.
    pub async fn release<I>(&mut self, inputs: I) -> Result<&mut Self, AutomationError>
    where
        I: IntoIterator,
        I::Item: Into<InputId>,
    {
        self.finish_abandoned_drag().await;
        let inputs: Vec<InputId> = inputs.into_iter().map(Into::into).collect();
        self.release_action(inputs).await?;
        Ok(self)
    }

    async fn release_action(&mut self, inputs: Vec<InputId>) -> Result<(), AutomationError> {
        let action = ActionKind::Release { inputs: inputs.clone() };
        let (span, start) = begin(&action);
        let outcome = self.release_settled(&inputs).instrument(span.clone()).await;
        self.finish(&span, action, start, outcome)
    }

    /// Releases everything this controller holds. Call at the end of a test.
    pub async fn release_all(&mut self) -> Result<&mut Self, AutomationError> {
        self.release(Vec::<InputId>::new()).await
    }

    /// Clicks `button` at the current pointer position.
    pub async fn click(&mut self, button: MouseButton) -> Result<&mut Self, AutomationError> {
        self.click_n(None, button, 1).await
    }

    /// Moves to `target` and clicks `button`.
    pub async fn click_on(&mut self, target: impl Into<Target>, button: MouseButton) -> Result<&mut Self, AutomationError> {
        let query = self.point(target);
        self.click_n(Some(query), button, 1).await
    }

    /// Moves to `target` and double-clicks `button`.
    pub async fn double_click_on(
        &mut self,
        target: impl Into<Target>,
        button: MouseButton,
    ) -> Result<&mut Self, AutomationError> {
        let query = self.point(target);
        self.click_n(Some(query), button, 2).await
    }

    /// Moves to `target` and presses `button`, starting a drag.
    ///
    /// Finish the returned [`Drag`] with [`Drag::release`] or
    /// [`Drag::drop_to`]. A drag dropped or cancelled before releasing keeps
    /// the button down only until the next gesture on this controller,
    /// which releases it first.
    pub async fn drag(&mut self, target: impl Into<Target>, button: MouseButton) -> Result<Drag<'_>, AutomationError> {
        self.finish_abandoned_drag().await;
        let query = self.point(target);
        let from = query.describe();
        let action = ActionKind::Drag {
            from: from.clone(),
            to: None,
            button,
        };
        let (span, start) = begin(&action);
        let outcome = self.grab(&query, button).instrument(span.clone()).await;
        self.finish(&span, action, start, outcome)?;
        self.open_drag = Some(button);
        Ok(Drag {
            controller: self,
            button,
            from,
        })
    }

    /// Turns the wheel `amount` notches in `direction`, one notch at a time.
    pub async fn scroll(&mut self, amount: u32, direction: ScrollDirection) -> Result<&mut Self, AutomationError> {
        self.finish_abandoned_drag().await;
        let action = ActionKind::Scroll { amount, direction };
        let (span, start) = begin(&action);
        let outcome = self.scroll_notches(amount, direction).instrument(span.clone()).await;
        self.finish(&span, action, start, outcome)?;
        Ok(self)
    }

    // -------------------------------------------------------------------------
    // Keyboard
    // -------------------------------------------------------------------------

    /// Types `text` into the focused element.
    pub async fn write(&mut self, text: &str) -> Result<&mut Self, AutomationError> {
        self.finish_abandoned_drag().await;
        let action = ActionKind::Write { text: text.to_string() };
        let (span, start) = begin(&action);
        let outcome = self.write_text(text).instrument(span.clone()).await;
        self.finish(&span, action, start, outcome)?;
        Ok(self)
    }

    /// Presses and releases each key in turn.
    pub async fn type_keys(&mut self, keys: &[Key]) -> Result<&mut Self, AutomationError> {
        self.finish_abandoned_drag().await;
        let action = ActionKind::TypeKeys { keys: keys.to_vec() };
        let (span, start) = begin(&action);
        let outcome = self.stroke_keys(keys).instrument(span.clone()).await;
        self.finish(&span, action, start, outcome)?;
        Ok(self)
    }

    /// Presses all `keys` in order, then releases them in reverse, as for a
    /// shortcut like `Control+Shift+S`.
    pub async fn push(&mut self, keys: &[Key]) -> Result<&mut Self, AutomationError> {
        self.finish_abandoned_drag().await;
        let action = ActionKind::Push { keys: keys.to_vec() };
        let (span, start) = begin(&action);
        let outcome = self.chord(keys).instrument(span.clone()).await;
        self.finish(&span, action, start, outcome)?;
        Ok(self)
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    /// Builds a failure report for `err`, capturing the screen for lookup
    /// and resolution failures.
    ///
    /// A failed capture is logged and leaves the report without one.
    pub async fn diagnose(&self, err: &AutomationError) -> FailureReport {
        let report = FailureReport::new(err);
        if !err.is_query_failure() {
            return report;
        }
        let capture = async {
            let bounds = self.backend.screen_bounds().await?;
            self.backend.capture_region(bounds).await
        }
        .await;
        match capture {
            Ok(image) => report.with_capture(image),
            Err(e) => {
                debug!(error = %e, "failure capture unavailable");
                report
            }
        }
    }

    // -------------------------------------------------------------------------
    // Gesture building blocks
    // -------------------------------------------------------------------------

    fn backend_err(&self) -> impl FnOnce(crate::backend::BackendError) -> AutomationError {
        AutomationError::backend(self.backend.name())
    }

    async fn settle(&self) -> SyncOutcome {
        self.sync.await_settle(self.config.settle_timeout()).await
    }

    /// Walks the pointer to `query`, resolving it once to plan the path and
    /// again just before the final placement.
    async fn travel(&mut self, query: &PointQuery, motion: Motion) -> Result<(SyncOutcome, ScreenPoint), AutomationError> {
        let planned = query.resolution()?;
        let motion = motion.resolve(planned.preferred_motion());
        let source = self.backend.pointer_position().await.map_err(self.backend_err())?;
        let path = motion::plan(source, planned.point, motion);

        let step_delay = self.config.step_delay();
        let intermediate = path.steps().saturating_sub(1);
        for &point in path.points().iter().skip(1).take(intermediate) {
            self.backend.move_to(point).await.map_err(self.backend_err())?;
            if !step_delay.is_zero() {
                tokio::time::sleep(step_delay).await;
            }
        }

        // The target may have moved while the pointer travelled.
        let arrived = query.query()?;
        if arrived != planned.point {
            debug!(planned = %planned.point, arrived = %arrived, "target moved during travel");
        }
        self.backend.move_to(arrived).await.map_err(self.backend_err())?;
        Ok((self.settle().await, arrived))
    }

    async fn press_settled(&mut self, inputs: &[InputId]) -> Result<SyncOutcome, AutomationError> {
        let name = self.backend.name();
        self.presses
            .press(self.backend.as_ref(), inputs)
            .await
            .map_err(AutomationError::backend(name))?;
        Ok(self.settle().await)
    }

    async fn release_settled(&mut self, inputs: &[InputId]) -> Result<SyncOutcome, AutomationError> {
        let name = self.backend.name();
        self.presses
            .release(self.backend.as_ref(), inputs)
            .await
            .map_err(AutomationError::backend(name))?;
        Ok(self.settle().await)
    }

    async fn click_n(&mut self, query: Option<PointQuery>, button: MouseButton, count: u32) -> Result<&mut Self, AutomationError> {
        self.finish_abandoned_drag().await;
        let action = ActionKind::Click {
            target: query.as_ref().map_or_else(|| "pointer".to_string(), PointQuery::describe),
            button,
            count,
        };
        let (span, start) = begin(&action);
        let outcome = self.clicks(query.as_ref(), button, count).instrument(span.clone()).await;
        self.finish(&span, action, start, outcome)?;
        Ok(self)
    }

    async fn clicks(&mut self, query: Option<&PointQuery>, button: MouseButton, count: u32) -> Result<SyncOutcome, AutomationError> {
        let moved = match query {
            Some(query) => self.travel(query, Motion::Default).await?.0,
            None => SyncOutcome::Settled,
        };

        let wait = self.sync.arm(EventWaitSpec::new(
            UiEventKind::MouseReleased,
            count as usize,
            self.config.event_wait_timeout(),
        ));
        let input = InputId::from(button);
        let name = self.backend.name();
        for i in 0..count {
            if i > 0 {
                tokio::time::sleep(self.config.double_click_delay()).await;
            }
            let stroke = async {
                self.presses.press(self.backend.as_ref(), &[input]).await?;
                self.presses.release(self.backend.as_ref(), &[input]).await
            }
            .await;
            if let Err(e) = stroke {
                self.compensate(input).await;
                return Err(AutomationError::backend(name)(e));
            }
        }
        Ok(worse(moved, wait.wait().await))
    }

    async fn grab(&mut self, query: &PointQuery, button: MouseButton) -> Result<SyncOutcome, AutomationError> {
        let (moved, _) = self.travel(query, Motion::Default).await?;
        let pressed = self.press_settled(&[button.into()]).await?;
        Ok(worse(moved, pressed))
    }

    async fn scroll_notches(&mut self, amount: u32, direction: ScrollDirection) -> Result<SyncOutcome, AutomationError> {
        let (axis, notch) = direction.notch();
        let mut outcome = SyncOutcome::Settled;
        for _ in 0..amount {
            self.backend.scroll(notch, axis).await.map_err(self.backend_err())?;
            outcome = worse(outcome, self.settle().await);
        }
        Ok(outcome)
    }

    async fn write_text(&mut self, text: &str) -> Result<SyncOutcome, AutomationError> {
        self.backend.type_text(text).await.map_err(self.backend_err())?;
        Ok(self.settle().await)
    }

    async fn stroke_keys(&mut self, keys: &[Key]) -> Result<SyncOutcome, AutomationError> {
        let mut outcome = SyncOutcome::Settled;
        for &key in keys {
            let input = InputId::from(key);
            match self.stroke(input).await {
                Ok(stroked) => outcome = worse(outcome, stroked),
                Err(e) => {
                    self.compensate(input).await;
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    async fn stroke(&mut self, input: InputId) -> Result<SyncOutcome, AutomationError> {
        let pressed = self.press_settled(&[input]).await?;
        let released = self.release_settled(&[input]).await?;
        Ok(worse(pressed, released))
    }

    async fn chord(&mut self, keys: &[Key]) -> Result<SyncOutcome, AutomationError> {
        let inputs: Vec<InputId> = keys.iter().map(|&k| k.into()).collect();
        let reversed: Vec<InputId> = inputs.iter().rev().copied().collect();
        if let Err(e) = self.press_settled(&inputs).await {
            let _ = self.release_settled(&reversed).await;
            return Err(e);
        }
        self.release_settled(&reversed).await
    }

    /// Releases the button of a [`Drag`] that was dropped while still held.
    async fn finish_abandoned_drag(&mut self) {
        if let Some(button) = self.open_drag.take() {
            let input = InputId::from(button);
            if self.presses.is_held(input) {
                warn!(%input, "drag ended without a release, releasing");
            }
            self.compensate(input).await;
        }
    }

    /// Best-effort release after a failed gesture; the original error wins.
    async fn compensate(&mut self, input: InputId) {
        if !self.presses.is_held(input) {
            return;
        }
        if let Err(e) = self.presses.release(self.backend.as_ref(), &[input]).await {
            debug!(%input, error = %e, "compensating release failed");
        }
        let _ = self.settle().await;
    }

    fn finish(
        &self,
        span: &Span,
        action: ActionKind,
        start: Instant,
        outcome: Result<SyncOutcome, AutomationError>,
    ) -> Result<(), AutomationError> {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let result = match &outcome {
            Ok(SyncOutcome::TimedOut { waiting_for, .. }) => ActionResult::Unsettled(waiting_for.clone()),
            Ok(_) => ActionResult::Success,
            Err(e) => ActionResult::Failure(e.to_string()),
        };
        span.in_scope(|| debug!(elapsed_ms, success = outcome.is_ok(), "action complete"));
        self.session.log_action(action, result, Some(elapsed_ms));
        outcome.map(drop)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("session", &self.session.id)
            .field("backend", &self.backend.name())
            .field("held", &self.presses.held())
            .finish_non_exhaustive()
    }
}

/// A drag in progress: the button is down and the pointer is on the source.
///
/// Every step that fails releases the button before returning the error.
/// Dropping a drag without releasing defers the release to the
/// controller's next gesture.
pub struct Drag<'a> {
    controller: &'a mut Controller,
    button: MouseButton,
    from: String,
}

impl<'a> Drag<'a> {
    /// Where the drag started.
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Moves the held pointer to `target`.
    pub async fn to(&mut self, target: impl Into<Target>) -> Result<&mut Self, AutomationError> {
        let query = self.controller.point(target);
        self.to_with(query, Motion::Default).await
    }

    /// Moves the held pointer to `query` along `motion`.
    pub async fn to_with(&mut self, query: PointQuery, motion: Motion) -> Result<&mut Self, AutomationError> {
        if let Err(e) = self.controller.move_action(query, motion).await {
            self.controller.compensate(self.button.into()).await;
            self.controller.open_drag = None;
            return Err(e);
        }
        Ok(self)
    }

    /// Releases the button, ending the drag.
    pub async fn release(self) -> Result<&'a mut Controller, AutomationError> {
        let button = self.button;
        self.controller.release_action(vec![button.into()]).await?;
        self.controller.open_drag = None;
        Ok(self.controller)
    }

    /// Moves to `target` and releases there.
    pub async fn drop_to(mut self, target: impl Into<Target>) -> Result<&'a mut Controller, AutomationError> {
        self.to(target).await?;
        self.release().await
    }
}

impl std::fmt::Debug for Drag<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drag")
            .field("from", &self.from)
            .field("button", &self.button)
            .finish()
    }
}

fn begin(action: &ActionKind) -> (Span, Instant) {
    (info_span!("action", action = action.name()), Instant::now())
}

/// Keeps a timeout if either step timed out.
fn worse(a: SyncOutcome, b: SyncOutcome) -> SyncOutcome {
    if a.is_timed_out() {
        a
    } else {
        b
    }
}
