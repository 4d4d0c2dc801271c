//! Keeping the driver in step with the UI thread.
//!
//! After every primitive action the controller waits here before issuing
//! the next one. Two waits are available:
//!
//! - [`EventSynchronizer::await_settle`] round-trips a few no-op tasks
//!   through the UI thread's queue so that work queued by the action, and
//!   work queued by that work, has run.
//! - [`EventSynchronizer::arm`] subscribes to the application's UI events
//!   *before* an action and [`ArmedWait::wait`] blocks until enough events of
//!   one kind have been seen.
//!
//! Both waits are bounded. A timeout never fails the caller: it is logged,
//! recorded in the session, and returned as [`SyncOutcome::TimedOut`].
//! Callers that want a hard failure use [`SyncOutcome::into_result`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::app::{Application, UiEvent, UiEventKind, UiThreadGone};
use crate::config::AutomationConfig;
use crate::error::AutomationError;
use crate::session::AutomationSession;

/// What a precise wait looks for. Consumed by the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWaitSpec {
    /// The event kind to count.
    pub kind: UiEventKind,
    /// How many events of `kind` must be seen.
    pub min_count: usize,
    /// Upper bound for the wait.
    pub timeout: Duration,
}

impl EventWaitSpec {
    pub fn new(kind: UiEventKind, min_count: usize, timeout: Duration) -> Self {
        Self {
            kind,
            min_count,
            timeout,
        }
    }

    fn describe(&self) -> String {
        format!("{} {:?} event(s)", self.min_count, self.kind)
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The UI queue drained.
    Settled,
    /// The expected events were observed.
    Observed {
        /// Matching events seen.
        count: usize,
    },
    /// The wait gave up; execution may continue.
    TimedOut {
        /// What was being waited for.
        waiting_for: String,
        /// How long the wait lasted.
        waited_ms: u64,
    },
}

impl SyncOutcome {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Turns a timeout into [`AutomationError::SynthesisTimeout`].
    pub fn into_result(self) -> Result<Self, AutomationError> {
        match self {
            Self::TimedOut {
                waiting_for,
                waited_ms,
            } => Err(AutomationError::SynthesisTimeout {
                waiting_for,
                waited_ms,
            }),
            other => Ok(other),
        }
    }
}

/// Blocks the driver until the UI thread has caught up.
#[derive(Clone)]
pub struct EventSynchronizer {
    app: Arc<dyn Application>,
    session: Arc<AutomationSession>,
    drain_rounds: u32,
}

impl EventSynchronizer {
    pub fn new(app: Arc<dyn Application>, session: Arc<AutomationSession>, config: &AutomationConfig) -> Self {
        Self {
            app,
            session,
            drain_rounds: config.drain_rounds.max(1),
        }
    }

    /// Waits until `drain_rounds` no-op tasks have passed through the UI
    /// queue, or `timeout` elapses.
    pub async fn await_settle(&self, timeout: Duration) -> SyncOutcome {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.drain()).await {
            Ok(Ok(())) => {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "ui queue drained");
                SyncOutcome::Settled
            }
            Ok(Err(UiThreadGone)) => self.timed_out("UI queue drain (UI thread gone)", start),
            Err(_) => self.timed_out("UI queue drain", start),
        }
    }

    /// Subscribes for `spec` now; the returned wait only counts events fired
    /// after this call.
    pub fn arm(&self, spec: EventWaitSpec) -> ArmedWait {
        ArmedWait {
            sync: self.clone(),
            events: self.app.subscribe_events(),
            spec,
        }
    }

    /// Subscribes and waits in one step, for events that have not fired yet.
    pub async fn await_signature(&self, kind: UiEventKind, min_count: usize, timeout: Duration) -> SyncOutcome {
        self.arm(EventWaitSpec::new(kind, min_count, timeout)).wait().await
    }

    async fn drain(&self) -> Result<(), UiThreadGone> {
        for _ in 0..self.drain_rounds {
            let (tx, rx) = oneshot::channel();
            self.app.run_later(Box::new(move || {
                let _ = tx.send(());
            }))?;
            // A dropped task means the queue was torn down.
            rx.await.map_err(|_| UiThreadGone)?;
        }
        Ok(())
    }

    fn timed_out(&self, waiting_for: &str, start: Instant) -> SyncOutcome {
        let waited_ms = start.elapsed().as_millis() as u64;
        warn!(waiting_for, waited_ms, "synchronization timed out, continuing");
        self.session.report_sync_timeout(waiting_for, waited_ms);
        SyncOutcome::TimedOut {
            waiting_for: waiting_for.to_string(),
            waited_ms,
        }
    }
}

impl std::fmt::Debug for EventSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSynchronizer")
            .field("app", &"<Arc<dyn Application>>")
            .field("session", &self.session.id)
            .field("drain_rounds", &self.drain_rounds)
            .finish()
    }
}

/// A precise wait subscribed ahead of the action it verifies.
pub struct ArmedWait {
    sync: EventSynchronizer,
    events: Option<broadcast::Receiver<UiEvent>>,
    spec: EventWaitSpec,
}

impl ArmedWait {
    /// Counts matching events until `min_count` is reached or the timeout
    /// elapses.
    ///
    /// Applications that cannot report events get a drain wait instead.
    pub async fn wait(self) -> SyncOutcome {
        let Self { sync, events, spec } = self;
        let Some(mut events) = events else {
            debug!("application reports no UI events, falling back to drain wait");
            return sync.await_settle(spec.timeout).await;
        };

        let start = Instant::now();
        let mut seen = 0;
        let counted = tokio::time::timeout(spec.timeout, async {
            while seen < spec.min_count {
                match events.recv().await {
                    Ok(event) if event.kind == spec.kind => seen += 1,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "UI event stream lagged, some events were not counted");
                    }
                    Err(RecvError::Closed) => return false,
                }
            }
            true
        })
        .await;

        match counted {
            Ok(true) => {
                debug!(
                    kind = ?spec.kind,
                    count = seen,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "events observed"
                );
                SyncOutcome::Observed { count: seen }
            }
            Ok(false) | Err(_) => sync.timed_out(&spec.describe(), start),
        }
    }
}

impl std::fmt::Debug for ArmedWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmedWait")
            .field("spec", &self.spec)
            .field("subscribed", &self.events.is_some())
            .finish()
    }
}
