//! # stagehand-core
//!
//! Target resolution and input synthesis for automating GUI applications
//! under test.
//!
//! This crate finds elements in a running application's UI tree, resolves
//! them to screen coordinates, and synthesizes mouse and keyboard input that
//! the application's event loop perceives as real user action. After every
//! action it waits for the UI thread to catch up, so tests never race the
//! application.
//!
//! ## Modules
//!
//! - [`app`] - The [`Application`](app::Application) seam a toolkit integration implements
//! - [`element`] - Element and window handles over the application's UI tree
//! - [`query`] - Selector, label and predicate lookups with visibility filtering
//! - [`windows`] - Window enumeration ordered by ownership proximity
//! - [`resolve`] - Anchor-aware resolution of targets to screen points
//! - [`motion`] - Interpolated pointer paths
//! - [`backend`] - Native (OS) and toolkit (injected) input backends
//! - [`press`] - Idempotent press/release bookkeeping
//! - [`sync`] - Waiting for the UI thread after each action
//! - [`controller`] - The chainable click/drag/type/scroll API
//! - [`session`] - Per-run state: last-targeted window, action log, events
//! - [`diagnostics`] - Failure reports with screen captures
//!
//! ## Backends
//!
//! The toolkit backend is always available and needs no display server. The
//! native backend drives the OS input layer and is built with the `native`
//! cargo feature; select it with `STAGEHAND_BACKEND=native`.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stagehand_core::app::Application;
//! use stagehand_core::config::AutomationConfig;
//! use stagehand_core::controller::Controller;
//! use stagehand_core::input::MouseButton;
//!
//! # async fn run(app: Arc<dyn Application>) -> Result<(), stagehand_core::error::AutomationError> {
//! let mut robot = Controller::new(app, AutomationConfig::from_env())?;
//!
//! if let Err(err) = robot.click_on("#submitBtn", MouseButton::Primary).await {
//!     let report = robot.diagnose(&err).await;
//!     eprintln!("{}", report);
//!     return Err(err);
//! }
//! robot.release_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod app;
pub mod backend;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod element;
pub mod error;
pub mod geometry;
pub mod input;
pub mod motion;
pub mod press;
pub mod query;
pub mod resolve;
pub mod session;
pub mod sync;
pub mod windows;

#[cfg(test)]
mod test_support;
