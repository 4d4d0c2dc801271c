//! Failure reports for lookup and resolution errors.
//!
//! A [`FailureReport`] pairs an error with the criterion that caused it and,
//! for query failures, a capture of the screen at the time of failure. It is
//! built explicitly by the caller through
//! [`Controller::diagnose`](crate::controller::Controller::diagnose); errors
//! themselves never capture anything.

use std::io::Cursor;

use base64::Engine;
use chrono::{DateTime, Utc};
use image::{ImageEncoder, ImageResult, RgbaImage};

use crate::error::AutomationError;

/// Everything needed to understand a failure without re-running the test.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// The criterion or target description, when the error has one.
    pub criterion: Option<String>,
    /// The error message.
    pub message: String,
    /// Screen contents when the report was made.
    pub capture: Option<RgbaImage>,
    /// When the report was made.
    pub timestamp: DateTime<Utc>,
}

impl FailureReport {
    /// A report for `err` with no capture.
    pub fn new(err: &AutomationError) -> Self {
        Self {
            criterion: err.criterion().map(str::to_string),
            message: err.to_string(),
            capture: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_capture(mut self, capture: RgbaImage) -> Self {
        self.capture = Some(capture);
        self
    }

    /// The capture encoded as PNG.
    pub fn capture_png(&self) -> ImageResult<Option<Vec<u8>>> {
        let Some(image) = &self.capture else {
            return Ok(None);
        };
        let mut buffer = Cursor::new(Vec::new());
        image::codecs::png::PngEncoder::new(&mut buffer).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(Some(buffer.into_inner()))
    }

    /// The capture as base64-encoded PNG, ready to embed in a test report.
    pub fn capture_png_base64(&self) -> ImageResult<Option<String>> {
        Ok(self
            .capture_png()?
            .map(|png| base64::engine::general_purpose::STANDARD.encode(png)))
    }
}

impl std::fmt::Display for FailureReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(criterion) = &self.criterion {
            write!(f, " [criterion: {}]", criterion)?;
        }
        if let Some(capture) = &self.capture {
            write!(f, " [capture: {}x{}]", capture.width(), capture.height())?;
        }
        Ok(())
    }
}
