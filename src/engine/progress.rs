//! Progress convention shared by every pipeline stage
//!
//! Each phase owns a fixed slice of the 0-100 range. Stages report the
//! fraction of their own work done and the reporter maps it into the
//! overall value, never letting it move backwards.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Progress callback trait for UI integration
pub trait ProgressCallback: Send + Sync {
    /// Called whenever the overall percentage changes
    fn on_progress(&self, update: &ProgressUpdate);
}

/// Pipeline phases and their share of the overall range
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Decoding frames from the source
    Extraction,
    /// Grouping frames into chunks and permuting them
    Segmentation,
    /// Painting the permuted frames into the encoder
    Encoding,
    /// Handing the artifact to the upload collaborator
    Upload,
}

impl ProgressPhase {
    /// Overall range `[start, end]` owned by this phase
    pub fn range(&self) -> (u8, u8) {
        match self {
            ProgressPhase::Extraction => (0, 40),
            ProgressPhase::Segmentation => (40, 50),
            ProgressPhase::Encoding => (50, 95),
            ProgressPhase::Upload => (95, 100),
        }
    }

    /// Map an intra-phase fraction to the overall percentage
    pub fn overall(&self, fraction: f64) -> u8 {
        let (start, end) = self.range();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        start + (fraction * (end - start) as f64).floor() as u8
    }
}

/// One progress notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub phase: ProgressPhase,
    /// Overall progress, 0-100
    pub percent: u8,
    pub message: Option<String>,
}

/// Thread-safe reporter enforcing monotonic progress
#[derive(Clone, Default)]
pub struct ProgressReporter {
    last: Arc<Mutex<Option<u8>>>,
    callbacks: Arc<Mutex<Vec<Arc<dyn ProgressCallback>>>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a progress callback
    pub fn add_callback(&self, callback: Arc<dyn ProgressCallback>) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(callback);
        }
    }

    /// Report `completed` of `total` units of `phase`
    pub fn report_units(&self, phase: ProgressPhase, completed: u64, total: u64) -> u8 {
        let fraction = if total == 0 {
            1.0
        } else {
            completed as f64 / total as f64
        };
        self.report(phase, fraction, None)
    }

    /// Report an intra-phase fraction; returns the overall value now in effect
    pub fn report(&self, phase: ProgressPhase, fraction: f64, message: Option<String>) -> u8 {
        let candidate = phase.overall(fraction);

        let changed = match self.last.lock() {
            Ok(mut last) => match *last {
                Some(previous) if candidate <= previous => None,
                _ => {
                    *last = Some(candidate);
                    Some(candidate)
                }
            },
            Err(_) => None,
        };

        match changed {
            Some(percent) => {
                let update = ProgressUpdate {
                    phase,
                    percent,
                    message,
                };
                self.notify_callbacks(|cb| cb.on_progress(&update));
                percent
            }
            None => self.current(),
        }
    }

    /// Mark the end of a phase
    pub fn finish_phase(&self, phase: ProgressPhase) -> u8 {
        self.report(phase, 1.0, None)
    }

    /// Last reported overall percentage
    pub fn current(&self) -> u8 {
        self.last
            .lock()
            .ok()
            .and_then(|last| *last)
            .unwrap_or_default()
    }

    fn notify_callbacks<F>(&self, f: F)
    where
        F: Fn(&dyn ProgressCallback),
    {
        if let Ok(callbacks) = self.callbacks.lock() {
            for callback in callbacks.iter() {
                f(callback.as_ref());
            }
        }
    }
}

/// Callback that logs progress through `tracing` in coarse steps
pub struct TracingProgress {
    step: u8,
    last_logged: Mutex<Option<u8>>,
}

impl TracingProgress {
    /// Log at most once per `step` percent
    pub fn new(step: u8) -> Self {
        Self {
            step: step.max(1),
            last_logged: Mutex::new(None),
        }
    }
}

impl ProgressCallback for TracingProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        let Ok(mut last) = self.last_logged.lock() else {
            return;
        };
        let due = match *last {
            None => true,
            Some(previous) => update.percent >= previous.saturating_add(self.step) || update.percent == 100,
        };
        if due && *last != Some(update.percent) {
            *last = Some(update.percent);
            match &update.message {
                Some(message) => tracing::info!(phase = ?update.phase, percent = update.percent, "{}", message),
                None => tracing::info!(phase = ?update.phase, percent = update.percent, "progress"),
            }
        }
    }
}
