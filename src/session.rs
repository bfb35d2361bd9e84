//! Multi-sample enrollment buffer.
//!
//! A single embedding is noisy under pose and lighting changes, so enrollment
//! collects several samples for one candidate and stores all of them under
//! the same label. Samples closer together than the capture interval are
//! dropped to avoid enrolling a run of near-identical frames.

use log::{debug, warn};

use crate::embedding::Embedding;

/// Outcome of offering one sample to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// The session is not collecting; the sample was ignored.
    Idle,
    /// Too soon after the previous accepted sample.
    Throttled,
    /// Timestamp earlier than the previous accepted sample.
    OutOfOrder,
    /// Sample stored; `collected` samples held so far.
    Added { collected: usize },
    /// Sample stored and the buffer is full. Collection has stopped.
    Complete,
}

#[derive(Debug, Clone)]
pub struct EnrollmentSession {
    target_sample_count: usize,
    min_capture_interval_ms: u64,
    collected: Vec<Embedding>,
    collecting: bool,
    last_capture: Option<u64>,
}

impl EnrollmentSession {
    pub fn new(target_sample_count: usize, min_capture_interval_ms: u64) -> Self {
        let target_sample_count = if target_sample_count == 0 {
            warn!("target_sample_count must be positive, using 1");
            1
        } else {
            target_sample_count
        };
        Self {
            target_sample_count,
            min_capture_interval_ms,
            collected: Vec::with_capacity(target_sample_count),
            collecting: false,
            last_capture: None,
        }
    }

    pub fn start(&mut self) {
        self.collected.clear();
        self.collecting = true;
        self.last_capture = None;
    }

    pub fn reset(&mut self) {
        self.collected.clear();
        self.collecting = false;
        self.last_capture = None;
    }

    pub fn try_add(&mut self, embedding: Embedding, timestamp_ms: u64) -> Capture {
        if !self.collecting {
            return Capture::Idle;
        }

        if let Some(last) = self.last_capture {
            if timestamp_ms < last {
                warn!("dropping out-of-order sample: {} < {}", timestamp_ms, last);
                return Capture::OutOfOrder;
            }
            if timestamp_ms - last < self.min_capture_interval_ms {
                return Capture::Throttled;
            }
        }

        self.collected.push(embedding);
        self.last_capture = Some(timestamp_ms);
        debug!(
            "enrollment sample {}/{} at {}ms",
            self.collected.len(),
            self.target_sample_count,
            timestamp_ms
        );

        if self.collected.len() >= self.target_sample_count {
            self.collecting = false;
            Capture::Complete
        } else {
            Capture::Added {
                collected: self.collected.len(),
            }
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Buffer is full and waiting to be finalized.
    pub fn is_complete(&self) -> bool {
        !self.collecting && self.collected.len() >= self.target_sample_count
    }

    pub fn len(&self) -> usize {
        self.collected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    pub fn target_sample_count(&self) -> usize {
        self.target_sample_count
    }

    /// Percentage of the target collected so far, for progress display.
    pub fn progress(&self) -> u8 {
        (self.collected.len() * 100 / self.target_sample_count).min(100) as u8
    }

    pub fn samples(&self) -> &[Embedding] {
        &self.collected
    }

    /// Move the collected samples out and return to the stopped state.
    pub fn take_samples(&mut self) -> Vec<Embedding> {
        self.collecting = false;
        self.last_capture = None;
        std::mem::take(&mut self.collected)
    }
}
