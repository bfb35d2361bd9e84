//! Register / find mode handling on top of the enrollment session, the
//! matcher and an identity store.
//!
//! ```text
//! Idle -> Register -> Finalizing -> Idle
//! Idle -> Find -> Idle
//! ```
//!
//! Entering either mode discards whatever the session held. Nothing reaches
//! the store until [`Controller::finalize`] succeeds.

use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::{
    embedding::Embedding,
    matcher::{MatchResult, Matcher},
    quality::{FaceQuality, QualityGate},
    session::{Capture, EnrollmentSession},
    store::{EnrollmentRecord, IdentityStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Register,
    Finalizing,
    Find,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Nothing to do in the current mode, or the face failed the quality gate.
    Ignored,
    /// The session dropped the sample (throttled or out of order).
    Skipped(Capture),
    Progress { collected: usize, percent: u8 },
    /// Buffer full; waiting for [`Controller::finalize`].
    ReadyToFinalize { samples: usize },
    Identified(MatchResult),
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("no enrollment is waiting to be finalized")]
    NotFinalizing,
    #[error("identity label must not be empty")]
    EmptyLabel,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Controller {
    mode: Mode,
    session: EnrollmentSession,
    matcher: Matcher,
    gate: QualityGate,
    store: Arc<dyn IdentityStore>,
}

impl Controller {
    pub fn new(
        session: EnrollmentSession,
        matcher: Matcher,
        gate: QualityGate,
        store: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            mode: Mode::Idle,
            session,
            matcher,
            gate,
            store,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session(&self) -> &EnrollmentSession {
        &self.session
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn begin_register(&mut self) {
        self.session.start();
        self.mode = Mode::Register;
        info!(
            "registration started, collecting {} samples",
            self.session.target_sample_count()
        );
    }

    pub fn begin_find(&mut self) {
        self.session.reset();
        self.mode = Mode::Find;
    }

    /// Abandon the current mode. Collected samples are dropped unsaved.
    pub fn cancel(&mut self) {
        if self.mode != Mode::Idle {
            debug!("cancelling {:?} with {} sample(s)", self.mode, self.session.len());
        }
        self.session.reset();
        self.mode = Mode::Idle;
    }

    /// Like [`Controller::on_embedding`], after checking the face pose.
    pub fn on_face(
        &mut self,
        quality: &FaceQuality,
        embedding: Embedding,
        timestamp_ms: u64,
    ) -> Result<Event, StoreError> {
        if !self.gate.accepts(quality) {
            debug!("face rejected by quality gate: {:?}", quality);
            return Ok(Event::Ignored);
        }
        self.on_embedding(embedding, timestamp_ms)
    }

    pub fn on_embedding(
        &mut self,
        embedding: Embedding,
        timestamp_ms: u64,
    ) -> Result<Event, StoreError> {
        match self.mode {
            Mode::Idle | Mode::Finalizing => Ok(Event::Ignored),
            Mode::Register => Ok(self.register_sample(embedding, timestamp_ms)),
            Mode::Find => {
                let records = self.store.snapshot()?;
                let result = self.matcher.identify(&embedding, &records);
                info!(
                    "identified {} (score {:.3}, threshold {:.3})",
                    result.identity,
                    result.score,
                    self.matcher.threshold()
                );
                self.mode = Mode::Idle;
                Ok(Event::Identified(result))
            }
        }
    }

    fn register_sample(&mut self, embedding: Embedding, timestamp_ms: u64) -> Event {
        match self.session.try_add(embedding, timestamp_ms) {
            Capture::Added { collected } => Event::Progress {
                collected,
                percent: self.session.progress(),
            },
            Capture::Complete => {
                self.mode = Mode::Finalizing;
                info!("collected {} samples", self.session.len());
                Event::ReadyToFinalize {
                    samples: self.session.len(),
                }
            }
            Capture::Idle => Event::Ignored,
            skipped => Event::Skipped(skipped),
        }
    }

    /// Store every collected sample under `label` and return to idle.
    ///
    /// On failure the controller stays in `Finalizing` with its samples, so
    /// the caller can retry with another label or cancel.
    pub fn finalize(&mut self, label: &str) -> Result<Vec<EnrollmentRecord>, FinalizeError> {
        if self.mode != Mode::Finalizing {
            return Err(FinalizeError::NotFinalizing);
        }
        let label = label.trim();
        if label.is_empty() {
            return Err(FinalizeError::EmptyLabel);
        }

        let records: Vec<EnrollmentRecord> = self
            .session
            .samples()
            .iter()
            .map(|e| EnrollmentRecord::new(label, e.clone()))
            .collect();
        self.store.append(&records)?;

        self.session.reset();
        self.mode = Mode::Idle;
        info!("enrolled {} sample(s) for {}", records.len(), label);
        Ok(records)
    }
}
