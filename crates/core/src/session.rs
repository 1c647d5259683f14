use crate::catalog::FileCatalog;
use crate::error::FlowError;
use crate::models::{TranscriptEntry, UploadReceipt};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where a session is within a question-answer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CyclePhase {
    #[default]
    Idle,
    Searching,
    Generating,
}

#[derive(Debug, Default)]
struct SessionState {
    selection: Vec<String>,
    transcript: Vec<TranscriptEntry>,
    phase: CyclePhase,
    catalog: FileCatalog,
}

/// In-memory view state for one user: selected files, the chat transcript
/// and the cached file listing. Nothing here is persisted.
///
/// At most one question-answer cycle runs at a time; a second submission
/// is turned away with [`FlowError::SessionBusy`] instead of queueing.
#[derive(Debug, Default)]
pub struct ChatSession {
    state: Mutex<SessionState>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> CyclePhase {
        self.state().phase
    }

    /// Whether a question may be sent now: something is selected and no
    /// cycle is in flight.
    pub fn can_submit(&self) -> bool {
        let state = self.state();
        state.phase == CyclePhase::Idle && !state.selection.is_empty()
    }

    /// Flips a file in or out of the selection; returns whether it is now selected.
    pub fn toggle_selection(&self, file_id: &str) -> bool {
        let mut state = self.state();
        match state.selection.iter().position(|id| id == file_id) {
            Some(index) => {
                state.selection.remove(index);
                false
            }
            None => {
                state.selection.push(file_id.to_string());
                true
            }
        }
    }

    pub fn select(&self, file_id: &str) {
        let mut state = self.state();
        if !state.selection.iter().any(|id| id == file_id) {
            state.selection.push(file_id.to_string());
        }
    }

    pub fn clear_selection(&self) {
        self.state().selection.clear();
    }

    pub fn selection(&self) -> Vec<String> {
        self.state().selection.clone()
    }

    /// A fresh upload joins the selection; existing picks are kept.
    pub fn record_upload(&self, receipt: &UploadReceipt) {
        self.select(&receipt.file_id);
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.state().transcript.clone()
    }

    pub fn with_catalog_mut<R>(&self, update: impl FnOnce(&mut FileCatalog) -> R) -> R {
        update(&mut self.state().catalog)
    }

    pub fn catalog(&self) -> FileCatalog {
        self.state().catalog.clone()
    }

    /// Claims the session for one cycle. Validation happens before the claim,
    /// so a rejected submission leaves no trace.
    pub(crate) fn begin_cycle(&self, question: &str) -> Result<CycleGuard<'_>, FlowError> {
        if question.trim().is_empty() {
            return Err(FlowError::InvalidInput("question is required".to_string()));
        }

        let mut state = self.state();
        if state.selection.is_empty() {
            return Err(FlowError::InvalidInput(
                "select at least one document first".to_string(),
            ));
        }
        if state.phase != CyclePhase::Idle {
            return Err(FlowError::SessionBusy);
        }
        state.phase = CyclePhase::Searching;

        Ok(CycleGuard {
            session: self,
            selection: state.selection.clone(),
            finished: false,
        })
    }
}

/// Exclusive hold on a session for the duration of one cycle. Dropping it
/// without [`CycleGuard::finish`] (a cancelled future, say) returns the
/// session to idle and writes nothing.
pub(crate) struct CycleGuard<'a> {
    session: &'a ChatSession,
    selection: Vec<String>,
    finished: bool,
}

impl CycleGuard<'_> {
    pub(crate) fn selection(&self) -> &[String] {
        &self.selection
    }

    pub(crate) fn advance(&self, phase: CyclePhase) {
        self.session.state().phase = phase;
    }

    /// Appends the cycle's entries in order and releases the session.
    pub(crate) fn finish(mut self, entries: Vec<TranscriptEntry>) {
        let mut state = self.session.state();
        state.transcript.extend(entries);
        state.phase = CyclePhase::Idle;
        self.finished = true;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.state().phase = CyclePhase::Idle;
        }
    }
}
