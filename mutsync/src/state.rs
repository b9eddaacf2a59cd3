use crate::error::MutationError;
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

impl MutationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MutationStatus::Success | MutationStatus::Error)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Default)]
pub struct Progress {
    pub attempt: u32,
    pub max_retries: u32,
}

/// Snapshot rendered by the UI. The status enum makes pending, success and
/// error mutually exclusive.
#[derive(Clone, Debug, Default)]
pub struct MutationState {
    status: MutationStatus,
    data: Option<JsonValue>,
    error: Option<MutationError>,
    progress: Progress,
    generation: u64,
}

impl MutationState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            progress: Progress { attempt: 0, max_retries },
            ..Default::default()
        }
    }

    pub fn status(&self) -> MutationStatus {
        self.status
    }
    pub fn is_idle(&self) -> bool {
        self.status == MutationStatus::Idle
    }
    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }
    pub fn is_success(&self) -> bool {
        self.status == MutationStatus::Success
    }
    pub fn is_error(&self) -> bool {
        self.status == MutationStatus::Error
    }
    pub fn data(&self) -> Option<&JsonValue> {
        self.data.as_ref()
    }
    pub fn error(&self) -> Option<&MutationError> {
        self.error.as_ref()
    }
    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Enters `Pending` for a new call and returns its generation.
    pub(crate) fn start(&mut self) -> u64 {
        self.generation += 1;
        self.status = MutationStatus::Pending;
        self.progress.attempt = 0;
        self.generation
    }

    pub(crate) fn record_retry(&mut self, generation: u64, attempt: u32) -> bool {
        if !self.owns(generation) {
            return false;
        }
        self.progress.attempt = attempt;
        true
    }

    pub(crate) fn succeed(&mut self, generation: u64, data: JsonValue) -> bool {
        if !self.owns(generation) {
            return false;
        }
        self.status = MutationStatus::Success;
        self.data = Some(data);
        self.error = None;
        true
    }

    pub(crate) fn fail(&mut self, generation: u64, error: MutationError) -> bool {
        if !self.owns(generation) {
            return false;
        }
        self.status = MutationStatus::Error;
        self.error = Some(error);
        self.data = None;
        true
    }

    /// Terminal states return to `Idle`; `Pending` is left alone.
    pub(crate) fn reset(&mut self) -> bool {
        if !self.status.is_terminal() {
            return false;
        }
        self.status = MutationStatus::Idle;
        self.data = None;
        self.error = None;
        self.progress.attempt = 0;
        true
    }

    // Stale calls (superseded by a newer start) never move the state.
    fn owns(&self, generation: u64) -> bool {
        self.status == MutationStatus::Pending && self.generation == generation
    }
}
