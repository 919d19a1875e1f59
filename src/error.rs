//! Typed errors for the session engine.
//!
//! Orchestration layers (controller, database, CLI) wrap these in
//! `anyhow::Error`; callers that need to tell a retryable capture failure
//! from a precondition failure can `downcast_ref::<SessionError>()`.

use thiserror::Error;

use crate::timer::Eligibility;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("sample grid {width}x{height} is too small")]
    InvalidSampleSize { width: u32, height: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("add at least one machine before generating a plan")]
    NoMachines,
    #[error("total of {total} min is too short for {machines} machine(s); need at least {minimum} min")]
    TotalTooShort {
        total: u32,
        machines: usize,
        minimum: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("total minutes must be between {min} and {max}, got {value}")]
    TotalOutOfRange { value: u32, min: u32, max: u32 },
    #[error("slack minutes must be between 0 and {max}, got {value}")]
    SlackOutOfRange { value: u32, max: u32 },
    #[error("a session is already running; reset it before planning again")]
    SessionActive,
    #[error("no plan generated yet")]
    NoPlan,
    #[error("please enroll a reference for {0} before starting")]
    UnenrolledMachine(String),
    #[error("no segment is in progress")]
    NoActiveSegment,
    #[error("capture outside allowed window ({0})")]
    OutsideWindow(Eligibility),
    #[error("machine does not match enrolled reference (best score {})", best_score.map_or_else(|| "n/a".to_string(), |s| s.to_string()))]
    NoMatch { best_score: Option<u32> },
}

impl SessionError {
    /// Failures the user can recover from by trying the same capture again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::NoMatch { .. }
                | SessionError::OutsideWindow(Eligibility::TooEarly { .. })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("machine name cannot be blank")]
    EmptyName,
    #[error("unknown machine {0}")]
    UnknownMachine(String),
    #[error("cannot remove {0}: at least one machine is required")]
    LastMachine(String),
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera unavailable: {0}. Check that the device is connected and permission is granted")]
    Unavailable(String),
    #[error("open the camera before capturing")]
    NotOpen,
    #[error("failed to read frame: {0}")]
    Frame(String),
    #[error(transparent)]
    Hash(#[from] HashError),
}
