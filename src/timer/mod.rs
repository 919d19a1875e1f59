pub mod clock;
pub mod controller;
pub mod session;
pub mod ticker;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{CaptureReport, SessionController};
pub use session::{
    CaptureOutcome, SegmentStatus, SessionPhase, SessionState, MAX_TOTAL_MINUTES,
    MIN_TOTAL_MINUTES,
};
pub use ticker::TickReport;
pub use window::{Eligibility, WindowGate, WindowState, MAX_SLACK_MINUTES};
