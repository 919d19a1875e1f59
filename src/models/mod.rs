pub mod calendar;
pub mod enrollment;
pub mod machine;
pub mod plan;
pub mod session;

pub use calendar::{CalendarRecord, DayOutcome, DayStatus};
pub use enrollment::{EnrollmentMap, EnrollmentReference, FingerprintPair, FrameSize};
pub use machine::{Machine, DEFAULT_MACHINES};
pub use plan::{Plan, Segment};
pub use session::SessionSnapshot;
