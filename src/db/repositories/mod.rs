pub mod calendar;
pub mod enrollments;
pub mod machines;
pub mod sessions;
