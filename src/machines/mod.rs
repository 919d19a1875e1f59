pub mod registry;

pub use registry::{EnrollmentReceipt, MachineRegistry};
