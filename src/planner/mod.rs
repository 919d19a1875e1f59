pub mod algorithm;
pub mod config;

pub use algorithm::plan_session;
pub use config::PlannerConfig;
