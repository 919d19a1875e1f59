use std::convert::TryFrom;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use crate::models::DayOutcome;
use crate::utils::time::parse_day_key;

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn parse_day(value: &str) -> Result<NaiveDate> {
    parse_day_key(value).ok_or_else(|| anyhow!("invalid calendar day '{value}'"))
}

pub fn parse_outcome(value: &str) -> Result<DayOutcome> {
    DayOutcome::parse(value).ok_or_else(|| anyhow!("unknown day outcome {value}"))
}
