//! Parsing of command line dates in local time.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};

/// Parse "YYYY-MM-DDTHH:MM", "YYYY-MM-DD HH:MM" or "YYYY-MM-DD" (midnight).
pub fn parse_datetime(s: &str) -> Result<DateTime<Local>> {
    let naive = ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| anyhow!("Invalid date '{}'. Expected YYYY-MM-DD or YYYY-MM-DDTHH:MM", s))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| anyhow!("'{}' does not exist in the local timezone", s))
}

/// Parse YYYY-MM-DD as local midnight.
pub fn parse_day(s: &str) -> Result<DateTime<Local>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow!("Invalid date format '{}'. Expected YYYY-MM-DD", s))?;
    date.and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .ok_or_else(|| anyhow!("'{}' has no local midnight", s))
}
