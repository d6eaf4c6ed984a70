/// Sample timestamps.
///
/// Every stored sample carries its time as text in the form YYYYMMDD_HHMMSS, local wall-clock time
/// with second precision.  This format sorts lexicographically in time order, which the store
/// relies on when it orders rows by their time key.
use anyhow::{bail, Result};
use chrono::{Local, NaiveDateTime, SubsecRound};

pub type Timestamp = NaiveDateTime;

const SAMPLE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn now() -> Timestamp {
    Local::now().naive_local().trunc_subsecs(0)
}

pub fn format_sample_time(t: Timestamp) -> String {
    t.format(SAMPLE_TIME_FORMAT).to_string()
}

pub fn parse_sample_time(s: &str) -> Result<Timestamp> {
    match NaiveDateTime::parse_from_str(s.trim(), SAMPLE_TIME_FORMAT) {
        Ok(t) => Ok(t),
        Err(_) => bail!("Invalid sample time '{s}'"),
    }
}

#[test]
fn test_sample_time() {
    let t = parse_sample_time("20240101_000000").unwrap();
    assert!(format_sample_time(t) == "20240101_000000");
    let u = parse_sample_time("20240101_013000").unwrap();
    assert!((u - t).num_seconds() == 5400);
    assert!(parse_sample_time("2024-01-01 00:00:00").is_err());
    assert!(parse_sample_time("").is_err());
    assert!(format_sample_time(now()).len() == 15);
}
