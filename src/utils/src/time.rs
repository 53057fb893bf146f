use chrono::format::StrftimeItems;
use chrono::NaiveDateTime;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// current timestamp
pub fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
}

/// current timestamp in epoch milliseconds
pub fn now_millis() -> i64 {
    now().as_millis() as i64
}

pub fn unix_millis_to_time(unix_millis: i64) -> Option<NaiveDateTime> {
    let secs = unix_millis.div_euclid(1000);
    let nsecs = unix_millis.rem_euclid(1000) * 1_000_000;
    NaiveDateTime::from_timestamp_opt(secs, nsecs as u32)
}

pub fn time_format(dt: NaiveDateTime) -> String {
    let fmt = StrftimeItems::new("%Y-%m-%d %H:%M:%S");
    format!("{}", dt.format_with_items(fmt))
}

/// millis_format renders epoch milliseconds for log lines, falling back to the raw number when the
/// value is outside chrono's range.
pub fn millis_format(unix_millis: i64) -> String {
    match unix_millis_to_time(unix_millis) {
        Some(dt) => time_format(dt),
        None => unix_millis.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::time::millis_format;

    #[test]
    fn test_millis_format() {
        assert_eq!(millis_format(0), "1970-01-01 00:00:00");
        assert_eq!(millis_format(1_500), "1970-01-01 00:00:01");
    }
}
