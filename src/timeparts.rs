use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};

/// Calendar breakdown derived from a raw epoch-millis timestamp.
///
/// Pure and deterministic: everything is computed from the input value,
/// never from the wall clock. This is what feeds the time dimension, so
/// the same `ts` must always produce the same row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeParts {
    pub start_datetime: NaiveDateTime,
    pub start_timestamp: f64,
    pub year: i32,
    pub month: u32,
    pub day_of_month: u32,
    pub hour: u32,
    pub week_of_year: u32,
}

impl TimeParts {
    pub fn from_epoch_millis(ts: i64) -> Result<TimeParts> {
        let datetime = DateTime::from_timestamp_millis(ts)
            .ok_or_else(|| anyhow!("timestamp out of range: {}", ts))?
            .naive_utc();

        Ok(TimeParts {
            start_datetime: datetime,
            start_timestamp: ts as f64 / 1000.0,
            year: datetime.year(),
            month: datetime.month(),
            day_of_month: datetime.day(),
            hour: datetime.hour(),
            week_of_year: datetime.iso_week().week(),
        })
    }
}

/// ISO-8601 text form without timezone suffix. The fraction is printed
/// in microseconds and omitted entirely when zero.
pub fn isoformat(datetime: &NaiveDateTime) -> String {
    if datetime.and_utc().timestamp_subsec_micros() == 0 {
        datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        datetime.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

pub fn parse_isoformat(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| anyhow!("invalid datetime text {:?}: {}", text, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_known_timestamp() {
        let parts = TimeParts::from_epoch_millis(1541440192796).unwrap();
        assert_eq!(parts.year, 2018);
        assert_eq!(parts.month, 11);
        assert_eq!(parts.day_of_month, 5);
        assert_eq!(parts.hour, 17);
        assert_eq!(parts.week_of_year, 45);
        assert_eq!(parts.start_timestamp, 1541440192.796);
        assert_eq!(isoformat(&parts.start_datetime), "2018-11-05T17:49:52.796000");
    }

    #[test]
    fn whole_seconds_render_without_fraction() {
        let parts = TimeParts::from_epoch_millis(1541440192000).unwrap();
        assert_eq!(isoformat(&parts.start_datetime), "2018-11-05T17:49:52");
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = TimeParts::from_epoch_millis(1542241826796).unwrap();
        let b = TimeParts::from_epoch_millis(1542241826796).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn isoformat_round_trips() {
        for ts in [1541440192796, 1541440192000, 1546300800123] {
            let parts = TimeParts::from_epoch_millis(ts).unwrap();
            let text = isoformat(&parts.start_datetime);
            assert_eq!(parse_isoformat(&text).unwrap(), parts.start_datetime);
        }
    }

    #[test]
    fn rejects_out_of_range_timestamp() {
        assert!(TimeParts::from_epoch_millis(i64::MAX).is_err());
    }
}
