// Copyright (c) 2024 The hpcrun developers.
// Part of hpcrun, released under the BSD 3-Clause License.

use speedate::{Date, DateTime, Duration, Time};

use crate::Error;

const SECONDS_PER_DAY: u64 = 86_400;

/// Walltime requested when neither the caller nor the system sets one.
pub fn default_walltime() -> Duration {
    Duration::new(true, 0, 4 * 3600, 0).expect("4 hours is a valid duration")
}

/// Construct a positive `Duration` from a number of seconds.
///
/// # Errors
/// `Err(hpcrun::Error::InvalidWalltime)` when the duration is too long to
/// represent.
///
pub fn from_seconds(seconds: u64, microseconds: u32) -> Result<Duration, Error> {
    let day = u32::try_from(seconds / SECONDS_PER_DAY)
        .map_err(|_| Error::InvalidWalltime(seconds.to_string()))?;
    #[allow(clippy::cast_possible_truncation)]
    let second = (seconds % SECONDS_PER_DAY) as u32;

    Duration::new(true, day, second, microseconds)
        .map_err(|_| Error::InvalidWalltime(seconds.to_string()))
}

/// Parse a walltime.
///
/// The accepted forms are tried in order:
/// * A (possibly fractional) number of seconds.
/// * `[[DD:]HH:]MM:SS`. Any fractional part of a field is dropped.
/// * An ISO 8601 duration such as `PT4H30M`.
/// * A time of day, which is taken as the interval since midnight.
/// * A date and time, taken as the interval since midnight today (in the
///   date-time's offset, UTC when it has none).
///
/// # Errors
/// `Err(hpcrun::Error::InvalidWalltime)` when `value` matches none of these.
///
pub fn parse(value: &str) -> Result<Duration, Error> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            return from_seconds(
                seconds.trunc() as u64,
                (seconds.fract() * 1e6).round() as u32,
            );
        }
    }

    if let Some(seconds) = parse_fields(value) {
        return from_seconds(seconds, 0);
    }

    if let Ok(duration) = Duration::parse_str(value) {
        if duration.positive {
            return Ok(duration);
        }
    }

    if let Ok(time) = Time::parse_str(value) {
        let seconds =
            u64::from(time.hour) * 3600 + u64::from(time.minute) * 60 + u64::from(time.second);
        return from_seconds(seconds, time.microsecond);
    }

    if let Ok(datetime) = DateTime::parse_str(value) {
        let today = Date::today(datetime.time.tz_offset.unwrap_or(0))
            .map_err(|_| Error::InvalidWalltime(value.into()))?;
        if let Some(seconds) = since_midnight(&datetime, &today) {
            return from_seconds(seconds, datetime.time.microsecond);
        }
    }

    Err(Error::InvalidWalltime(value.into()))
}

/// Seconds from midnight on `today` until `datetime`, when not in the past.
fn since_midnight(datetime: &DateTime, today: &Date) -> Option<u64> {
    u64::try_from(datetime.timestamp() - today.timestamp()).ok()
}

/// Parse `[[DD:]HH:]MM:SS` into a number of seconds.
fn parse_fields(value: &str) -> Option<u64> {
    let fields: Vec<&str> = value.split(':').collect();
    if fields.len() < 2 || fields.len() > 4 {
        return None;
    }

    let mut seconds: u64 = 0;
    for (field, scale) in fields.iter().rev().zip([1, 60, 3600, SECONDS_PER_DAY]) {
        let whole = field.split('.').next().unwrap_or_default();
        let number: u64 = whole.parse().ok()?;
        seconds = seconds.checked_add(number.checked_mul(scale)?)?;
    }

    Some(seconds)
}

/// Format a walltime as `HH:MM:SS`.
///
/// Days are folded into the hours field.
pub fn hours_minutes_seconds(walltime: &Duration) -> String {
    let total = walltime.signed_total_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}

/// Serialize an optional walltime as a `HH:MM:SS` string and deserialize it
/// from any form accepted by `parse`.
pub(crate) mod optional {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use speedate::Duration;

    pub(crate) fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(walltime) => serializer.serialize_str(&super::hours_minutes_seconds(walltime)),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        value
            .map(|s| super::parse(&s).map_err(de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::parallel;

    fn seconds(value: &str) -> i64 {
        parse(value)
            .expect("valid walltime")
            .signed_total_seconds()
    }

    #[test]
    #[parallel]
    fn numbers() {
        assert_eq!(seconds("3600"), 3600);
        assert_eq!(seconds(" 90 "), 90);
        assert_eq!(seconds("1e3"), 1000);

        let fractional = parse("10.5").unwrap();
        assert_eq!(fractional.signed_total_seconds(), 10);
        assert_eq!(fractional.microsecond, 500_000);
    }

    #[test]
    #[parallel]
    fn fields() {
        assert_eq!(seconds("01:30"), 90);
        assert_eq!(seconds("2:00:00"), 7200);
        assert_eq!(seconds("1:02:03:04"), 86_400 + 2 * 3600 + 3 * 60 + 4);
        assert_eq!(seconds("48:00:00"), 48 * 3600);
        assert_eq!(seconds("00:10.9"), 10);
    }

    #[test]
    #[parallel]
    fn iso_duration() {
        assert_eq!(seconds("PT4H30M"), 4 * 3600 + 30 * 60);
        assert_eq!(seconds("P1DT1S"), 86_401);
    }

    #[test]
    #[parallel]
    fn time_of_day() {
        assert_eq!(seconds("14:30:00Z"), 14 * 3600 + 30 * 60);
    }

    #[test]
    #[parallel]
    fn date_time() {
        let today = Date {
            year: 2026,
            month: 10,
            day: 18,
        };
        let tomorrow = DateTime::parse_str("2026-10-19T06:00:00").unwrap();
        assert_eq!(since_midnight(&tomorrow, &today), Some(30 * 3600));

        let later_today = DateTime::parse_str("2026-10-18T01:30:00Z").unwrap();
        assert_eq!(since_midnight(&later_today, &today), Some(5400));

        let yesterday = DateTime::parse_str("2026-10-17T23:00:00").unwrap();
        assert_eq!(since_midnight(&yesterday, &today), None);

        assert!(seconds("2999-01-01T00:00:00") > 0);
        assert!(matches!(
            parse("2000-01-01T00:00:00"),
            Err(Error::InvalidWalltime(_))
        ));
    }

    #[test]
    #[parallel]
    fn invalid() {
        assert!(matches!(parse(""), Err(Error::InvalidWalltime(_))));
        assert!(matches!(parse("soon"), Err(Error::InvalidWalltime(_))));
        assert!(matches!(parse("-5"), Err(Error::InvalidWalltime(_))));
        assert!(matches!(parse("1:2:3:4:5"), Err(Error::InvalidWalltime(_))));
        assert!(matches!(parse("a:b"), Err(Error::InvalidWalltime(_))));
    }

    #[test]
    #[parallel]
    fn format() {
        assert_eq!(hours_minutes_seconds(&default_walltime()), "04:00:00");
        assert_eq!(
            hours_minutes_seconds(&from_seconds(59, 0).unwrap()),
            "00:00:59"
        );
        assert_eq!(
            hours_minutes_seconds(&from_seconds(2 * 86_400 + 3661, 0).unwrap()),
            "49:01:01"
        );
    }
}
