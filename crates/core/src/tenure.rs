//! Tenure condition durations.
//!
//! Rules write their minimum tenure as a compact duration string such as
//! `"720h"`, `"1h30m"` or `"1.5h"`: one or more decimal numbers, each followed
//! by a unit (`ns`, `us`/`µs`/`μs`, `ms`, `s`, `m`, `h`), with an optional
//! leading sign. A bare `"0"` is also accepted.

use crate::error::{RoleSyncError, RoleSyncResult};
use chrono::{DateTime, Duration, Utc};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Fraction digits beyond nanosecond precision cannot change the result.
const MAX_FRACTION_DIGITS: usize = 18;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(60 * NANOS_PER_SECOND),
        "h" => Some(3_600 * NANOS_PER_SECOND),
        _ => None,
    }
}

/// Parses a duration string into a [`Duration`].
pub fn parse_duration(input: &str) -> RoleSyncResult<Duration> {
    let invalid = |reason: String| RoleSyncError::InvalidDuration {
        input: input.to_string(),
        reason,
    };

    let (negative, mut rest) = if let Some(tail) = input.strip_prefix('-') {
        (true, tail)
    } else if let Some(tail) = input.strip_prefix('+') {
        (false, tail)
    } else {
        (false, input)
    };

    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(invalid("empty duration".into()));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);

        let (frac_part, after) = match after.strip_prefix('.') {
            Some(tail) => tail.split_at(tail.bytes().take_while(u8::is_ascii_digit).count()),
            None => ("", after),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid("expected a number".into()));
        }

        let unit_len = after
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_len);
        if unit.is_empty() {
            return Err(invalid("missing unit".into()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| invalid(format!("unknown unit {unit:?}")))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| invalid("number out of range".into()))?
        };
        let mut nanos = whole
            .checked_mul(scale)
            .ok_or_else(|| invalid("duration out of range".into()))?;

        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
            let frac: u128 = digits
                .parse()
                .map_err(|_| invalid("number out of range".into()))?;
            nanos += frac * scale / 10u128.pow(digits.len() as u32);
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| invalid("duration out of range".into()))?;
        rest = tail;
    }

    let nanos = i64::try_from(total).map_err(|_| invalid("duration out of range".into()))?;
    Ok(Duration::nanoseconds(if negative { -nanos } else { nanos }))
}

/// True once `min_tenure` has fully elapsed since `joined_at`.
///
/// The boundary instant counts as met: only `joined_at + min_tenure > now`
/// fails the condition.
pub fn tenure_met(joined_at: DateTime<Utc>, min_tenure: Duration, now: DateTime<Utc>) -> bool {
    match joined_at.checked_add_signed(min_tenure) {
        Some(eligible_at) => eligible_at <= now,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hours() {
        assert_eq!(parse_duration("720h").unwrap(), Duration::hours(720));
        assert_eq!(parse_duration("168h").unwrap(), Duration::days(7));
    }

    #[test]
    fn compound_and_fractional() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::minutes(90)
        );
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::milliseconds(500));
        assert_eq!(
            parse_duration("2m3.25s").unwrap(),
            Duration::milliseconds(123_250)
        );
        assert_eq!(parse_duration("300ms").unwrap(), Duration::milliseconds(300));
        assert_eq!(parse_duration("10µs").unwrap(), Duration::microseconds(10));
        assert_eq!(parse_duration("7ns").unwrap(), Duration::nanoseconds(7));
    }

    #[test]
    fn signs_and_zero() {
        assert_eq!(parse_duration("0").unwrap(), Duration::zero());
        assert_eq!(parse_duration("-2h").unwrap(), Duration::hours(-2));
        assert_eq!(parse_duration("+2h").unwrap(), Duration::hours(2));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        for bad in ["", "-", "h", "10", "10d", "1h 30m", "1..5h", "abc", "30 days"] {
            let err = parse_duration(bad).unwrap_err();
            assert!(
                matches!(err, RoleSyncError::InvalidDuration { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(parse_duration("99999999999999999999h").is_err());
        assert!(parse_duration("3000000h").is_err());
    }

    #[test]
    fn tenure_boundary_is_inclusive() {
        let now = Utc::now();
        let min = Duration::hours(168);
        assert!(tenure_met(now - min, min, now));
        assert!(tenure_met(now - min - Duration::seconds(1), min, now));
        assert!(!tenure_met(now - min + Duration::seconds(1), min, now));
    }
}
