//! Go-style duration strings (`12h`, `1h30m`, `90s`, `1.5h`) used for
//! lifetime labels and CLI flags, plus the nanosecond wire encoding.
use chrono::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseDurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("duration {0:?} out of range")]
    Overflow(String),
}

const NANOS_PER_SEC: i64 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<i64> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3600 * NANOS_PER_SEC,
        _ => return None,
    })
}

/// Parse a duration like `12h`, `1h30m`, `-45s` or `1.5h`.
///
/// A bare `0` is accepted; any other number requires a unit.
pub fn parse(input: &str) -> Result<Duration, ParseDurationError> {
    let invalid = || ParseDurationError::Invalid(input.to_string());
    let overflow = || ParseDurationError::Overflow(input.to_string());

    let mut s = input.trim();
    let negative = s.starts_with('-');
    if let Some(rest) = s.strip_prefix('-').or_else(|| s.strip_prefix('+')) {
        s = rest;
    }
    if s == "0" {
        return Ok(Duration::zero());
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: i64 = 0;
    while !s.is_empty() {
        let num_end = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, rest) = s.split_at(num_end);
        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let (unit, rest) = rest.split_at(unit_end);
        s = rest;

        if number.is_empty() || number == "." || unit.is_empty() {
            return Err(invalid());
        }
        let scale = unit_nanos(unit).ok_or_else(|| ParseDurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if frac.contains('.') {
            return Err(invalid());
        }
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut value = whole.checked_mul(scale).ok_or_else(overflow)?;
        if !frac.is_empty() {
            let digits: f64 = frac.parse().map_err(|_| invalid())?;
            let fraction = digits / 10f64.powi(frac.len() as i32);
            value = value
                .checked_add((fraction * scale as f64).round() as i64)
                .ok_or_else(overflow)?;
        }
        total = total.checked_add(value).ok_or_else(overflow)?;
    }

    Ok(Duration::nanoseconds(if negative { -total } else { total }))
}

/// Round to the nearest whole second, halves away from zero.
pub fn round_to_seconds(d: Duration) -> Duration {
    match d.num_nanoseconds() {
        Some(n) => {
            let secs = n / NANOS_PER_SEC;
            let rem = n % NANOS_PER_SEC;
            let secs = if rem.abs() * 2 >= NANOS_PER_SEC {
                secs + rem.signum()
            } else {
                secs
            };
            Duration::seconds(secs)
        }
        None => Duration::seconds(d.num_seconds()),
    }
}

fn fraction(value: i64, unit: i64) -> String {
    let whole = value / unit;
    let rem = value % unit;
    if rem == 0 {
        return whole.to_string();
    }
    let width = (unit as f64).log10().round() as usize;
    let frac = format!("{:0width$}", rem, width = width);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Render like Go's `time.Duration` (`1h0m0s`, `2m30s`, `45s`, `500ms`).
pub fn format(d: Duration) -> String {
    let sign = if d < Duration::zero() { "-" } else { "" };
    let abs = if d < Duration::zero() { -d } else { d };

    let total_secs = abs.num_seconds();
    let sub_nanos = (abs - Duration::seconds(total_secs))
        .num_nanoseconds()
        .unwrap_or(0);

    if total_secs == 0 {
        return match sub_nanos {
            0 => "0s".to_string(),
            n if n < 1_000 => format!("{}{}ns", sign, n),
            n if n < 1_000_000 => format!("{}{}µs", sign, fraction(n, 1_000)),
            n => format!("{}{}ms", sign, fraction(n, 1_000_000)),
        };
    }

    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let secs = fraction(seconds * NANOS_PER_SEC + sub_nanos, NANOS_PER_SEC);

    if hours > 0 {
        format!("{}{}h{}m{}s", sign, hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}{}m{}s", sign, minutes, secs)
    } else {
        format!("{}{}s", sign, secs)
    }
}

/// Serde adapter: lifetimes travel as an integer count of nanoseconds.
pub mod nanos {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let n = d
            .num_nanoseconds()
            .ok_or_else(|| serde::ser::Error::custom("duration overflows i64 nanoseconds"))?;
        serializer.serialize_i64(n)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let n = i64::deserialize(deserializer)?;
        Ok(Duration::nanoseconds(n))
    }
}
