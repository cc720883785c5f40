//! `now()` / `now()+Nu` / `now()-Nu` time expressions for report metric
//! windows (spec §4.H), plus plain RFC 3339 timestamps.

use chrono::{DateTime, Duration, Utc};

use re_core::error::RulesError;

/// Resolve a time expression relative to `now`.
///
/// Accepts `now()`, `now()+5m`, `now()-2h`, or an RFC 3339 timestamp.
/// Units: `s` seconds, `m` minutes, `h` hours, `d` days.
pub fn resolve(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, RulesError> {
    let trimmed = expr.trim();
    if let Some(rest) = trimmed.strip_prefix("now()") {
        if rest.is_empty() {
            return Ok(now);
        }
        return Ok(now + parse_offset(rest)?);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RulesError::validation(format!("invalid time expression {trimmed:?}: {e}")))
}

fn parse_offset(rest: &str) -> Result<Duration, RulesError> {
    let (sign, body) = match rest.chars().next() {
        Some('+') => (1, &rest[1..]),
        Some('-') => (-1, &rest[1..]),
        _ => return Err(RulesError::validation(format!("invalid time offset {rest:?}"))),
    };
    let unit = body
        .chars()
        .last()
        .ok_or_else(|| RulesError::validation("empty time offset"))?;
    let digits = &body[..body.len() - unit.len_utf8()];
    let n: i64 = digits
        .parse()
        .map_err(|_| RulesError::validation(format!("invalid time offset magnitude {digits:?}")))?;
    let magnitude = match unit {
        's' => Duration::seconds(n),
        'm' => Duration::minutes(n),
        'h' => Duration::hours(n),
        'd' => Duration::days(n),
        other => return Err(RulesError::validation(format!("unknown time unit {other:?}"))),
    };
    Ok(magnitude * sign)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn now_resolves_to_the_reference_instant() {
        assert_eq!(resolve("now()", now()).unwrap(), now());
    }

    #[test]
    fn now_plus_offset_adds_the_duration() {
        assert_eq!(resolve("now()+30m", now()).unwrap(), now() + Duration::minutes(30));
    }

    #[test]
    fn now_minus_offset_subtracts_the_duration() {
        assert_eq!(resolve("now()-1d", now()).unwrap(), now() - Duration::days(1));
    }

    #[test]
    fn absolute_rfc3339_timestamps_are_accepted() {
        let expr = "2026-01-01T00:00:00Z";
        assert_eq!(
            resolve(expr, now()).unwrap(),
            DateTime::parse_from_rfc3339(expr).unwrap().with_timezone(&Utc)
        );
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(resolve("whenever", now()).is_err());
    }

    #[test]
    fn unknown_unit_is_rejected() {
        assert!(resolve("now()+5x", now()).is_err());
    }

    #[test]
    fn missing_sign_is_rejected() {
        assert!(resolve("now()5m", now()).is_err());
    }
}
