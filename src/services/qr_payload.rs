//! Check-in QR payloads.
//!
//! A printed code carries `<scheme>://checkin?program=<id>&location=<label>&t=<unix seconds>`.
//! `t` records when the code was issued; whether it limits the code's life is
//! decided by the check-in rules, not here.

use chrono::{DateTime, TimeZone, Utc};
use url::{form_urlencoded, Url};

/// The fixed target segment following `<scheme>://`
pub const CHECKIN_TARGET: &str = "checkin";

// Above this, `t` is taken to be milliseconds (as produced by JavaScript's Date.now()).
const MILLISECOND_TIMESTAMP_THRESHOLD: i64 = 100_000_000_000;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("not a URI: {0}")]
    NotAUri(#[from] url::ParseError),

    #[error("unexpected scheme {found:?}, expected {expected:?}")]
    WrongScheme { expected: String, found: String },

    #[error("unexpected target, expected \"checkin\"")]
    WrongTarget,

    #[error("missing parameter {0:?}")]
    MissingParameter(&'static str),

    #[error("parameter {name:?} is not a valid number: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// What a scanned check-in code says
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInPayload {
    pub program_id: i64,
    pub location: String,
    /// `None` when the code carries no `t` parameter
    pub issued_at: Option<DateTime<Utc>>,
}

/// Builds the string encoded into a program's QR code
pub fn build_payload(
    scheme: &str,
    program_id: i64,
    location: &str,
    issued_at: DateTime<Utc>,
) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("program", &program_id.to_string())
        .append_pair("location", location)
        .append_pair("t", &issued_at.timestamp().to_string())
        .finish();

    format!("{}://{}?{}", scheme, CHECKIN_TARGET, query)
}

/// Parses a scanned string, accepting only `scheme` (case-insensitive)
pub fn parse_payload(raw: &str, scheme: &str) -> Result<CheckInPayload, PayloadError> {
    let url = Url::parse(raw.trim())?;

    if !url.scheme().eq_ignore_ascii_case(scheme) {
        return Err(PayloadError::WrongScheme {
            expected: scheme.to_ascii_lowercase(),
            found: url.scheme().to_string(),
        });
    }

    if url.host_str() != Some(CHECKIN_TARGET) || !matches!(url.path(), "" | "/") {
        return Err(PayloadError::WrongTarget);
    }

    let mut program = None;
    let mut location = None;
    let mut issued = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "program" if program.is_none() => program = Some(value.into_owned()),
            "location" if location.is_none() => location = Some(value.into_owned()),
            "t" if issued.is_none() => issued = Some(value.into_owned()),
            _ => {}
        }
    }

    let program = program
        .filter(|p| !p.trim().is_empty())
        .ok_or(PayloadError::MissingParameter("program"))?;
    let program_id = program
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| PayloadError::InvalidNumber {
            name: "program",
            value: program.clone(),
        })?;

    let location = location
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .ok_or(PayloadError::MissingParameter("location"))?;

    let issued_at = issued.map(|t| parse_timestamp(&t)).transpose()?;

    Ok(CheckInPayload {
        program_id,
        location,
        issued_at,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PayloadError> {
    let invalid = || PayloadError::InvalidNumber {
        name: "t",
        value: value.to_string(),
    };

    let raw: i64 = value.trim().parse().map_err(|_| invalid())?;
    let parsed = if raw > MILLISECOND_TIMESTAMP_THRESHOLD {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    };

    parsed.ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEME: &str = "trailtag";

    #[test]
    fn test_build_then_parse() {
        let issued_at = Utc.timestamp_opt(1_760_000_000, 0).unwrap();
        let payload = build_payload(SCHEME, 7, "North Gate & Pier 2", issued_at);
        assert!(payload.starts_with("trailtag://checkin?program=7&location="));

        let parsed = parse_payload(&payload, SCHEME).unwrap();
        assert_eq!(parsed.program_id, 7);
        assert_eq!(parsed.location, "North Gate & Pier 2");
        assert_eq!(parsed.issued_at, Some(issued_at));
    }

    #[test]
    fn test_percent_encoded_location_and_any_order() {
        let parsed = parse_payload(
            "trailtag://checkin?t=1760000000&location=Main%20Hall%2FRoom%201&program=12",
            SCHEME,
        )
        .unwrap();
        assert_eq!(parsed.program_id, 12);
        assert_eq!(parsed.location, "Main Hall/Room 1");
    }

    #[test]
    fn test_scheme_is_case_insensitive_and_whitespace_trimmed() {
        let parsed = parse_payload("  TrailTag://checkin?program=3&location=Lab\n", SCHEME).unwrap();
        assert_eq!(parsed.program_id, 3);
        assert_eq!(parsed.issued_at, None);
    }

    #[test]
    fn test_trailing_slash_accepted() {
        assert!(parse_payload("trailtag://checkin/?program=3&location=Lab", SCHEME).is_ok());
    }

    #[test]
    fn test_wrong_scheme() {
        let err = parse_payload("https://checkin?program=1&location=Lab", SCHEME).unwrap_err();
        assert!(matches!(err, PayloadError::WrongScheme { .. }));
    }

    #[test]
    fn test_wrong_target() {
        assert_eq!(
            parse_payload("trailtag://checkout?program=1&location=Lab", SCHEME),
            Err(PayloadError::WrongTarget)
        );
        assert_eq!(
            parse_payload("trailtag://checkin/extra?program=1&location=Lab", SCHEME),
            Err(PayloadError::WrongTarget)
        );
    }

    #[test]
    fn test_not_a_uri() {
        assert!(matches!(
            parse_payload("hello there", SCHEME),
            Err(PayloadError::NotAUri(_))
        ));
        assert!(matches!(parse_payload("", SCHEME), Err(PayloadError::NotAUri(_))));
    }

    #[test]
    fn test_missing_parameters() {
        assert_eq!(
            parse_payload("trailtag://checkin?location=Lab&t=1", SCHEME),
            Err(PayloadError::MissingParameter("program"))
        );
        assert_eq!(
            parse_payload("trailtag://checkin?program=1&t=1", SCHEME),
            Err(PayloadError::MissingParameter("location"))
        );
        assert_eq!(
            parse_payload("trailtag://checkin?program=1&location=", SCHEME),
            Err(PayloadError::MissingParameter("location"))
        );
    }

    #[test]
    fn test_non_numeric_parameters() {
        assert!(matches!(
            parse_payload("trailtag://checkin?program=abc&location=Lab", SCHEME),
            Err(PayloadError::InvalidNumber { name: "program", .. })
        ));
        assert!(matches!(
            parse_payload("trailtag://checkin?program=-4&location=Lab", SCHEME),
            Err(PayloadError::InvalidNumber { name: "program", .. })
        ));
        assert!(matches!(
            parse_payload("trailtag://checkin?program=1&location=Lab&t=yesterday", SCHEME),
            Err(PayloadError::InvalidNumber { name: "t", .. })
        ));
    }

    #[test]
    fn test_millisecond_timestamp() {
        let parsed =
            parse_payload("trailtag://checkin?program=1&location=Lab&t=1760000000123", SCHEME)
                .unwrap();
        assert_eq!(parsed.issued_at.unwrap().timestamp(), 1_760_000_000);
    }
}
