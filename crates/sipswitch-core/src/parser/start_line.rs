//! Request-line / status-line grammar (RFC 3261 §7.1, §25.1), using `nom`
//! combinators the way `sip-core`'s parser builds its start-line rules.

use nom::bytes::complete::{take_till1, take_while1};
use nom::character::complete::{digit1, space1};
use nom::combinator::{all_consuming, map_res};
use nom::sequence::tuple;
use nom::IResult;

use crate::error::ParseError;
use crate::method::Method;
use crate::status::StatusCode;
use crate::uri::Uri;

const SIP_VERSION: &str = "SIP/2.0";

pub enum StartLine {
    Request { method: Method, uri: Uri },
    Status { code: StatusCode, reason: String },
}

fn token(input: &str) -> IResult<&str, &str> {
    take_till1(char::is_whitespace)(input)
}

fn request_line(input: &str) -> IResult<&str, (Method, Uri, &str)> {
    map_res(
        tuple((token, space1, token, space1, take_while1(|_| true))),
        |(method, _, uri, _, version): (&str, _, &str, _, &str)| {
            let uri: Uri = uri.parse().map_err(|_| ())?;
            Ok::<_, ()>((Method::from_str_infallible(method), uri, version))
        },
    )(input)
}

/// Parses the version token generically (not `tag(SIP_VERSION)`) so a
/// wrong-but-well-formed version (e.g. `SIP/1.0`) still parses as a
/// status line and reaches the explicit version check below, rather
/// than failing the grammar itself and being misreported as a
/// malformed start-line.
fn status_line(input: &str) -> IResult<&str, (&str, StatusCode, &str)> {
    let (input, (version, _, code, _, reason)) =
        tuple((token, space1, digit1, space1, take_while1(|_| true)))(input)?;
    Ok((input, (version, StatusCode(code.parse().unwrap_or(0)), reason)))
}

impl Method {
    fn from_str_infallible(s: &str) -> Method {
        use std::str::FromStr;
        Method::from_str(s).unwrap()
    }
}

/// Parses the first line of a SIP message (without its trailing CRLF).
pub fn parse_start_line(line: &str) -> Result<StartLine, ParseError> {
    // Responses always begin with a "SIP/" version token; requests never
    // do (no method is spelled that way). Dispatch on the generic
    // prefix rather than the exact `SIP/2.0` literal so a response
    // carrying an unsupported version (e.g. `SIP/1.0`) is still routed
    // to the status-line parser and fails with `UnsupportedVersion`
    // instead of falling into the request-line parser and failing with
    // the wrong error kind.
    if line.starts_with("SIP/") {
        let (_, (version, code, reason)) =
            all_consuming(status_line)(line).map_err(|_| ParseError::MalformedStartLine(line.to_string()))?;
        if version != SIP_VERSION {
            return Err(ParseError::UnsupportedVersion(version.to_string()));
        }
        return Ok(StartLine::Status {
            code,
            reason: reason.to_string(),
        });
    }

    let (_, (method, uri, version)) =
        all_consuming(request_line)(line).map_err(|_| ParseError::MalformedStartLine(line.to_string()))?;
    if version != SIP_VERSION {
        return Err(ParseError::UnsupportedVersion(version.to_string()));
    }
    Ok(StartLine::Request { method, uri })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line() {
        let line = "INVITE sip:bob@example.com SIP/2.0";
        match parse_start_line(line).unwrap() {
            StartLine::Request { method, uri } => {
                assert_eq!(method, Method::Invite);
                assert_eq!(uri.host, "example.com");
            }
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn parses_status_line() {
        let line = "SIP/2.0 200 OK";
        match parse_start_line(line).unwrap() {
            StartLine::Status { code, reason } => {
                assert_eq!(code, StatusCode::OK);
                assert_eq!(reason, "OK");
            }
            _ => panic!("expected a status line"),
        }
    }

    #[test]
    fn rejects_bad_version() {
        let err = parse_start_line("INVITE sip:bob@example.com SIP/3.0").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedVersion(_)));
    }

    #[test]
    fn rejects_garbage_start_line() {
        let err = parse_start_line("not a sip message").unwrap_err();
        assert!(matches!(err, ParseError::MalformedStartLine(_)));
    }

    #[test]
    fn rejects_bad_version_on_a_response_as_unsupported_not_malformed() {
        let err = parse_start_line("SIP/1.0 200 OK").unwrap_err();
        assert!(
            matches!(err, ParseError::UnsupportedVersion(ref v) if v == "SIP/1.0"),
            "expected UnsupportedVersion(\"SIP/1.0\"), got {err:?}"
        );
    }
}
