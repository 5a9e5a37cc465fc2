//! Byte stream → [`SipMessage`] (spec §4.1).
//!
//! Framing is the transport layer's job (UDP: one datagram is one message;
//! TCP: the reader waits for a full `Content-Length`-bounded message before
//! calling [`parse`]). This module only ever sees a buffer that is believed
//! to hold exactly one message's bytes, though it still validates
//! `Content-Length` against what it actually received.

mod header_line;
mod start_line;

use crate::error::{ParseError, Result};
use crate::header::HeaderName;
use crate::message::{Request, Response, SipMessage};
use crate::status::StatusCode;

use start_line::StartLine;

const CRLFCRLF: &str = "\r\n\r\n";

/// Required headers on every inbound request (spec §4.1).
fn required_request_headers() -> [HeaderName; 6] {
    [
        HeaderName::Via,
        HeaderName::From,
        HeaderName::To,
        HeaderName::CallId,
        HeaderName::CSeq,
        HeaderName::MaxForwards,
    ]
}

/// Parses a complete SIP message out of `buf`.
///
/// `buf` may contain trailing bytes beyond the message's `Content-Length`
/// (e.g. a UDP datagram padded by the caller); those are ignored. Returns
/// the parsed message plus the total byte length consumed, which callers
/// that frame multiple messages off one stream can use to advance past it.
pub fn parse(buf: &[u8]) -> Result<(SipMessage, usize)> {
    match parse_inner(buf) {
        Ok((msg, consumed)) => {
            tracing::trace!(consumed, start_line = %msg, "parsed SIP message");
            Ok((msg, consumed))
        }
        Err(err) => {
            tracing::debug!(%err, "failed to parse SIP message");
            Err(err)
        }
    }
}

fn parse_inner(buf: &[u8]) -> Result<(SipMessage, usize)> {
    // Only the header block is required to be ASCII/UTF-8 text; the body
    // (SDP or otherwise) is carried as opaque bytes and never decoded.
    let header_end = find_crlfcrlf(buf).ok_or(ParseError::Incomplete)?;
    let head = std::str::from_utf8(&buf[..header_end]).map_err(|_| ParseError::Incomplete)?;
    let body_start = header_end + CRLFCRLF.len();
    let body_bytes_available = buf.len().saturating_sub(body_start);

    let mut lines = head.splitn(2, "\r\n");
    let start = lines.next().unwrap_or_default();
    let header_block = lines.next().unwrap_or_default();

    let start_line = start_line::parse_start_line(start)?;
    let headers = header_line::parse_header_block(&format!("{}\r\n", header_block))?;

    let mut header_list = crate::header::Headers::new();
    for (name, value) in headers {
        header_list.push(name, value);
    }

    // Per spec §4.1: absent Content-Length means "rest of the buffer" (the
    // UDP framing of one datagram == one message), not zero. Transports
    // that require an explicit Content-Length (TCP) enforce that with
    // `require_content_length` before ever calling `parse`.
    let content_length = match header_list.get(&HeaderName::ContentLength) {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::MalformedHeader(0))?,
        None => body_bytes_available,
    };

    if content_length > body_bytes_available {
        return Err(ParseError::ContentLengthMismatch {
            expected: content_length,
            available: body_bytes_available,
        });
    }

    let body = buf[body_start..body_start + content_length].to_vec();
    let total_consumed = body_start + content_length;

    let message = match start_line {
        StartLine::Request { method, uri } => {
            for required in required_request_headers() {
                if !header_list.contains(&required) {
                    return Err(ParseError::MissingHeader(required_header_name(&required)));
                }
            }

            if let Some(cseq) = header_list.get(&HeaderName::CSeq) {
                validate_cseq(cseq, &method)?;
            }
            if let Some(mf) = header_list.get(&HeaderName::MaxForwards) {
                validate_max_forwards(mf)?;
            }

            SipMessage::Request(Request {
                method,
                request_uri: uri,
                headers: header_list,
                body,
            })
        }
        StartLine::Status { code, reason } => SipMessage::Response(Response {
            status_code: code,
            reason,
            headers: header_list,
            body,
        }),
    };

    Ok((message, total_consumed))
}

fn required_header_name(name: &HeaderName) -> &'static str {
    match name {
        HeaderName::Via => "Via",
        HeaderName::From => "From",
        HeaderName::To => "To",
        HeaderName::CallId => "Call-ID",
        HeaderName::CSeq => "CSeq",
        HeaderName::MaxForwards => "Max-Forwards",
        _ => "Unknown",
    }
}

fn validate_cseq(value: &str, method: &crate::method::Method) -> Result<()> {
    let (number, cseq_method) = value
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(|| ParseError::InvalidCSeq(value.to_string()))?;
    number
        .parse::<u32>()
        .map_err(|_| ParseError::InvalidCSeq(value.to_string()))?;
    if cseq_method.trim() != method.as_str() {
        return Err(ParseError::CSeqMethodMismatch {
            header: cseq_method.trim().to_string(),
            request: method.as_str().to_string(),
        });
    }
    Ok(())
}

fn validate_max_forwards(value: &str) -> Result<()> {
    let n: i64 = value
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidMaxForwards(value.to_string()))?;
    if !(0..=255).contains(&n) {
        return Err(ParseError::InvalidMaxForwards(value.to_string()));
    }
    Ok(())
}

/// Requires `Content-Length` to be present, for transports (TCP) that
/// cannot rely on "rest of datagram" framing (spec §4.1, §4.2).
pub fn require_content_length(buf: &[u8]) -> Result<()> {
    let header_end = find_crlfcrlf(buf).ok_or(ParseError::Incomplete)?;
    let head = std::str::from_utf8(&buf[..header_end]).map_err(|_| ParseError::Incomplete)?;
    if !head
        .lines()
        .any(|l| l.to_ascii_lowercase().starts_with("content-length") || l.to_ascii_lowercase().starts_with("l:"))
    {
        return Err(ParseError::MissingContentLength);
    }
    Ok(())
}

/// Finds the header/body boundary (`\r\n\r\n`) as a byte offset, without
/// requiring the body itself to be valid UTF-8.
fn find_crlfcrlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_invite() -> Vec<u8> {
        let msg = "INVITE sip:bob@example.com SIP/2.0\r\n\
Via: SIP/2.0/UDP pc33.example.com;branch=z9hG4bK776asdhds\r\n\
Max-Forwards: 70\r\n\
From: Alice <sip:alice@example.com>;tag=1928301774\r\n\
To: Bob <sip:bob@example.com>\r\n\
Call-ID: a84b4c76e66710@pc33.example.com\r\n\
CSeq: 314159 INVITE\r\n\
Content-Length: 4\r\n\
\r\n\
abcd";
        msg.as_bytes().to_vec()
    }

    #[test]
    fn parses_invite_with_body() {
        let buf = sample_invite();
        let (msg, consumed) = parse(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        match msg {
            SipMessage::Request(req) => {
                assert_eq!(req.method, crate::method::Method::Invite);
                assert_eq!(req.body, b"abcd");
                assert_eq!(req.cseq_number(), Some(314159));
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn rejects_missing_required_header() {
        let msg = "INVITE sip:bob@example.com SIP/2.0\r\nContent-Length: 0\r\n\r\n";
        let err = parse(msg.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::MissingHeader(_)));
    }

    #[test]
    fn rejects_short_body() {
        let msg = "OPTIONS sip:bob@example.com SIP/2.0\r\n\
Via: SIP/2.0/UDP pc33.example.com;branch=z9hG4bK1\r\n\
Max-Forwards: 70\r\n\
From: <sip:alice@example.com>\r\n\
To: <sip:bob@example.com>\r\n\
Call-ID: x\r\n\
CSeq: 1 OPTIONS\r\n\
Content-Length: 10\r\n\
\r\n\
short";
        let err = parse(msg.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::ContentLengthMismatch { .. }));
    }

    #[test]
    fn rejects_cseq_method_mismatch() {
        let msg = "BYE sip:bob@example.com SIP/2.0\r\n\
Via: SIP/2.0/UDP pc33.example.com;branch=z9hG4bK1\r\n\
Max-Forwards: 70\r\n\
From: <sip:alice@example.com>\r\n\
To: <sip:bob@example.com>\r\n\
Call-ID: x\r\n\
CSeq: 1 INVITE\r\n\
Content-Length: 0\r\n\
\r\n";
        let err = parse(msg.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::CSeqMethodMismatch { .. }));
    }

    #[test]
    fn parses_status_line_response() {
        let msg = "SIP/2.0 200 OK\r\nVia: SIP/2.0/UDP pc33.example.com;branch=z9hG4bK1\r\nCall-ID: x\r\nCSeq: 1 INVITE\r\nContent-Length: 0\r\n\r\n";
        let (msg, _) = parse(msg.as_bytes()).unwrap();
        match msg {
            SipMessage::Response(resp) => assert_eq!(resp.status_code, StatusCode::OK),
            _ => panic!("expected response"),
        }
    }
}
