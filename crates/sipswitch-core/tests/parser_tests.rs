use sipswitch_core::{parser, HeaderName, ParseError, SipMessage};

fn crlf(lines: &[&str]) -> Vec<u8> {
    let mut s = lines.join("\r\n");
    s.push_str("\r\n\r\n");
    s.into_bytes()
}

#[test]
fn parses_register_request() {
    let buf = crlf(&[
        "REGISTER sip:example.com SIP/2.0",
        "Via: SIP/2.0/UDP client.example.com;branch=z9hG4bK9988776",
        "Max-Forwards: 70",
        "From: Bob <sip:bob@example.com>;tag=456248",
        "To: Bob <sip:bob@example.com>",
        "Call-ID: 843817637684230@client.example.com",
        "CSeq: 1826 REGISTER",
        "Contact: <sip:bob@client.example.com>",
        "Expires: 7200",
        "Content-Length: 0",
    ]);
    let (msg, consumed) = parser::parse(&buf).unwrap();
    assert_eq!(consumed, buf.len());
    let req = match msg {
        SipMessage::Request(r) => r,
        _ => panic!("expected request"),
    };
    assert_eq!(req.method.as_str(), "REGISTER");
    assert_eq!(req.headers.get(&HeaderName::Expires), Some("7200"));
}

#[test]
fn compact_header_forms_are_recognized() {
    let buf = crlf(&[
        "OPTIONS sip:bob@example.com SIP/2.0",
        "v: SIP/2.0/UDP a.example.com;branch=z9hG4bK1",
        "f: <sip:alice@example.com>",
        "t: <sip:bob@example.com>",
        "i: callid-1",
        "CSeq: 1 OPTIONS",
        "Max-Forwards: 70",
        "l: 0",
    ]);
    let (msg, _) = parser::parse(&buf).unwrap();
    match msg {
        SipMessage::Request(r) => {
            assert!(r.headers.contains(&HeaderName::Via));
            assert!(r.headers.contains(&HeaderName::From));
            assert!(r.headers.contains(&HeaderName::CallId));
        }
        _ => panic!("expected request"),
    }
}

#[test]
fn rejects_invalid_max_forwards_range() {
    let buf = crlf(&[
        "BYE sip:bob@example.com SIP/2.0",
        "Via: SIP/2.0/UDP a.example.com;branch=z9hG4bK1",
        "From: <sip:alice@example.com>",
        "To: <sip:bob@example.com>",
        "Call-ID: x",
        "CSeq: 1 BYE",
        "Max-Forwards: 999",
        "Content-Length: 0",
    ]);
    let err = parser::parse(&buf).unwrap_err();
    assert!(matches!(err, ParseError::InvalidMaxForwards(_)));
}

#[test]
fn tcp_framing_requires_content_length() {
    let buf = crlf(&[
        "OPTIONS sip:bob@example.com SIP/2.0",
        "Via: SIP/2.0/TCP a.example.com;branch=z9hG4bK1",
        "From: <sip:alice@example.com>",
        "To: <sip:bob@example.com>",
        "Call-ID: x",
        "CSeq: 1 OPTIONS",
        "Max-Forwards: 70",
    ]);
    assert!(matches!(
        parser::require_content_length(&buf),
        Err(ParseError::MissingContentLength)
    ));
}

#[test]
fn malformed_start_line_is_rejected() {
    // spec §8 scenario 8: "INVALID MESSAGE" on the start line.
    let buf = crlf(&["INVALID MESSAGE"]);
    let err = parser::parse(&buf).unwrap_err();
    assert!(matches!(err, ParseError::MalformedStartLine(_)), "got {err:?}");
}

#[test]
fn incomplete_buffer_is_reported_as_incomplete() {
    let partial = b"INVITE sip:bob@example.com SIP/2.0\r\nVia: SIP/2.0/UDP a.example.com\r\n";
    assert!(matches!(parser::parse(partial), Err(ParseError::Incomplete)));
}
