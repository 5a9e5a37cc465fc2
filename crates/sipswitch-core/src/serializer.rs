//! AST → wire bytes (spec §4.1 "Serialize"). `Content-Length` is always
//! recomputed from the actual body rather than trusted from the header
//! list, so callers never have to keep the two in sync by hand.

use crate::header::{HeaderName, Headers};
use crate::message::{Request, Response, SipMessage};

const SIP_VERSION: &str = "SIP/2.0";

pub fn serialize(message: &SipMessage) -> Vec<u8> {
    match message {
        SipMessage::Request(r) => serialize_request(r),
        SipMessage::Response(r) => serialize_response(r),
    }
}

pub fn serialize_request(req: &Request) -> Vec<u8> {
    let mut out = format!("{} {} {}\r\n", req.method, req.request_uri, SIP_VERSION);
    write_headers(&mut out, &req.headers, req.body.len());
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(&req.body);
    bytes
}

pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut out = format!("{} {} {}\r\n", SIP_VERSION, resp.status_code, resp.reason);
    write_headers(&mut out, &resp.headers, resp.body.len());
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(&resp.body);
    bytes
}

/// Writes every header in insertion order (RFC 3261 requires `Via` order
/// on responses to mirror the matching request), then recomputes and
/// writes `Content-Length` last, then the blank line that ends the header
/// block.
fn write_headers(out: &mut String, headers: &Headers, body_len: usize) {
    for (name, value) in headers {
        if *name == HeaderName::ContentLength {
            continue;
        }
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("Content-Length: ");
    out.push_str(&body_len.to_string());
    out.push_str("\r\n\r\n");
}
