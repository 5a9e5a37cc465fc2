//! Header-block tokenizing: splits a folded header section into logical
//! lines and each logical line into `(name, value)`.

use std::str::FromStr;

use crate::error::ParseError;
use crate::header::HeaderName;

/// Un-folds continuation lines (RFC 3261 §7.3.1: a line beginning with
/// SP or HTAB is a continuation of the previous header) and splits the
/// result into `(HeaderName, value)` pairs, in order.
pub fn parse_header_block(block: &str) -> Result<Vec<(HeaderName, String)>, ParseError> {
    let mut logical_lines: Vec<String> = Vec::new();
    for (idx, raw_line) in block.split("\r\n").enumerate() {
        if raw_line.is_empty() {
            continue;
        }
        if raw_line.starts_with(' ') || raw_line.starts_with('\t') {
            let prev = logical_lines
                .last_mut()
                .ok_or(ParseError::MalformedHeader(idx))?;
            prev.push(' ');
            prev.push_str(raw_line.trim_start());
        } else {
            logical_lines.push(raw_line.to_string());
        }
    }

    let mut headers = Vec::with_capacity(logical_lines.len());
    for (idx, line) in logical_lines.iter().enumerate() {
        let (name, value) = line
            .split_once(':')
            .ok_or(ParseError::MalformedHeader(idx))?;
        let name = HeaderName::from_str(name.trim()).expect("HeaderName::from_str is infallible");
        headers.push((name, value.trim().to_string()));
    }
    Ok(headers)
}
