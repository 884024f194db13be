//! Minimal BOSH body wire encoding.
//!
//! XML body parsing/serialization is explicitly out of scope for the session
//! core (see SPEC_FULL.md §1) — a real deployment would sit a conformant XML
//! library underneath the `HttpSender` collaborator. This module is a
//! deliberately naive stand-in, just capable enough to drive
//! [`crate::transport::ReqwestHttpSender`] and its tests: it encodes a `Body`
//! as a flat `<body attr="val" ...>payload</body>` element and decodes the
//! same shape back. It does not handle XML escaping beyond the handful of
//! entities BOSH attribute values plausibly contain, namespaces, nested
//! payload elements beyond opaque text, or malformed input gracefully.

use crate::body::Body;
use crate::error::{BoshError, Result};

const NS: &str = "http://jabber.org/protocol/httpbind";

/// Encode a body as a `<body .../>` (or `<body ...>payload</body>`) element.
pub fn encode(body: &Body) -> String {
    let mut out = String::from("<body xmlns=\"");
    out.push_str(NS);
    out.push('"');
    for (k, v) in body.attrs() {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(&escape(v));
        out.push('"');
    }
    if body.payload().is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        out.push_str(body.payload());
        out.push_str("</body>");
    }
    out
}

/// Decode a `<body .../>` element back into a [`Body`].
///
/// Only handles the shapes this crate itself produces: one `body` element
/// with simple `name="value"` attributes and either self-closing or a single
/// opaque text/markup payload between the open and close tags.
pub fn decode(xml: &str) -> Result<Body> {
    let xml = xml.trim();
    let open_end = xml
        .find('>')
        .ok_or_else(|| BoshError::ProtocolViolation("malformed body: no '>' found".to_string()))?;
    let head = &xml[..open_end];
    let self_closing = head.ends_with('/');
    let head = if self_closing { &head[..head.len() - 1] } else { head };

    let mut builder = Body::builder();
    for (name, value) in parse_attrs(head) {
        if name == "xmlns" {
            continue;
        }
        builder = builder.attr(name, value);
    }

    if !self_closing {
        let close_tag = "</body>";
        let payload_start = open_end + 1;
        let payload_end = xml.rfind(close_tag).ok_or_else(|| {
            BoshError::ProtocolViolation("malformed body: missing closing tag".to_string())
        })?;
        if payload_end >= payload_start {
            builder = builder.payload(xml[payload_start..payload_end].to_string());
        }
    }

    Ok(builder.build())
}

fn parse_attrs(head: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let bytes = head.as_bytes();
    let mut i = 0;
    // Skip the leading "<body" tag name.
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || name_start == i {
            break;
        }
        let name = &head[name_start..i];
        while i < bytes.len() && bytes[i] != b'"' {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        i += 1;
        let value_start = i;
        while i < bytes.len() && bytes[i] != b'"' {
            i += 1;
        }
        let value = &head[value_start..i.min(head.len())];
        i += 1;
        attrs.push((name.to_string(), unescape(value)));
    }
    attrs
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}
