//! The BOSH `<body/>` data model.
//!
//! A `Body` is an immutable mapping from BOSH attribute name to string value,
//! plus an opaque inner XML payload. Attribute (de)serialization to the wire
//! format is handled by [`crate::wire`]; this module only knows about the
//! value, not the XML syntax it travels in.

use std::collections::BTreeMap;

/// An immutable BOSH body: attributes plus an opaque inner payload.
///
/// Mutation happens by deriving a new body via [`Body::to_builder`] and
/// [`BodyBuilder::build`] — there is no in-place setter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Body {
    attrs: BTreeMap<String, String>,
    payload: String,
}

impl Body {
    /// Start building a new body from scratch.
    pub fn builder() -> BodyBuilder {
        BodyBuilder::default()
    }

    /// Start building a new body derived from this one (same attributes and
    /// payload, free to override).
    pub fn to_builder(&self) -> BodyBuilder {
        BodyBuilder {
            attrs: self.attrs.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Raw attribute lookup.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Iterate all attributes in sorted key order (deterministic wire output).
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The opaque inner XML payload, e.g. XMPP stanzas.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// `rid` attribute, parsed. `None` if absent or unparsable.
    pub fn rid(&self) -> Option<i64> {
        self.attr("rid").and_then(|v| v.parse().ok())
    }

    /// `sid` attribute.
    pub fn sid(&self) -> Option<&str> {
        self.attr("sid")
    }

    /// `ack` attribute, parsed.
    pub fn ack(&self) -> Option<i64> {
        self.attr("ack").and_then(|v| v.parse().ok())
    }

    /// `report` attribute, parsed.
    pub fn report(&self) -> Option<i64> {
        self.attr("report").and_then(|v| v.parse().ok())
    }

    /// `time` attribute, parsed.
    pub fn time(&self) -> Option<i64> {
        self.attr("time").and_then(|v| v.parse().ok())
    }

    /// `type` attribute (`"terminate"` or `"error"`, usually).
    pub fn type_attr(&self) -> Option<&str> {
        self.attr("type")
    }

    /// `condition` attribute, present on `type="terminate"` responses.
    pub fn condition(&self) -> Option<&str> {
        self.attr("condition")
    }

    /// True if this body carries `type="terminate"`.
    pub fn is_terminate(&self) -> bool {
        self.type_attr() == Some("terminate")
    }

    /// True if this body carries `type="error"` (a recoverable binding condition).
    pub fn is_recoverable_error(&self) -> bool {
        self.type_attr() == Some("error")
    }

    /// True if this body has no payload and no attributes beyond the BOSH
    /// session bookkeeping ones (`rid`, `sid`, `ack`) — an empty keep-alive
    /// request.
    pub fn is_empty_request(&self) -> bool {
        self.payload.is_empty()
            && self
                .attrs
                .keys()
                .all(|k| matches!(k.as_str(), "rid" | "sid" | "ack" | "pause"))
    }
}

/// Builder for [`Body`].
#[derive(Debug, Clone, Default)]
pub struct BodyBuilder {
    attrs: BTreeMap<String, String>,
    payload: String,
}

impl BodyBuilder {
    /// Set an attribute unconditionally, overwriting any previous value.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Set an attribute only if `value` is `Some`.
    pub fn maybe_attr(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.attr(name, v),
            None => self,
        }
    }

    /// Remove an attribute if present.
    pub fn without_attr(mut self, name: &str) -> Self {
        self.attrs.remove(name);
        self
    }

    /// Set the opaque inner payload, replacing any existing one.
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Finalize into an immutable [`Body`].
    pub fn build(self) -> Body {
        Body {
            attrs: self.attrs,
            payload: self.payload,
        }
    }
}
