//! Best-effort body rendering for captured flows

use std::borrow::Cow;

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::HeaderMap;
use log::{debug, error};
use serde::Serialize;
use serde_json::Value;

/// Bodies without a declared content type are only decoded up to this size
pub const TEXT_DECODE_LIMIT: usize = 5 * 1024 * 1024;

/// A captured body
///
/// Serializes as the bare JSON tree or string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlowBody {
    /// Parsed `application/json` payload
    Json(Value),
    /// Decoded text
    Text(String),
    /// `(N bytes)` stand-in for payloads that are encoded, oversized or empty
    Placeholder(String),
}

impl FlowBody {
    pub fn placeholder(len: usize) -> Self {
        FlowBody::Placeholder(format!("({} bytes)", len))
    }

    /// Text form: the JSON tree re-encoded, or the string as is
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FlowBody::Json(value) => Cow::Owned(value.to_string()),
            FlowBody::Text(text) | FlowBody::Placeholder(text) => Cow::Borrowed(text),
        }
    }
}

/// Render a message body for capture
///
/// * `None` when the payload was not buffered
/// * a placeholder when it is empty, content-encoded, or larger than
///   [`TEXT_DECODE_LIMIT`] without a declared content type
/// * otherwise text decoded with the declared charset, parsed further into a
///   JSON tree for `application/json` (falling back to text when parsing fails)
pub fn decode_body(headers: &HeaderMap, body: Option<&Bytes>) -> Option<FlowBody> {
    let body = body?;

    if body.is_empty() || headers.contains_key(CONTENT_ENCODING) {
        return Some(FlowBody::placeholder(body.len()));
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(MediaType::parse);

    if content_type.is_none() && body.len() > TEXT_DECODE_LIMIT {
        return Some(FlowBody::placeholder(body.len()));
    }

    let charset = content_type.as_ref().and_then(|ct| ct.charset.as_deref());
    let text = decode_text(body, charset);

    if content_type.as_ref().map_or(false, MediaType::is_json) {
        match serde_json::from_str(&text) {
            Ok(value) => return Some(FlowBody::Json(value)),
            Err(e) => error!("Failed to parse JSON body: {}", e),
        }
    }

    Some(FlowBody::Text(text))
}

struct MediaType {
    essence: String,
    charset: Option<String>,
}

impl MediaType {
    fn parse(raw: &str) -> Self {
        let mut parts = raw.split(';');
        let essence = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let charset = parts
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase());

        Self { essence, charset }
    }

    fn is_json(&self) -> bool {
        self.essence == "application/json"
    }
}

/// Decode with the declared charset; unknown or missing labels fall back to UTF-8
fn decode_text(body: &[u8], charset: Option<&str>) -> String {
    let encoding = match charset {
        Some(label) => Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
            debug!("Unknown charset {}, decoding as UTF-8", label);
            UTF_8
        }),
        None => UTF_8,
    };

    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}
