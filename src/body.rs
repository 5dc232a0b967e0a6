//! Data request bodies

use std::borrow::Cow;

use bytes::Bytes;

const OCTET_STREAM: &str = "application/octet-stream";

/// Encoded body of a data request.
///
/// The content type is only applied when the request carries no
/// `Content-Type` header of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    content: Bytes,
    content_type: Cow<'static, str>,
}

impl Body {
    /// Raw bytes with an explicit content type
    pub fn bytes(content: impl Into<Bytes>, content_type: impl Into<Cow<'static, str>>) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.into(),
        }
    }

    /// UTF-8 text
    pub fn text(content: impl Into<String>) -> Self {
        Self::bytes(content.into(), "text/plain; charset=utf-8")
    }

    /// `application/x-www-form-urlencoded` fields, in order
    pub fn form<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let encoded = fields
            .into_iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    urlencoding::encode(k.as_ref()),
                    urlencoding::encode(v.as_ref())
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        Self::bytes(encoded, "application/x-www-form-urlencoded")
    }

    /// Serialize `value` as JSON
    pub fn json(value: impl serde::Serialize) -> crate::Result<Self> {
        Ok(Self::bytes(serde_json::to_vec(&value)?, "application/json"))
    }

    /// Content type implied by this body
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// The bytes sent on the wire
    pub fn into_bytes(self) -> Bytes {
        self.content
    }
}

impl From<String> for Body {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

impl From<&str> for Body {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}

impl From<Vec<u8>> for Body {
    fn from(content: Vec<u8>) -> Self {
        Self::bytes(content, OCTET_STREAM)
    }
}

impl From<Bytes> for Body {
    fn from(content: Bytes) -> Self {
        Self::bytes(content, OCTET_STREAM)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        // Display renders compact JSON and cannot fail for a `Value`
        Self::bytes(value.to_string(), "application/json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_body() {
        let body = Body::text("Hello, World!");
        assert_eq!(body.content_type(), "text/plain; charset=utf-8");
        assert_eq!(body.into_bytes().as_ref(), b"Hello, World!");
    }

    #[test]
    fn test_form_encoding() {
        let body = Body::form([("user name", "jo&hn"), ("remember", "true")]);
        assert_eq!(body.content_type(), "application/x-www-form-urlencoded");
        assert_eq!(body.into_bytes().as_ref(), b"user%20name=jo%26hn&remember=true");
    }

    #[test]
    fn test_json_value_matches_serialized() {
        let value = serde_json::json!({"a": 1, "b": [true, null]});
        let from_value = Body::from(value.clone());
        let serialized = Body::json(&value).unwrap();
        assert_eq!(from_value, serialized);
        assert_eq!(from_value.content_type(), "application/json");
    }

    #[test]
    fn test_binary_defaults_to_octet_stream() {
        let body = Body::from(vec![0u8, 1, 2]);
        assert_eq!(body.content_type(), OCTET_STREAM);
        assert_eq!(body.len(), 3);
        assert!(Body::from("").is_empty());
    }
}
