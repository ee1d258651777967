use bytes::Bytes;
use serde::Serialize;

/// One unit of payload handed to a session.
///
/// The optional tag names the event in event framing. Chunked framing writes the payload
/// as is and ignores the tag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamItem {
    data: Bytes,
    tag: Option<String>,
}

impl StreamItem {
    /// Create an item from raw bytes.
    #[inline]
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            tag: None,
        }
    }

    /// Create a `text/plain` item.
    #[inline]
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data.into()),
            tag: None,
        }
    }

    /// Create an item holding `value` serialized as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_vec(value)?;
        Ok(Self::bytes(data))
    }

    /// Sets the tag.
    #[inline]
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Payload bytes.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Tag of the item, if any.
    #[inline]
    #[must_use]
    pub fn tag_ref(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Consume the item and return its payload.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    #[inline]
    pub(crate) fn into_parts(self) -> (Bytes, Option<String>) {
        (self.data, self.tag)
    }
}

impl From<Bytes> for StreamItem {
    #[inline]
    fn from(data: Bytes) -> Self {
        Self::bytes(data)
    }
}

impl From<String> for StreamItem {
    #[inline]
    fn from(data: String) -> Self {
        Self::text(data)
    }
}

impl From<&'static str> for StreamItem {
    #[inline]
    fn from(data: &'static str) -> Self {
        Self::bytes(Bytes::from_static(data.as_bytes()))
    }
}
