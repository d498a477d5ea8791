use serde::{Deserialize, Serialize};

/// A message moving through a flow
///
/// Text payloads carry XML, JSON, CSV or any other character data. Binary
/// payloads are opaque and only ever copied byte for byte.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Payload {
    /// UTF-8 character data
    Text(String),
    /// Opaque bytes
    Binary(Vec<u8>),
}

impl Payload {
    /// Create a text payload
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Payload::Text(s.into())
    }

    /// Classify raw bytes: anything that is not valid UTF-8, or that contains
    /// a NUL byte, is treated as binary.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if bytes.contains(&0) {
            return Payload::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => Payload::Text(text),
            Err(err) => Payload::Binary(err.into_bytes()),
        }
    }

    /// Whether the payload is opaque bytes
    #[inline]
    pub fn is_binary(&self) -> bool {
        matches!(self, Payload::Binary(_))
    }

    /// Text view of the payload, if it is text
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    /// Raw bytes of the payload
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Take ownership of the raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Text(text) => text.into_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Size in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload has no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lossy text rendering, used for logging and message capture
    pub fn to_text_lossy(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

/// Log level for processing-step events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug level - debug information
    Debug,
    /// Info level - general information
    Info,
    /// Warn level - warnings
    Warn,
    /// Error level - errors
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_bytes_are_text() {
        let payload = Payload::from_bytes(b"<r><v>5</v></r>".to_vec());
        assert_eq!(payload.as_text(), Some("<r><v>5</v></r>"));
        assert!(!payload.is_binary());
    }

    #[test]
    fn test_invalid_utf8_is_binary() {
        let bytes = vec![0xff, 0xfe, 0x41];
        let payload = Payload::from_bytes(bytes.clone());
        assert!(payload.is_binary());
        assert_eq!(payload.into_bytes(), bytes);
    }

    #[test]
    fn test_nul_byte_is_binary() {
        let payload = Payload::from_bytes(b"PK\x03\x04\x00\x00".to_vec());
        assert!(payload.is_binary());
        assert_eq!(payload.len(), 6);
    }
}
