//! Newline-delimited JSON framing.
//!
//! # Frame Format
//!
//! Each message is a single JSON value serialized without embedded
//! newlines, terminated by `\n`. Blank lines are ignored. A trailing `\r`
//! is tolerated so clients on Windows pipes work unchanged.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// Maximum accepted line length (4 MB).
pub const MAX_LINE_LENGTH: usize = 4 * 1024 * 1024;

/// Encoder and decoder for newline-delimited JSON.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_length: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Create a codec with the default line limit.
    pub fn new() -> Self {
        Self {
            max_line_length: MAX_LINE_LENGTH,
        }
    }

    /// Create a codec with a custom line limit.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self { max_line_length }
    }

    /// The configured line limit.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Serialize a message into one `\n`-terminated line.
    pub fn encode<T: Serialize>(&self, message: &T) -> Result<String> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        if line.len() > self.max_line_length {
            return Err(ProtocolError::LineTooLong {
                size: line.len(),
                max: self.max_line_length,
            });
        }
        line.push('\n');
        Ok(line)
    }

    /// Parse one line into a raw JSON value.
    ///
    /// Returns `Ok(None)` for blank lines.
    pub fn decode_value(&self, line: &str) -> Result<Option<Value>> {
        if line.len() > self.max_line_length {
            return Err(ProtocolError::LineTooLong {
                size: line.len(),
                max: self.max_line_length,
            });
        }

        let trimmed = line.trim_end_matches(['\n', '\r']).trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value = serde_json::from_str(trimmed)
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(Some(value))
    }

    /// Parse one line into a typed message.
    ///
    /// Returns `Ok(None)` for blank lines.
    pub fn decode<T: DeserializeOwned>(&self, line: &str) -> Result<Option<T>> {
        match self.decode_value(line)? {
            Some(value) => {
                let message = serde_json::from_value(value)
                    .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Request, RequestId, Response};
    use serde_json::json;

    #[test]
    fn test_encode_appends_single_newline() {
        let codec = LineCodec::new();
        let line = codec
            .encode(&Response::success(Some(RequestId::Number(1)), json!({})))
            .unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_encode_escapes_embedded_newlines() {
        let codec = LineCodec::new();
        let line = codec.encode(&json!({"text": "a\nb"})).unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("a\\nb"));
    }

    #[test]
    fn test_decode_request() {
        let codec = LineCodec::new();
        let request: Request = codec
            .decode("{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(request.id, Some(RequestId::Number(3)));
        assert_eq!(request.method, "ping");
    }

    #[test]
    fn test_decode_blank_line() {
        let codec = LineCodec::new();
        assert!(codec.decode_value("   \n").unwrap().is_none());
        assert!(codec.decode_value("").unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_json() {
        let codec = LineCodec::new();
        let result = codec.decode_value("{not json}\n");
        assert!(matches!(result, Err(ProtocolError::Deserialization(_))));
    }

    #[test]
    fn test_line_limit_on_decode() {
        let codec = LineCodec::with_max_line_length(16);
        let result = codec.decode_value("{\"a\":\"0123456789abcdef\"}");
        assert!(matches!(
            result,
            Err(ProtocolError::LineTooLong { max: 16, .. })
        ));
    }

    #[test]
    fn test_line_limit_on_encode() {
        let codec = LineCodec::with_max_line_length(8);
        let result = codec.encode(&json!({"text": "way too long"}));
        assert!(matches!(result, Err(ProtocolError::LineTooLong { .. })));
    }
}
