//! Envelope codec
//!
//! Inbound wire format: `{ "type": string, "content": any, "targetId"?: string }`.
//! Outbound wire format: `{ "type": string, "content": any, "senderId"?: string }`.
//!
//! `senderId` is stamped server-side only; a value supplied by the client is
//! discarded during deserialization and can never be spoofed.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Routable message kinds
///
/// Closed set: anything outside it is rejected with an `unknown_type` error
/// envelope. `Error` is reserved for server-originated messages; an inbound
/// frame claiming it is treated as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Broadcast to every registered client except the sender
    Chat,
    /// Acknowledgment to the sender, or a directed send via `targetId`
    Notification,
    /// Server-originated error report
    Error,
}

impl MessageKind {
    /// Parse a wire tag into a kind
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "chat" => Some(MessageKind::Chat),
            "notification" => Some(MessageKind::Notification),
            "error" => Some(MessageKind::Error),
            _ => None,
        }
    }

    /// Wire tag for this kind
    pub fn as_tag(&self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::Notification => "notification",
            MessageKind::Error => "error",
        }
    }
}

/// Error codes carried in `error` envelope content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Frame could not be parsed into an envelope
    DecodeError,
    /// Envelope `type` is not a registered kind
    UnknownType,
    /// Directed-send target is not registered
    NotFound,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DecodeError => "decode_error",
            ErrorCode::UnknownType => "unknown_type",
            ErrorCode::NotFound => "not_found",
        }
    }
}

/// Structured content of an `error` envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Machine-readable code (`decode_error`, `unknown_type`, `not_found`)
    pub code: String,
    /// Human-readable description
    pub message: String,
}

/// One application-level message
///
/// The `type` tag routes the envelope; `content` is opaque to the router and
/// owned by the handler for that kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Routing tag (`chat`, `notification`, `error`)
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque payload
    #[serde(default)]
    pub content: Value,

    /// Directed-send target (inbound only, never echoed back out)
    #[serde(default, skip_serializing)]
    pub target_id: Option<String>,

    /// Originating client (server-stamped, never read from the wire)
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

impl Envelope {
    /// Create an envelope with the given kind and content
    pub fn new(kind: MessageKind, content: Value) -> Self {
        Self {
            kind: kind.as_tag().to_string(),
            content,
            target_id: None,
            sender_id: None,
        }
    }

    /// Create a `chat` envelope
    pub fn chat(content: Value) -> Self {
        Self::new(MessageKind::Chat, content)
    }

    /// Create a `notification` envelope
    pub fn notification(content: Value) -> Self {
        Self::new(MessageKind::Notification, content)
    }

    /// Create a server-originated `error` envelope
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let body = ErrorBody {
            code: code.as_str().to_string(),
            message: message.into(),
        };
        // ErrorBody is a string/string pair, serialization cannot fail
        let content = serde_json::to_value(body).unwrap_or(Value::Null);
        Self::new(MessageKind::Error, content)
    }

    /// Stamp the originating client id
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender_id = Some(sender.into());
        self
    }

    /// Parsed kind, `None` when the tag is not a registered kind
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(&self.kind)
    }

    /// Serialize to the outbound wire form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Error type for envelope decoding
#[derive(Debug, Clone)]
pub enum DecodeError {
    /// Frame exceeds the configured size cap
    Oversize { len: usize, max: usize },
    /// Frame is not a well-formed envelope
    Malformed(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Oversize { len, max } => {
                write!(f, "Frame of {} bytes exceeds limit of {} bytes", len, max)
            }
            DecodeError::Malformed(msg) => write!(f, "Malformed envelope: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a raw frame into an envelope
///
/// Oversize frames and malformed payloads both fail; a partially-parsed
/// envelope is never returned.
pub fn decode(frame: &Bytes, max_frame_bytes: usize) -> Result<Envelope, DecodeError> {
    if frame.len() > max_frame_bytes {
        return Err(DecodeError::Oversize {
            len: frame.len(),
            max: max_frame_bytes,
        });
    }

    serde_json::from_slice(frame).map_err(|e| DecodeError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAX: usize = 64 * 1024;

    #[test]
    fn test_decode_chat() {
        let frame = Bytes::from_static(br#"{"type":"chat","content":"hi"}"#);
        let env = decode(&frame, MAX).unwrap();

        assert_eq!(env.kind, "chat");
        assert_eq!(env.message_kind(), Some(MessageKind::Chat));
        assert_eq!(env.content, json!("hi"));
        assert!(env.target_id.is_none());
    }

    #[test]
    fn test_decode_directed_notification() {
        let frame = Bytes::from_static(br#"{"type":"notification","content":"x","targetId":"7"}"#);
        let env = decode(&frame, MAX).unwrap();

        assert_eq!(env.message_kind(), Some(MessageKind::Notification));
        assert_eq!(env.target_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_decode_never_trusts_sender_id() {
        let frame = Bytes::from_static(br#"{"type":"chat","content":"hi","senderId":"999"}"#);
        let env = decode(&frame, MAX).unwrap();

        assert!(env.sender_id.is_none());
    }

    #[test]
    fn test_decode_missing_content_defaults_to_null() {
        let frame = Bytes::from_static(br#"{"type":"chat"}"#);
        let env = decode(&frame, MAX).unwrap();

        assert_eq!(env.content, Value::Null);
    }

    #[test]
    fn test_decode_malformed() {
        let frame = Bytes::from_static(b"{\"type\":\"chat\",");
        let result = decode(&frame, MAX);

        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_not_an_object() {
        let frame = Bytes::from_static(b"42");
        let result = decode(&frame, MAX);

        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_oversize() {
        let frame = Bytes::from_static(br#"{"type":"chat","content":"hi"}"#);
        let result = decode(&frame, 8);

        assert!(matches!(
            result,
            Err(DecodeError::Oversize { len: 30, max: 8 })
        ));
    }

    #[test]
    fn test_unknown_kind_preserved_for_rejection() {
        let frame = Bytes::from_static(br#"{"type":"bogus","content":null}"#);
        let env = decode(&frame, MAX).unwrap();

        assert_eq!(env.kind, "bogus");
        assert!(env.message_kind().is_none());
    }

    #[test]
    fn test_error_envelope_wire_shape() {
        let env = Envelope::error(ErrorCode::UnknownType, "unhandled message type: bogus");
        let json: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "error");
        assert_eq!(json["content"]["code"], "unknown_type");
        assert_eq!(json["content"]["message"], "unhandled message type: bogus");
    }

    #[test]
    fn test_outbound_omits_target_and_empty_sender() {
        let env = Envelope::chat(json!("hi"));
        let text = env.to_json().unwrap();

        assert!(!text.contains("targetId"));
        assert!(!text.contains("senderId"));

        let stamped = Envelope::chat(json!("hi")).with_sender("3");
        let text = stamped.to_json().unwrap();
        assert!(text.contains("\"senderId\":\"3\""));
    }
}
