//! Newline-delimited JSON frame codec: one response shape covering both
//! success and failure, distinguished by `status` instead of an HTTP
//! status code.

use model::error::WireStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct RequestFrame {
    #[serde(rename = "type")]
    pub op: i32,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct ResponseFrame {
    #[serde(rename = "type")]
    pub op: i32,
    pub status: i32,
    pub payload: ResponsePayload,
}

#[derive(Debug, Default, Serialize)]
pub struct ResponsePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseFrame {
    pub fn ok(op: i32, output: Value) -> Self {
        Self {
            op,
            status: WireStatus::Ok as i32,
            payload: ResponsePayload {
                output: Some(output),
                error: None,
            },
        }
    }

    pub fn error(op: i32, status: WireStatus, message: impl Into<String>) -> Self {
        Self {
            op,
            status: status as i32,
            payload: ResponsePayload {
                output: None,
                error: Some(message.into()),
            },
        }
    }

    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).expect("response frame is always serializable");
        line.push('\n');
        line
    }
}

#[derive(Debug)]
pub enum FrameError {
    TooLarge,
    Malformed(serde_json::Error),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLarge => write!(f, "frame exceeds {MAX_FRAME_BYTES} bytes"),
            Self::Malformed(why) => write!(f, "malformed frame: {why}"),
        }
    }
}

pub fn parse_line(line: &str) -> Result<RequestFrame, FrameError> {
    if line.len() > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge);
    }
    serde_json::from_str(line).map_err(FrameError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_request() {
        let frame = parse_line(r#"{"type": 1, "payload": {"a": 1}}"#).unwrap();
        assert_eq!(frame.op, 1);
        assert_eq!(frame.payload["a"], 1);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(parse_line("not json"), Err(FrameError::Malformed(_))));
    }

    #[test]
    fn rejects_oversized_frames() {
        let huge = format!(r#"{{"type": 1, "payload": "{}"}}"#, "x".repeat(MAX_FRAME_BYTES));
        assert!(matches!(parse_line(&huge), Err(FrameError::TooLarge)));
    }

    #[test]
    fn ok_response_serializes_without_error_field() {
        let frame = ResponseFrame::ok(1, serde_json::json!({"requestId": 7}));
        let line = frame.to_line();
        assert!(line.ends_with('\n'));
        assert!(!line.contains("\"error\""));
    }
}
