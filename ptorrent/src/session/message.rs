use serde::{Deserialize, Serialize};

/// Delivery receipt bytes for a pushed `CHUNK_DATA` message.
pub const RECEIPT_ACK: &[u8; 3] = b"ACK";
pub const RECEIPT_ERR: &[u8; 3] = b"ERR";

/// Status carried by a `CHUNK_DATA` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// A peer wire header, dispatched on its `command` tag.
///
/// `REQUEST_CHUNK` asks for one piece; `CHUNK_DATA` answers it (or pushes a
/// piece unsolicited) and, when `status` is `OK`, announces `data_length`
/// payload bytes right after the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum PeerMessage {
    #[serde(rename = "REQUEST_CHUNK")]
    RequestChunk { file_name: String, chunk_index: u32 },
    #[serde(rename = "CHUNK_DATA")]
    ChunkData {
        status: ChunkStatus,
        file_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        chunk_index: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data_length: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl PeerMessage {
    pub fn chunk_ok(file_name: String, chunk_index: u32, data_length: u64) -> Self {
        PeerMessage::ChunkData {
            status: ChunkStatus::Ok,
            file_name,
            chunk_index: Some(chunk_index),
            data_length: Some(data_length),
            reason: None,
        }
    }

    pub fn chunk_error(file_name: String, reason: String) -> Self {
        PeerMessage::ChunkData {
            status: ChunkStatus::Error,
            file_name,
            chunk_index: None,
            data_length: None,
            reason: Some(reason),
        }
    }

    /// Number of payload bytes that follow this header on the wire.
    pub fn data_length(&self) -> u64 {
        match self {
            PeerMessage::ChunkData {
                data_length: Some(len),
                ..
            } => *len,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_chunk_wire_form() {
        let message = PeerMessage::RequestChunk {
            file_name: "demo.bin".to_string(),
            chunk_index: 2,
        };

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"command\":\"REQUEST_CHUNK\""));
        assert!(json.contains("\"file_name\":\"demo.bin\""));
        assert!(json.contains("\"chunk_index\":2"));

        let parsed: PeerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_chunk_ok_wire_form() {
        let message = PeerMessage::chunk_ok("demo.bin".to_string(), 1, 512);

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"command\":\"CHUNK_DATA\""));
        assert!(json.contains("\"status\":\"OK\""));
        assert!(json.contains("\"data_length\":512"));
        assert!(!json.contains("reason"));

        assert_eq!(message.data_length(), 512);
    }

    #[test]
    fn test_chunk_error_has_no_payload() {
        let message = PeerMessage::chunk_error("demo.bin".to_string(), "unknown file".to_string());

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"status\":\"ERROR\""));
        assert!(json.contains("\"reason\":\"unknown file\""));
        assert!(!json.contains("data_length"));

        assert_eq!(message.data_length(), 0);
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let json = r#"{"command":"WHO_KNOWS","file_name":"demo.bin"}"#;
        assert!(serde_json::from_str::<PeerMessage>(json).is_err());
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let json = r#"{"command":"REQUEST_CHUNK","file_name":"demo.bin"}"#;
        assert!(serde_json::from_str::<PeerMessage>(json).is_err());
    }
}
