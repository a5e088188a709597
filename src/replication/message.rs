//! Peer RPC wire contract
//!
//! Defines the three peer-to-peer RPCs (`Replicate`, `Heartbeat`,
//! `GetMissedLogs`) and the length-prefixed frame they travel in.

use serde::{Deserialize, Serialize};

/// A single log entry as it appears on the wire and in both logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub payload: String,
}

/// A peer RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Replicate a single entry to a secondary.
    Replicate(LogEntry),
    /// Health probe; carries the sender's own name for logging on the receiver.
    Heartbeat { secondary_name: String },
    /// Ask a secondary for every entry after `last_received_id`.
    GetMissedLogs { last_received_id: u64 },
}

/// A peer RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    LogAck {
        success: bool,
        message: String,
    },
    HeartbeatResp {
        status: String,
        last_log_id: u64,
    },
    MissedResp {
        entries: Vec<LogEntry>,
    },
    /// The receiver could not service the request.
    Error {
        message: String,
    },
}

impl Request {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Replicate(_) => "Replicate",
            Request::Heartbeat { .. } => "Heartbeat",
            Request::GetMissedLogs { .. } => "GetMissedLogs",
        }
    }
}

impl Response {
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Frame header for length-prefixed messages: 4-byte length + 4-byte CRC32.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub length: u32,
    pub checksum: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 8;

    pub fn new(data: &[u8]) -> Self {
        Self {
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            length: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            checksum: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_replicate_request() {
        let req = Request::Replicate(LogEntry {
            id: 7,
            payload: "hello".to_string(),
        });

        let bytes = req.serialize().unwrap();
        let restored = Request::deserialize(&bytes).unwrap();

        match restored {
            Request::Replicate(entry) => {
                assert_eq!(entry.id, 7);
                assert_eq!(entry.payload, "hello");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn frame_header_round_trips() {
        let data = b"some frame body";
        let header = FrameHeader::new(data);
        let bytes = header.to_bytes();
        let restored = FrameHeader::from_bytes(&bytes);

        assert_eq!(header.length, restored.length);
        assert_eq!(header.checksum, restored.checksum);
    }
}
