//! Entry codec for the durable queue record
//!
//! Serializes a `QueueEntry` to the canonical JSON byte representation stored
//! in the queue partitions. Decoding tolerates unknown fields (forward
//! compatibility) but re-validates the match-type invariant, so a corrupt or
//! hand-edited record can never produce an invalid entry in memory.

use crate::error::{QueueError, Result};
use crate::types::QueueEntry;

/// Codec for the durable queue entry payload
pub struct EntryCodec;

impl EntryCodec {
    /// Encode an entry to its canonical byte representation.
    pub fn encode(entry: &QueueEntry) -> Result<Vec<u8>> {
        entry.validate()?;
        serde_json::to_vec(entry).map_err(|e| {
            QueueError::Codec {
                reason: format!("Failed to encode entry {}: {}", entry.id, e),
            }
            .into()
        })
    }

    /// Decode an entry, rejecting malformed or invariant-violating records.
    pub fn decode(bytes: &[u8]) -> Result<QueueEntry> {
        let entry: QueueEntry = serde_json::from_slice(bytes).map_err(|e| QueueError::Codec {
            reason: format!("Malformed entry record: {}", e),
        })?;

        // A record violating the match-type invariant is corrupt, not invalid input.
        if let Err(e) = entry.validate() {
            return Err(QueueError::Codec {
                reason: format!("Entry record violates invariant: {}", e),
            }
            .into());
        }

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchType, Player};
    use crate::utils::{current_timestamp, generate_entry_id};

    fn rated_entry(max_elo_diff: Option<u32>) -> QueueEntry {
        QueueEntry {
            id: generate_entry_id(),
            player: Player {
                address: "0xa11ce".to_string(),
                elo: 1520,
                joined_at: current_timestamp(),
            },
            match_type: MatchType::Rated,
            invite_address: None,
            max_elo_diff,
        }
    }

    #[test]
    fn test_round_trip() {
        let entry = rated_entry(Some(250));
        let bytes = EntryCodec::encode(&entry).unwrap();
        let decoded = EntryCodec::decode(&bytes).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn test_encode_rejects_invalid_entry() {
        let mut entry = rated_entry(None);
        entry.invite_address = Some("0xb0b".to_string());
        assert!(EntryCodec::encode(&entry).is_err());
    }

    #[test]
    fn test_decode_rejects_mismatched_optional_field() {
        // A Casual record carrying max_elo_diff is corrupt by definition.
        let entry = rated_entry(Some(100));
        let mut value: serde_json::Value =
            serde_json::from_slice(&EntryCodec::encode(&entry).unwrap()).unwrap();
        value["match_type"] = serde_json::json!("Casual");

        let err = EntryCodec::decode(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        let queue_err = err.downcast_ref::<QueueError>().unwrap();
        assert!(matches!(queue_err, QueueError::Codec { .. }));
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let entry = rated_entry(None);
        let mut value: serde_json::Value =
            serde_json::from_slice(&EntryCodec::encode(&entry).unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("player");

        assert!(EntryCodec::decode(&serde_json::to_vec(&value).unwrap()).is_err());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let entry = rated_entry(Some(300));
        let mut value: serde_json::Value =
            serde_json::from_slice(&EntryCodec::encode(&entry).unwrap()).unwrap();
        value["region_hint"] = serde_json::json!("eu-west");

        let decoded = EntryCodec::decode(&serde_json::to_vec(&value).unwrap()).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(EntryCodec::decode(b"not json at all").is_err());
        assert!(EntryCodec::decode(&[]).is_err());
    }
}
