//! On-disk layout of the reminder snapshot.
//!
//! ```text
//! [magic "GEOF"][format: u8][payload len: u32 LE][crc32 of payload: u32 LE][payload: JSON]
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reminder::Reminder;
use crate::storage::traits::StorageError;

const MAGIC: [u8; 4] = *b"GEOF";
const FORMAT: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 4;

/// A snapshot larger than this is treated as damaged.
const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Every reminder as of one write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct Snapshot {
    pub(super) saved_at: DateTime<Utc>,
    pub(super) reminders: Vec<Reminder>,
}

fn corrupted(detail: impl Into<String>) -> StorageError {
    StorageError::Corrupted(detail.into())
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    u32::from_le_bytes(word)
}

impl Snapshot {
    pub(super) fn new(reminders: Vec<Reminder>) -> Self {
        Self {
            saved_at: Utc::now(),
            reminders,
        }
    }

    pub(super) fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        let payload = serde_json::to_vec(self).map_err(|e| StorageError::SerializationError(e.to_string()))?;
        if payload.len() > MAX_PAYLOAD {
            return Err(StorageError::SerializationError(format!(
                "snapshot of {} bytes exceeds {MAX_PAYLOAD}",
                payload.len()
            )));
        }
        let len = u32::try_from(payload.len())
            .map_err(|_| StorageError::SerializationError("snapshot length overflows u32".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&MAGIC);
        out.push(FORMAT);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub(super) fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < HEADER_LEN {
            return Err(corrupted(format!("snapshot truncated to {} bytes", bytes.len())));
        }
        let (header, payload) = bytes.split_at(HEADER_LEN);
        if header[..4] != MAGIC {
            return Err(corrupted("not a reminder snapshot"));
        }
        if header[4] != FORMAT {
            return Err(corrupted(format!("unsupported snapshot format {}", header[4])));
        }

        let len = le_u32(&header[5..9]) as usize;
        if len != payload.len() {
            return Err(corrupted(format!(
                "snapshot length {len} does not match {} stored bytes",
                payload.len()
            )));
        }
        let stored = le_u32(&header[9..13]);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(corrupted(format!("crc mismatch: stored={stored:08x} computed={computed:08x}")));
        }

        serde_json::from_slice(payload).map_err(|e| corrupted(format!("snapshot payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::reminder::NewReminder;

    fn snapshot() -> Snapshot {
        let reminder = NewReminder {
            location_id: "7".to_string(),
            name: "Ferry Building".to_string(),
            latitude: 37.7955,
            longitude: -122.3937,
            radius: 150.0,
            category: "Market".to_string(),
            note: "oysters".to_string(),
        }
        .into_reminder(Utc::now());
        Snapshot::new(vec![reminder])
    }

    #[test]
    fn snapshot_reads_back_what_was_written() {
        let original = snapshot();
        let bytes = original.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"GEOF");
        assert_eq!(Snapshot::from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn damaged_payload_is_reported_corrupted() {
        let mut bytes = snapshot().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = Snapshot::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("crc mismatch"), "got {err}");
    }

    #[test]
    fn truncated_and_foreign_files_are_rejected() {
        let bytes = snapshot().to_bytes().unwrap();
        assert!(matches!(
            Snapshot::from_bytes(&bytes[..bytes.len() - 3]),
            Err(StorageError::Corrupted(_))
        ));
        assert!(matches!(Snapshot::from_bytes(b"GEOF"), Err(StorageError::Corrupted(_))));

        let mut foreign = bytes;
        foreign[..4].copy_from_slice(b"XXXX");
        assert!(matches!(Snapshot::from_bytes(&foreign), Err(StorageError::Corrupted(_))));
    }
}
