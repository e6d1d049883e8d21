//! Message log record format.
//!
//! Every mutation of the store is one record appended to `messages.log`:
//!
//! ```text
//! | record_len (4) | kind (1) | message_id (8) | payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little endian. `record_len` covers the whole record
//! including itself and the checksum. The payload is CBOR.
//!
//! Kinds:
//! - `0x01` = created (payload: content, created_at)
//! - `0x02` = synced (payload: remote_ref, synced_at)

use crate::error::{CoreError, CoreResult};
use crate::types::MessageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind byte of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// A message was created.
    Created = 1,
    /// A message was mirrored.
    Synced = 2,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Created),
            2 => Some(Self::Synced),
            _ => None,
        }
    }

    /// Returns the kind byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One entry of the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A message was created in the `Pending` state.
    Created {
        /// The new message's id.
        id: MessageId,
        /// Message text.
        content: String,
        /// Creation time.
        created_at: DateTime<Utc>,
    },
    /// A pending message was mirrored.
    Synced {
        /// The message's id.
        id: MessageId,
        /// Mirror commit id.
        remote_ref: String,
        /// When the sync mark was accepted.
        synced_at: DateTime<Utc>,
    },
}

#[derive(Serialize, Deserialize)]
struct CreatedPayload {
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct SyncedPayload {
    remote_ref: String,
    synced_at: DateTime<Utc>,
}

impl LogRecord {
    /// Bytes before the payload: record_len (4) + kind (1) + message_id (8).
    pub const HEADER_SIZE: usize = 13;
    /// Trailing checksum size.
    pub const CRC_SIZE: usize = 4;
    /// Smallest possible record.
    pub const MIN_SIZE: usize = Self::HEADER_SIZE + Self::CRC_SIZE;

    /// Returns the record's kind.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            LogRecord::Created { .. } => RecordKind::Created,
            LogRecord::Synced { .. } => RecordKind::Synced,
        }
    }

    /// Returns the id of the message this record is about.
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        match self {
            LogRecord::Created { id, .. } | LogRecord::Synced { id, .. } => *id,
        }
    }

    /// Encodes the record, checksum included.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the payload cannot be serialized.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        let written = match self {
            LogRecord::Created {
                content,
                created_at,
                ..
            } => ciborium::into_writer(
                &CreatedPayload {
                    content: content.clone(),
                    created_at: *created_at,
                },
                &mut payload,
            ),
            LogRecord::Synced {
                remote_ref,
                synced_at,
                ..
            } => ciborium::into_writer(
                &SyncedPayload {
                    remote_ref: remote_ref.clone(),
                    synced_at: *synced_at,
                },
                &mut payload,
            ),
        };
        written.map_err(|e| CoreError::codec(e.to_string()))?;

        let record_len = Self::HEADER_SIZE + payload.len() + Self::CRC_SIZE;
        let record_len_u32 = u32::try_from(record_len)
            .map_err(|_| CoreError::codec(format!("record of {record_len} bytes is too large")))?;

        let mut buf = Vec::with_capacity(record_len);
        buf.extend_from_slice(&record_len_u32.to_le_bytes());
        buf.push(self.kind().as_byte());
        buf.extend_from_slice(&self.message_id().as_u64().to_le_bytes());
        buf.extend_from_slice(&payload);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        Ok(buf)
    }

    /// Reads the `record_len` prefix from the first four bytes of a record.
    #[must_use]
    pub fn peek_len(prefix: [u8; 4]) -> usize {
        u32::from_le_bytes(prefix) as usize
    }

    /// Decodes a complete record.
    ///
    /// `offset` is only used to label errors.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ChecksumMismatch`] if the checksum does not match
    /// - [`CoreError::Corruption`] for a bad length or unknown kind
    /// - [`CoreError::Codec`] if the payload is not valid CBOR for its kind
    pub fn decode(data: &[u8], offset: u64) -> CoreResult<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(CoreError::corruption(offset, "record too short"));
        }

        let record_len = Self::peek_len([data[0], data[1], data[2], data[3]]);
        if record_len < Self::MIN_SIZE || data.len() < record_len {
            return Err(CoreError::corruption(
                offset,
                format!("invalid record length {record_len}"),
            ));
        }

        let body = &data[..record_len - Self::CRC_SIZE];
        let stored_crc = u32::from_le_bytes([
            data[record_len - 4],
            data[record_len - 3],
            data[record_len - 2],
            data[record_len - 1],
        ]);
        let computed_crc = compute_crc32(body);
        if stored_crc != computed_crc {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let kind = RecordKind::from_byte(data[4])
            .ok_or_else(|| CoreError::corruption(offset, format!("unknown record kind {}", data[4])))?;

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&data[5..13]);
        let id = MessageId::new(u64::from_le_bytes(id_bytes));

        let payload = &body[Self::HEADER_SIZE..];
        match kind {
            RecordKind::Created => {
                let p: CreatedPayload = ciborium::from_reader(payload)
                    .map_err(|e| CoreError::codec(format!("created record {id}: {e}")))?;
                Ok(LogRecord::Created {
                    id,
                    content: p.content,
                    created_at: p.created_at,
                })
            }
            RecordKind::Synced => {
                let p: SyncedPayload = ciborium::from_reader(payload)
                    .map_err(|e| CoreError::codec(format!("synced record {id}: {e}")))?;
                Ok(LogRecord::Synced {
                    id,
                    remote_ref: p.remote_ref,
                    synced_at: p.synced_at,
                })
            }
        }
    }
}

/// Computes the CRC32 (IEEE) checksum used by log records.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}
