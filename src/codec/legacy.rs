//! Legacy binary format
//!
//! Little-endian layout:
//!
//! ```text
//! magic "TCL3"
//! u32   entry count
//! per entry:
//!   str   key
//!   u8    kind (1 = access token, 2 = refresh token, 3 = id token)
//!   str   secret
//!   opt   client id   (u8 presence, then str)
//!   opt   expires on  (u8 presence, then i64 unix seconds)
//! str = u32 byte length + UTF-8 bytes
//! ```
//!
//! Environment, extended expiry, family id and extra fields are not stored,
//! and account / app metadata entries are skipped when encoding.

use super::{CacheEntry, CacheState, EntryKind, FormatKind};
use crate::error::{CacheError, CacheResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};
use tracing::debug;

const MAGIC: &[u8; 4] = b"TCL3";

fn kind_tag(kind: EntryKind) -> Option<u8> {
    match kind {
        EntryKind::AccessToken => Some(1),
        EntryKind::RefreshToken => Some(2),
        EntryKind::IdToken => Some(3),
        EntryKind::Account | EntryKind::AppMetadata => None,
    }
}

fn kind_from_tag(tag: u8) -> Option<EntryKind> {
    match tag {
        1 => Some(EntryKind::AccessToken),
        2 => Some(EntryKind::RefreshToken),
        3 => Some(EntryKind::IdToken),
        _ => None,
    }
}

/// Parse a legacy blob
pub fn decode(bytes: &[u8]) -> CacheResult<CacheState> {
    let mut reader = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| malformed("missing header"))?;
    if &magic != MAGIC {
        return Err(malformed("unrecognized header"));
    }

    let count = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    let mut state = CacheState::new();

    for index in 0..count {
        let key = read_str(&mut reader)?;
        let tag = reader.read_u8().map_err(truncated)?;
        let kind = kind_from_tag(tag)
            .ok_or_else(|| malformed(format!("entry {} has unknown kind tag {}", index, tag)))?;

        let mut entry = CacheEntry::new(kind, read_str(&mut reader)?);
        if read_flag(&mut reader)? {
            entry.client_id = Some(read_str(&mut reader)?);
        }
        if read_flag(&mut reader)? {
            entry.expires_on = Some(reader.read_i64::<LittleEndian>().map_err(truncated)?);
        }

        if state.insert(key.clone(), entry).is_some() {
            return Err(malformed(format!("duplicate key {}", key)));
        }
    }

    if reader.position() != bytes.len() as u64 {
        return Err(malformed(format!(
            "{} trailing bytes after {} entries",
            bytes.len() as u64 - reader.position(),
            count
        )));
    }

    Ok(state)
}

/// Serialize the representable part of `state`
pub fn encode(state: &CacheState) -> CacheResult<Vec<u8>> {
    let representable: Vec<(&String, &CacheEntry, u8)> = state
        .iter()
        .filter_map(|(key, entry)| match kind_tag(entry.kind) {
            Some(tag) => Some((key, entry, tag)),
            None => {
                debug!("Skipping {} entry {} in legacy format", entry.kind, key);
                None
            }
        })
        .collect();

    let count = u32::try_from(representable.len())
        .map_err(|_| CacheError::Internal("too many entries for legacy format".into()))?;

    let mut out = Vec::new();
    write_all(&mut out, count, &representable)
        .map_err(|e| CacheError::Internal(format!("legacy encoding failed: {}", e)))?;
    Ok(out)
}

fn write_all(out: &mut Vec<u8>, count: u32, entries: &[(&String, &CacheEntry, u8)]) -> io::Result<()> {
    out.extend_from_slice(MAGIC);
    out.write_u32::<LittleEndian>(count)?;

    for (key, entry, tag) in entries {
        write_str(out, key)?;
        out.write_u8(*tag)?;
        write_str(out, &entry.secret)?;

        match &entry.client_id {
            Some(client_id) => {
                out.write_u8(1)?;
                write_str(out, client_id)?;
            }
            None => out.write_u8(0)?,
        }

        match entry.expires_on {
            Some(expires_on) => {
                out.write_u8(1)?;
                out.write_i64::<LittleEndian>(expires_on)?;
            }
            None => out.write_u8(0)?,
        }
    }

    Ok(())
}

fn write_str(out: &mut Vec<u8>, value: &str) -> io::Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string too long"))?;
    out.write_u32::<LittleEndian>(len)?;
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn read_str(reader: &mut Cursor<&[u8]>) -> CacheResult<String> {
    let len = reader.read_u32::<LittleEndian>().map_err(truncated)? as u64;
    let remaining = reader.get_ref().len() as u64 - reader.position();
    if len > remaining {
        return Err(malformed(format!(
            "string of {} bytes exceeds remaining {} bytes",
            len, remaining
        )));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).map_err(truncated)?;
    String::from_utf8(buf).map_err(|_| malformed("string is not valid UTF-8"))
}

fn read_flag(reader: &mut Cursor<&[u8]>) -> CacheResult<bool> {
    match reader.read_u8().map_err(truncated)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(malformed(format!("invalid presence byte {}", other))),
    }
}

fn malformed(reason: impl Into<String>) -> CacheError {
    CacheError::malformed(FormatKind::Legacy, reason)
}

fn truncated(_: io::Error) -> CacheError {
    malformed("data ends unexpectedly")
}
