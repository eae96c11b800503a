//! Binary history format.
//!
//! Header (20 bytes):
//!   [0..4]   Magic: "DLAH"
//!   [4..6]   Version: u16 (LE)
//!   [6..8]   Flags: u16 (LE), reserved, zero
//!   [8..16]  Record count: u64 (LE)
//!   [16..20] CRC32 of body
//!
//! Body, one entry per record in ascending key order:
//!   key: u64, dimension: u32, point count: u32,
//!   then `point count` pairs of (row: i32, col: i32)

use std::collections::BTreeMap;
use std::io::{self, Read};

use crate::history::{History, HistoryError, Snapshot};
use crate::{MAX_LATTICE_DIMENSION, Site};

pub const MAGIC: &[u8; 4] = b"DLAH";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 20;

/// IEEE CRC32 (reflected, polynomial 0xEDB88320).
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---- Write primitives ----

fn write_u16(w: &mut Vec<u8>, val: u16) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_u32(w: &mut Vec<u8>, val: u32) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_i32(w: &mut Vec<u8>, val: i32) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_u64(w: &mut Vec<u8>, val: u64) {
    w.extend_from_slice(&val.to_le_bytes());
}

// ---- Read primitives ----

fn read_u32(r: &mut &[u8]) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(r: &mut &[u8]) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u64(r: &mut &[u8]) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn truncated(err: io::Error) -> HistoryError {
    HistoryError::Deserialization(format!("truncated stream: {err}"))
}

// ---- Records ----

fn write_record(w: &mut Vec<u8>, key: u64, snapshot: &Snapshot) {
    write_u64(w, key);
    write_u32(w, snapshot.dimension());
    write_u32(w, snapshot.sites().len() as u32);
    for site in snapshot.sites() {
        write_i32(w, site.row);
        write_i32(w, site.col);
    }
}

fn read_record(r: &mut &[u8]) -> Result<(u64, Snapshot), HistoryError> {
    let key = read_u64(r).map_err(truncated)?;
    let dimension = read_u32(r).map_err(truncated)?;
    if dimension > MAX_LATTICE_DIMENSION {
        return Err(HistoryError::Deserialization(format!(
            "record {key} has dimension {dimension}, above the lattice limit {MAX_LATTICE_DIMENSION}"
        )));
    }
    let count = read_u32(r).map_err(truncated)? as usize;
    // Each point takes 8 bytes; refuse counts the remaining input cannot hold.
    if count > r.len() / 8 {
        return Err(HistoryError::Deserialization(format!(
            "record {key} claims {count} points but only {} bytes remain",
            r.len()
        )));
    }
    let mut sites = Vec::with_capacity(count);
    for _ in 0..count {
        let row = read_i32(r).map_err(truncated)?;
        let col = read_i32(r).map_err(truncated)?;
        sites.push(Site::new(row, col));
    }
    let snapshot = Snapshot::new(sites, dimension);
    if !snapshot.is_within_bounds() {
        return Err(HistoryError::Deserialization(format!(
            "record {key} holds a point outside dimension {dimension}"
        )));
    }
    Ok((key, snapshot))
}

// ---- Serialization ----

/// Encodes the whole store.
#[must_use]
pub fn encode(history: &History) -> Vec<u8> {
    let mut body = Vec::new();
    for (key, snapshot) in history.iter() {
        write_record(&mut body, key, snapshot);
    }

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(MAGIC);
    write_u16(&mut out, VERSION);
    write_u16(&mut out, 0);
    write_u64(&mut out, history.len() as u64);
    write_u32(&mut out, crc32(&body));
    out.extend_from_slice(&body);
    out
}

/// Decodes a whole store. Nothing is returned unless every byte validates.
pub fn decode(bytes: &[u8]) -> Result<History, HistoryError> {
    if bytes.len() < HEADER_LEN {
        return Err(HistoryError::Deserialization(format!(
            "stream of {} bytes is shorter than the {HEADER_LEN}-byte header",
            bytes.len()
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(HistoryError::Deserialization("bad magic".into()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(HistoryError::Deserialization(format!(
            "unsupported version {version}"
        )));
    }
    let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
    if flags != 0 {
        return Err(HistoryError::Deserialization(format!(
            "unsupported flags {flags:#06x}"
        )));
    }
    let count = u64::from_le_bytes(bytes[8..16].try_into().map_err(|_| {
        HistoryError::Deserialization("malformed record count".into())
    })?);
    let expected_crc = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let body = &bytes[HEADER_LEN..];
    let actual_crc = crc32(body);
    if actual_crc != expected_crc {
        return Err(HistoryError::Deserialization(format!(
            "CRC mismatch: expected {expected_crc:08X}, got {actual_crc:08X}"
        )));
    }

    let mut cursor = body;
    let mut records = BTreeMap::new();
    let mut last_key: Option<u64> = None;
    for _ in 0..count {
        let (key, snapshot) = read_record(&mut cursor)?;
        if last_key.is_some_and(|last| key <= last) {
            return Err(HistoryError::Deserialization(format!(
                "record key {key} is not greater than its predecessor"
            )));
        }
        last_key = Some(key);
        records.insert(key, snapshot);
    }
    if !cursor.is_empty() {
        return Err(HistoryError::Deserialization(format!(
            "{} trailing bytes after {count} records",
            cursor.len()
        )));
    }
    Ok(History::from_sorted(records))
}
