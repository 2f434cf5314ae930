//! WOFF 1.0 decoding
//!
//! WOFF wraps each sfnt table in an optional zlib stream. Decoding inflates
//! every table and rebuilds a plain sfnt with the original `flavor`.

use std::borrow::Cow;
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;

use crate::error::ConvertError;
use crate::sfnt::{self, RawTable, MAX_SFNT_SIZE};

const SIGNATURE: u32 = u32::from_be_bytes(*b"wOFF");
const HEADER_LEN: usize = 44;
const DIRECTORY_ENTRY_LEN: usize = 20;

struct Entry {
    tag: [u8; 4],
    offset: u32,
    comp_length: u32,
    orig_length: u32,
}

/// Decode a WOFF file into an sfnt (`ttf`/`otf` depending on its flavor).
pub fn decode(data: &[u8]) -> Result<Vec<u8>, ConvertError> {
    if data.len() < HEADER_LEN {
        return Err(malformed("truncated header"));
    }
    let mut cur = Cursor::new(data);
    let signature = read_u32(&mut cur)?;
    if signature != SIGNATURE {
        return Err(malformed("bad signature"));
    }
    let flavor = read_u32(&mut cur)?;
    let length = read_u32(&mut cur)? as usize;
    let num_tables = read_u16(&mut cur)? as usize;
    if length > data.len() {
        return Err(malformed("declared length exceeds data"));
    }
    if num_tables == 0 {
        return Err(malformed("no tables"));
    }

    cur.set_position(HEADER_LEN as u64);
    if HEADER_LEN + num_tables * DIRECTORY_ENTRY_LEN > data.len() {
        return Err(malformed("truncated table directory"));
    }
    let mut entries = Vec::with_capacity(num_tables);
    for _ in 0..num_tables {
        let tag = read_u32(&mut cur)?.to_be_bytes();
        let offset = read_u32(&mut cur)?;
        let comp_length = read_u32(&mut cur)?;
        let orig_length = read_u32(&mut cur)?;
        let _checksum = read_u32(&mut cur)?;
        entries.push(Entry {
            tag,
            offset,
            comp_length,
            orig_length,
        });
    }

    let total: u64 = entries.iter().map(|e| u64::from(e.orig_length)).sum();
    if total > MAX_SFNT_SIZE {
        return Err(malformed("decoded size too large"));
    }

    let mut tables = Vec::with_capacity(entries.len());
    for entry in &entries {
        tables.push(RawTable {
            tag: entry.tag,
            data: Cow::Owned(inflate_table(data, entry)?),
        });
    }

    Ok(sfnt::assemble(flavor, tables))
}

fn inflate_table(data: &[u8], entry: &Entry) -> Result<Vec<u8>, ConvertError> {
    let tag = String::from_utf8_lossy(&entry.tag).into_owned();
    let start = entry.offset as usize;
    let stored = start
        .checked_add(entry.comp_length as usize)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| malformed(format!("table '{tag}' out of bounds")))?;

    if entry.comp_length > entry.orig_length {
        return Err(malformed(format!("table '{tag}' compressed length too large")));
    }
    if entry.comp_length == entry.orig_length {
        return Ok(stored.to_vec());
    }

    let mut out = Vec::with_capacity(entry.orig_length as usize);
    ZlibDecoder::new(stored)
        .take(u64::from(entry.orig_length) + 1)
        .read_to_end(&mut out)
        .map_err(|e| malformed(format!("table '{tag}' inflate failed: {e}")))?;
    if out.len() != entry.orig_length as usize {
        return Err(malformed(format!("table '{tag}' inflated to wrong length")));
    }
    Ok(out)
}

fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32, ConvertError> {
    cur.read_u32::<BigEndian>()
        .map_err(|_| malformed("unexpected end of data"))
}

fn read_u16(cur: &mut Cursor<&[u8]>) -> Result<u16, ConvertError> {
    cur.read_u16::<BigEndian>()
        .map_err(|_| malformed("unexpected end of data"))
}

fn malformed(reason: impl Into<String>) -> ConvertError {
    ConvertError::Malformed(format!("woff: {}", reason.into()))
}
