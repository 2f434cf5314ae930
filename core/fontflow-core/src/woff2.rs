//! WOFF2 container encoding and table-level decoding
//!
//! The encoder stores every table with the null transform and compresses the
//! concatenated tables as a single brotli stream. The decoder only pulls the
//! tables back out of the stream; transformed `glyf`/`loca`/`hmtx` tables are
//! reported as such but not reconstructed.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::ConvertError;
use crate::sfnt::{padded_len, SfntTables, MAX_SFNT_SIZE};

const SIGNATURE: u32 = u32::from_be_bytes(*b"wOF2");
const HEADER_LEN: usize = 48;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_WINDOW: u32 = 22;
const BROTLI_BUFFER: usize = 4096;
const ARBITRARY_TAG: u8 = 0x3F;
/// Transform version 3 means "not transformed" for `glyf` and `loca`.
const GLYF_LOCA_NULL_TRANSFORM: u8 = 3 << 6;

/// Tags with a one-byte shorthand in the table directory, by index.
const KNOWN_TAGS: [&[u8; 4]; 63] = [
    b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post", b"cvt ", b"fpgm",
    b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT", b"EBLC", b"gasp", b"hdmx", b"kern",
    b"LTSH", b"PCLT", b"VDMX", b"vhea", b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC",
    b"JSTF", b"MATH", b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
    b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar", b"gvar", b"hsty",
    b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop", b"trak", b"Zapf", b"Silf", b"Glat",
    b"Gloc", b"Feat", b"Sill",
];

/// Compress an sfnt (`ttf` or `otf` layout) into a WOFF2 file.
pub fn encode(sfnt: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let font = SfntTables::read(sfnt)?;
    let mut tables: Vec<_> = font.tables.iter().collect();
    tables.sort_by_key(|t| t.tag);
    // keep loca directly after glyf, the order decoders expect
    if let Some(loca) = tables.iter().position(|t| &t.tag == b"loca") {
        let loca = tables.remove(loca);
        let at = tables
            .iter()
            .position(|t| &t.tag == b"glyf")
            .map_or(tables.len(), |glyf| glyf + 1);
        tables.insert(at, loca);
    }

    let num_tables = u16::try_from(tables.len())
        .map_err(|_| ConvertError::Malformed("too many tables".into()))?;

    let mut directory = Vec::with_capacity(tables.len() * 6);
    let mut stream = Vec::new();
    let mut total_sfnt_size = 12 + 16 * tables.len();
    for table in &tables {
        let mut flags = match KNOWN_TAGS.iter().position(|known| *known == &table.tag) {
            Some(index) => index as u8,
            None => ARBITRARY_TAG,
        };
        if &table.tag == b"glyf" || &table.tag == b"loca" {
            flags |= GLYF_LOCA_NULL_TRANSFORM;
        }
        directory.push(flags);
        if flags & ARBITRARY_TAG == ARBITRARY_TAG {
            directory.extend_from_slice(&table.tag);
        }
        let len = u32::try_from(table.data.len())
            .map_err(|_| ConvertError::Malformed("table larger than 4GiB".into()))?;
        write_base128(len, &mut directory);

        stream.extend_from_slice(&table.data);
        total_sfnt_size += padded_len(table.data.len());
    }

    let compressed = compress(&stream)?;
    let (major, minor) = font_revision(&font);

    let body_len = HEADER_LEN + directory.len() + compressed.len();
    let length = padded_len(body_len);
    let mut out = Vec::with_capacity(length);
    out.extend_from_slice(&SIGNATURE.to_be_bytes());
    out.extend_from_slice(&font.flavor.to_be_bytes());
    out.extend_from_slice(&(length as u32).to_be_bytes());
    out.extend_from_slice(&num_tables.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&(total_sfnt_size as u32).to_be_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(&major.to_be_bytes());
    out.extend_from_slice(&minor.to_be_bytes());
    // metaOffset, metaLength, metaOrigLength, privOffset, privLength
    out.extend_from_slice(&[0u8; 20]);
    debug_assert_eq!(out.len(), HEADER_LEN);
    out.extend_from_slice(&directory);
    out.extend_from_slice(&compressed);
    out.resize(length, 0);
    Ok(out)
}

/// One table as stored in a WOFF2 stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Woff2Table {
    pub tag: [u8; 4],
    /// `true` when the bytes are in a WOFF2-specific transformed layout.
    pub transformed: bool,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Woff2Tables {
    pub flavor: u32,
    pub tables: Vec<Woff2Table>,
}

impl Woff2Tables {
    pub fn get(&self, tag: &[u8; 4]) -> Option<&Woff2Table> {
        self.tables.iter().find(|t| &t.tag == tag)
    }
}

/// Parse a WOFF2 header and directory and decompress its table stream.
pub fn decode_tables(data: &[u8]) -> Result<Woff2Tables, ConvertError> {
    if data.len() < HEADER_LEN {
        return Err(malformed("truncated header"));
    }
    let mut cur = Cursor::new(data);
    if read_u32(&mut cur)? != SIGNATURE {
        return Err(malformed("bad signature"));
    }
    let flavor = read_u32(&mut cur)?;
    let length = read_u32(&mut cur)? as usize;
    let num_tables = read_u16(&mut cur)?;
    let _reserved = read_u16(&mut cur)?;
    let _total_sfnt_size = read_u32(&mut cur)?;
    let total_compressed_size = read_u32(&mut cur)? as usize;
    if length > data.len() {
        return Err(malformed("declared length exceeds data"));
    }
    if num_tables == 0 {
        return Err(malformed("no tables"));
    }
    if flavor == u32::from_be_bytes(*b"ttcf") {
        return Err(malformed("collections are not supported"));
    }
    cur.set_position(HEADER_LEN as u64);

    let mut entries = Vec::with_capacity(num_tables as usize);
    let mut stream_len: u64 = 0;
    for _ in 0..num_tables {
        let flags = cur.read_u8().map_err(|_| malformed("truncated directory"))?;
        let tag = if flags & ARBITRARY_TAG == ARBITRARY_TAG {
            read_u32(&mut cur)?.to_be_bytes()
        } else {
            *KNOWN_TAGS[(flags & ARBITRARY_TAG) as usize]
        };
        let version = flags >> 6;
        let transformed = if &tag == b"glyf" || &tag == b"loca" {
            version != 3
        } else {
            version != 0
        };
        let orig_length = read_base128(&mut cur)?;
        let stored_length = if transformed {
            read_base128(&mut cur)?
        } else {
            orig_length
        };
        stream_len += u64::from(stored_length);
        entries.push((tag, transformed, stored_length as usize));
    }
    if stream_len > MAX_SFNT_SIZE {
        return Err(malformed("decoded size too large"));
    }

    let start = cur.position() as usize;
    let compressed = start
        .checked_add(total_compressed_size)
        .filter(|end| *end <= length)
        .map(|end| &data[start..end])
        .ok_or_else(|| malformed("compressed stream out of bounds"))?;
    let stream = decompress(compressed, stream_len)?;
    if stream.len() as u64 != stream_len {
        return Err(malformed("decompressed stream has wrong length"));
    }

    let mut offset = 0;
    let tables = entries
        .into_iter()
        .map(|(tag, transformed, len)| {
            let data = stream[offset..offset + len].to_vec();
            offset += len;
            Woff2Table {
                tag,
                transformed,
                data,
            }
        })
        .collect();

    Ok(Woff2Tables { flavor, tables })
}

fn compress(stream: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let mut writer =
        brotli::CompressorWriter::new(Vec::new(), BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_WINDOW);
    writer
        .write_all(stream)
        .and_then(|_| writer.flush())
        .map_err(ConvertError::Compression)?;
    Ok(writer.into_inner())
}

fn decompress(compressed: &[u8], expected: u64) -> Result<Vec<u8>, ConvertError> {
    let mut out = Vec::with_capacity(expected as usize);
    brotli::Decompressor::new(compressed, BROTLI_BUFFER)
        .take(expected + 1)
        .read_to_end(&mut out)
        .map_err(|e| malformed(format!("brotli stream: {e}")))?;
    Ok(out)
}

/// Split `head.fontRevision` (16.16 fixed) into WOFF2 major/minor version fields.
fn font_revision(font: &SfntTables) -> (u16, u16) {
    font.get(b"head")
        .and_then(|head| head.get(4..8))
        .map(|rev| {
            (
                u16::from_be_bytes([rev[0], rev[1]]),
                u16::from_be_bytes([rev[2], rev[3]]),
            )
        })
        .unwrap_or((1, 0))
}

/// Encode `value` as a WOFF2 UIntBase128 (big-endian 7-bit groups).
fn write_base128(value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; 5];
    let mut len = 0;
    let mut rest = value;
    loop {
        groups[len] = (rest & 0x7F) as u8;
        len += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

fn read_base128(cur: &mut Cursor<&[u8]>) -> Result<u32, ConvertError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = cur.read_u8().map_err(|_| malformed("truncated directory"))?;
        if i == 0 && byte == 0x80 {
            return Err(malformed("UIntBase128 has leading zero"));
        }
        if value & 0xFE00_0000 != 0 {
            return Err(malformed("UIntBase128 overflow"));
        }
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(malformed("UIntBase128 longer than five bytes"))
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
    ConvertError::Malformed(format!("woff2: {}", reason.into()))
}
