//! Raw sfnt assembly and table access shared by the WOFF codecs and the converter

use std::borrow::Cow;

use read_fonts::FontRef;
use write_fonts::types::Tag as WriteTag;
use write_fonts::FontBuilder;

use crate::error::ConvertError;

/// Upper bound on a decoded font, guarding against decompression bombs.
pub const MAX_SFNT_SIZE: u64 = 128 * 1024 * 1024;

/// One table pulled out of an sfnt, keyed by its raw 4-byte tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable<'a> {
    pub tag: [u8; 4],
    pub data: Cow<'a, [u8]>,
}

/// Sfnt version and tables of a single (non-collection) font, in directory order.
#[derive(Debug, Clone)]
pub struct SfntTables<'a> {
    pub flavor: u32,
    pub tables: Vec<RawTable<'a>>,
}

impl<'a> SfntTables<'a> {
    /// Read the table directory of `data`, checking every record lies inside the buffer.
    pub fn read(data: &'a [u8]) -> Result<Self, ConvertError> {
        let font = FontRef::new(data).map_err(|e| ConvertError::Malformed(e.to_string()))?;
        let flavor = font.table_directory.sfnt_version();
        let mut tables = Vec::with_capacity(font.table_directory.table_records().len());
        for record in font.table_directory.table_records() {
            let tag = record.tag().to_be_bytes();
            let start = record.offset() as usize;
            let end = start
                .checked_add(record.length() as usize)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| {
                    ConvertError::Malformed(format!(
                        "table '{}' extends past end of font",
                        String::from_utf8_lossy(&tag)
                    ))
                })?;
            tables.push(RawTable {
                tag,
                data: Cow::Borrowed(&data[start..end]),
            });
        }
        if tables.is_empty() {
            return Err(ConvertError::Malformed("font has no tables".into()));
        }
        Ok(Self { flavor, tables })
    }

    pub fn get(&self, tag: &[u8; 4]) -> Option<&[u8]> {
        self.tables
            .iter()
            .find(|t| &t.tag == tag)
            .map(|t| t.data.as_ref())
    }
}

/// Write `tables` as a binary sfnt whose header carries `flavor`.
pub fn assemble<'a>(flavor: u32, tables: impl IntoIterator<Item = RawTable<'a>>) -> Vec<u8> {
    let mut builder = FontBuilder::new();
    for table in tables {
        builder.add_raw(WriteTag::new(&table.tag), table.data);
    }
    let mut data = builder.build();
    // the builder always writes the TrueType version
    data[..4].copy_from_slice(&flavor.to_be_bytes());
    data
}

/// Round `len` up to the next multiple of four.
pub fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}
