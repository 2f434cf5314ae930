//! Font validation and metadata extraction
//!
//! Detection never trusts a filename: the container is identified by its
//! signature, unwrapped to an sfnt when needed, and the table directory is
//! parsed with read-fonts.

use std::borrow::Cow;

use read_fonts::tables::name::NameId;
use read_fonts::{FontRef, TableProvider};
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, FontError};
use crate::format::FontFormat;
use crate::sfnt::{self, RawTable, SfntTables};
use crate::{woff, woff2};

/// Weight class reported when a font carries no OS/2 table.
pub const DEFAULT_WEIGHT: u16 = 400;

const WINDOWS_PLATFORM: u16 = 3;
const ENGLISH_US: u16 = 0x0409;

/// Descriptive strings and classification pulled from `name` and `OS/2`.
///
/// Missing entries are empty strings, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontMetadata {
    pub family: String,
    pub full_name: String,
    pub postscript_name: String,
    pub style: String,
    pub weight: u16,
    pub manufacturer: String,
    pub license: String,
    pub designer: String,
    pub version: String,
    pub copyright: String,
    pub description: String,
}

/// A validated font: its container format and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontTypeInfo {
    pub format: FontFormat,
    pub metadata: FontMetadata,
}

impl FontTypeInfo {
    pub fn ext(&self) -> &'static str {
        self.format.ext()
    }

    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

/// Classify `data` as a supported font container and extract its metadata.
pub fn detect_and_validate(data: &[u8]) -> Result<FontTypeInfo, FontError> {
    let format = FontFormat::sniff(data).ok_or(FontError::UnsupportedFormat)?;

    let sfnt: Cow<[u8]> = match format {
        FontFormat::Ttf | FontFormat::Otf => Cow::Borrowed(data),
        FontFormat::Woff => Cow::Owned(woff::decode(data).map_err(FontError::corrupt)?),
        FontFormat::Woff2 => Cow::Owned(woff2_metadata_sfnt(data).map_err(FontError::corrupt)?),
    };

    // validates directory bounds before any table is touched
    SfntTables::read(&sfnt).map_err(FontError::corrupt)?;
    let font = FontRef::new(&sfnt).map_err(FontError::corrupt)?;
    let metadata = read_metadata(&font)?;

    Ok(FontTypeInfo { format, metadata })
}

/// Rebuild an sfnt from the WOFF2 tables stored without a transform.
///
/// Only `glyf`, `loca` and `hmtx` are ever transformed, so every table the
/// metadata comes from survives.
fn woff2_metadata_sfnt(data: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let decoded = woff2::decode_tables(data)?;
    let tables = decoded
        .tables
        .into_iter()
        .filter(|t| !t.transformed)
        .map(|t| RawTable {
            tag: t.tag,
            data: Cow::Owned(t.data),
        });
    Ok(sfnt::assemble(decoded.flavor, tables))
}

fn read_metadata(font: &FontRef) -> Result<FontMetadata, FontError> {
    let weight = match font.os2() {
        Ok(os2) => os2.us_weight_class(),
        Err(read_fonts::ReadError::TableIsMissing(_)) => DEFAULT_WEIGHT,
        Err(err) => return Err(FontError::corrupt(format!("OS/2 table: {err}"))),
    };

    let names = match font.name() {
        Ok(table) => Some(table),
        Err(read_fonts::ReadError::TableIsMissing(_)) => None,
        Err(err) => return Err(FontError::corrupt(format!("name table: {err}"))),
    };
    let lookup = |ids: &[NameId]| -> String {
        names
            .as_ref()
            .and_then(|table| ids.iter().find_map(|id| best_name(table, *id)))
            .unwrap_or_default()
    };

    Ok(FontMetadata {
        family: lookup(&[NameId::TYPOGRAPHIC_FAMILY_NAME, NameId::FAMILY_NAME]),
        full_name: lookup(&[NameId::FULL_NAME]),
        postscript_name: lookup(&[NameId::POSTSCRIPT_NAME]),
        style: lookup(&[NameId::TYPOGRAPHIC_SUBFAMILY_NAME, NameId::SUBFAMILY_NAME]),
        weight,
        manufacturer: lookup(&[NameId::MANUFACTURER]),
        license: lookup(&[NameId::LICENSE_DESCRIPTION]),
        designer: lookup(&[NameId::DESIGNER]),
        version: lookup(&[NameId::VERSION_STRING]),
        copyright: lookup(&[NameId::COPYRIGHT_NOTICE]),
        description: lookup(&[NameId::DESCRIPTION]),
    })
}

/// Prefer the Windows US-English record, then any Unicode record.
fn best_name(table: &read_fonts::tables::name::Name, id: NameId) -> Option<String> {
    let data = table.string_data();
    let mut fallback = None;

    for record in table.name_record() {
        if record.name_id() != id || !record.is_unicode() {
            continue;
        }
        let Ok(entry) = record.string(data) else {
            continue;
        };
        let rendered = entry.to_string().trim().to_string();
        if rendered.is_empty() {
            continue;
        }
        if record.platform_id() == WINDOWS_PLATFORM && record.language_id() == ENGLISH_US {
            return Some(rendered);
        }
        fallback.get_or_insert(rendered);
    }

    fallback
}
