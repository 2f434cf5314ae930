//! Synthetic fonts for tests and benches
//!
//! Small but structurally complete TrueType and CFF fonts, built byte by byte
//! so tests never depend on font files being present on disk.

use std::borrow::Cow;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::sfnt::{self, RawTable, SfntTables};

const UNITS_PER_EM: u16 = 1000;
const NUM_GLYPHS: u16 = 2;

/// A TrueType font with an empty `.notdef` and one rectangular glyph.
pub fn truetype_font(family: &str, style: &str, weight: u16) -> Vec<u8> {
    let glyph = square_glyph();
    let mut loca = Vec::new();
    for offset in [0u32, 0, glyph.len() as u32] {
        loca.extend_from_slice(&offset.to_be_bytes());
    }

    sfnt::assemble(
        0x0001_0000,
        [
            table(b"head", head(1)),
            table(b"hhea", hhea()),
            table(b"maxp", maxp_v1()),
            table(b"OS/2", os2(weight)),
            table(b"hmtx", hmtx()),
            table(b"name", name(family, style)),
            table(b"post", post()),
            table(b"glyf", glyph),
            table(b"loca", loca),
        ],
    )
}

/// A CFF-flavored OpenType font whose second glyph has a cubic segment.
pub fn opentype_font(family: &str, style: &str, weight: u16) -> Vec<u8> {
    let ps_name = postscript_name(family, style);
    sfnt::assemble(
        u32::from_be_bytes(*b"OTTO"),
        [
            table(b"head", head(0)),
            table(b"hhea", hhea()),
            table(b"maxp", maxp_v05()),
            table(b"OS/2", os2(weight)),
            table(b"hmtx", hmtx()),
            table(b"name", name(family, style)),
            table(b"post", post()),
            table(b"CFF ", cff(&ps_name)),
        ],
    )
}

/// Wrap an sfnt in a WOFF 1.0 container, compressing tables where it helps.
pub fn woff_from_sfnt(data: &[u8]) -> Vec<u8> {
    let font = SfntTables::read(data).expect("fixture sfnt");
    let header_len = 44;
    let dir_len = 20 * font.tables.len();

    let mut directory = Vec::new();
    let mut bodies = Vec::new();
    let mut offset = header_len + dir_len;
    for table in &font.tables {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&table.data).expect("zlib");
        let compressed = encoder.finish().expect("zlib");
        let stored = if compressed.len() < table.data.len() {
            compressed
        } else {
            table.data.to_vec()
        };

        directory.extend_from_slice(&table.tag);
        directory.extend_from_slice(&(offset as u32).to_be_bytes());
        directory.extend_from_slice(&(stored.len() as u32).to_be_bytes());
        directory.extend_from_slice(&(table.data.len() as u32).to_be_bytes());
        directory.extend_from_slice(&0u32.to_be_bytes());

        let padded = sfnt::padded_len(stored.len());
        offset += padded;
        bodies.push((stored, padded));
    }

    let mut out = Vec::with_capacity(offset);
    out.extend_from_slice(b"wOFF");
    out.extend_from_slice(&font.flavor.to_be_bytes());
    out.extend_from_slice(&(offset as u32).to_be_bytes());
    out.extend_from_slice(&(font.tables.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&[0u8; 20]);
    out.extend_from_slice(&directory);
    for (body, padded) in bodies {
        let len = out.len() + padded;
        out.extend_from_slice(&body);
        out.resize(len, 0);
    }
    out
}

/// The first bytes of a PNG image.
pub fn png_bytes() -> Vec<u8> {
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(&[0, 0, 0, 13]);
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]);
    png
}

fn table(tag: &[u8; 4], data: Vec<u8>) -> RawTable<'static> {
    RawTable {
        tag: *tag,
        data: Cow::Owned(data),
    }
}

fn postscript_name(family: &str, style: &str) -> String {
    let family: String = family.chars().filter(|c| !c.is_whitespace()).collect();
    format!("{family}-{style}")
}

fn head(index_to_loc_format: i16) -> Vec<u8> {
    let mut t = Vec::with_capacity(54);
    t.extend_from_slice(&1u16.to_be_bytes());
    t.extend_from_slice(&0u16.to_be_bytes());
    t.extend_from_slice(&0x0001_8000u32.to_be_bytes()); // fontRevision 1.5
    t.extend_from_slice(&0u32.to_be_bytes());
    t.extend_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
    t.extend_from_slice(&0x000Bu16.to_be_bytes());
    t.extend_from_slice(&UNITS_PER_EM.to_be_bytes());
    t.extend_from_slice(&[0u8; 16]); // created, modified
    for v in [0i16, 0, 400, 300] {
        t.extend_from_slice(&v.to_be_bytes());
    }
    t.extend_from_slice(&0u16.to_be_bytes()); // macStyle
    t.extend_from_slice(&8u16.to_be_bytes());
    t.extend_from_slice(&2i16.to_be_bytes());
    t.extend_from_slice(&index_to_loc_format.to_be_bytes());
    t.extend_from_slice(&0i16.to_be_bytes());
    t
}

fn hhea() -> Vec<u8> {
    let mut t = Vec::with_capacity(36);
    t.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    for v in [800i16, -200, 0] {
        t.extend_from_slice(&v.to_be_bytes());
    }
    t.extend_from_slice(&500u16.to_be_bytes());
    for v in [0i16, 100, 400, 1, 0, 0, 0, 0, 0, 0, 0] {
        t.extend_from_slice(&v.to_be_bytes());
    }
    t.extend_from_slice(&NUM_GLYPHS.to_be_bytes());
    t
}

fn maxp_v05() -> Vec<u8> {
    let mut t = Vec::with_capacity(6);
    t.extend_from_slice(&0x0000_5000u32.to_be_bytes());
    t.extend_from_slice(&NUM_GLYPHS.to_be_bytes());
    t
}

fn maxp_v1() -> Vec<u8> {
    let mut t = Vec::with_capacity(32);
    t.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    t.extend_from_slice(&NUM_GLYPHS.to_be_bytes());
    for v in [4u16, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0] {
        t.extend_from_slice(&v.to_be_bytes());
    }
    t
}

fn os2(weight: u16) -> Vec<u8> {
    let mut t = vec![0u8; 96];
    t[0..2].copy_from_slice(&4u16.to_be_bytes());
    t[2..4].copy_from_slice(&500i16.to_be_bytes());
    t[4..6].copy_from_slice(&weight.to_be_bytes());
    t[6..8].copy_from_slice(&5u16.to_be_bytes());
    t[58..62].copy_from_slice(b"FFLW");
    t[68..70].copy_from_slice(&800i16.to_be_bytes());
    t[70..72].copy_from_slice(&(-200i16).to_be_bytes());
    t[74..76].copy_from_slice(&800u16.to_be_bytes());
    t[76..78].copy_from_slice(&200u16.to_be_bytes());
    t
}

fn hmtx() -> Vec<u8> {
    let mut t = Vec::new();
    for (advance, lsb) in [(500u16, 0i16), (500, 100)] {
        t.extend_from_slice(&advance.to_be_bytes());
        t.extend_from_slice(&lsb.to_be_bytes());
    }
    t
}

fn name(family: &str, style: &str) -> Vec<u8> {
    let full = format!("{family} {style}");
    let ps_name = postscript_name(family, style);
    let entries: [(u16, &str); 9] = [
        (0, "Copyright 2024 Fixture Foundry"),
        (1, family),
        (2, style),
        (4, &full),
        (5, "Version 1.500"),
        (6, &ps_name),
        (8, "Fixture Foundry"),
        (9, "Ada Fixture"),
        (13, "SIL Open Font License 1.1"),
    ];

    let mut records = Vec::new();
    let mut strings = Vec::new();
    for (id, text) in entries {
        let encoded: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
        for v in [3u16, 1, 0x0409, id, encoded.len() as u16, strings.len() as u16] {
            records.extend_from_slice(&v.to_be_bytes());
        }
        strings.extend_from_slice(&encoded);
    }

    let count = entries.len() as u16;
    let mut t = Vec::new();
    t.extend_from_slice(&0u16.to_be_bytes());
    t.extend_from_slice(&count.to_be_bytes());
    t.extend_from_slice(&(6 + 12 * count).to_be_bytes());
    t.extend_from_slice(&records);
    t.extend_from_slice(&strings);
    t
}

fn post() -> Vec<u8> {
    let mut t = vec![0u8; 32];
    t[0..4].copy_from_slice(&0x0003_0000u32.to_be_bytes());
    t[8..10].copy_from_slice(&(-100i16).to_be_bytes());
    t[10..12].copy_from_slice(&50i16.to_be_bytes());
    t
}

/// One contour, four on-curve points: (100,0) (400,0) (400,300) (100,300).
fn square_glyph() -> Vec<u8> {
    let mut g = Vec::new();
    for v in [1i16, 100, 0, 400, 300] {
        g.extend_from_slice(&v.to_be_bytes());
    }
    g.extend_from_slice(&3u16.to_be_bytes()); // endPtsOfContours
    g.extend_from_slice(&0u16.to_be_bytes()); // instructionLength
    g.extend_from_slice(&[0x01; 4]);
    for dx in [100i16, 300, 0, -300] {
        g.extend_from_slice(&dx.to_be_bytes());
    }
    for dy in [0i16, 0, 300, 0] {
        g.extend_from_slice(&dy.to_be_bytes());
    }
    g
}

fn cff(ps_name: &str) -> Vec<u8> {
    let notdef = vec![14u8]; // endchar
    let ops: [(&[i32], u8); 4] = [
        (&[100, 0], 21),                   // rmoveto
        (&[300, 0], 5),                    // rlineto
        (&[0, 100, 0, 100, -100, 100], 8), // rrcurveto
        (&[-200, 0], 5),                   // rlineto
    ];
    let mut shape = Vec::new();
    for (args, operator) in ops {
        for &v in args {
            push_charstring_int(&mut shape, v);
        }
        shape.push(operator);
    }
    shape.push(14);

    let header = [1u8, 0, 4, 1];
    let name_index = index(&[ps_name.as_bytes()]);
    let top_dict_len = 17;
    let strings = index(&[]);
    let gsubrs = index(&[]);
    let charstrings_offset = header.len()
        + name_index.len()
        + (2 + 1 + 2 + top_dict_len)
        + strings.len()
        + gsubrs.len();
    let charstrings = index(&[notdef.as_slice(), shape.as_slice()]);
    let private = vec![139u8, 20]; // defaultWidthX 0
    let private_offset = charstrings_offset + charstrings.len();

    let mut top_dict = Vec::with_capacity(top_dict_len);
    push_dict_int(&mut top_dict, charstrings_offset as i32);
    top_dict.push(17);
    push_dict_int(&mut top_dict, private.len() as i32);
    push_dict_int(&mut top_dict, private_offset as i32);
    top_dict.push(18);
    debug_assert_eq!(top_dict.len(), top_dict_len);

    let mut out = Vec::new();
    out.extend_from_slice(&header);
    out.extend_from_slice(&name_index);
    out.extend_from_slice(&index(&[top_dict.as_slice()]));
    out.extend_from_slice(&strings);
    out.extend_from_slice(&gsubrs);
    out.extend_from_slice(&charstrings);
    out.extend_from_slice(&private);
    out
}

/// CFF INDEX with one-byte offsets.
fn index(items: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(items.len() as u16).to_be_bytes());
    if items.is_empty() {
        return out;
    }
    out.push(1);
    let mut offset = 1usize;
    out.push(offset as u8);
    for item in items {
        offset += item.len();
        out.push(offset as u8);
    }
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn push_dict_int(out: &mut Vec<u8>, v: i32) {
    out.push(29);
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_charstring_int(out: &mut Vec<u8>, v: i32) {
    match v {
        -107..=107 => out.push((v + 139) as u8),
        108..=1131 => {
            let v = v - 108;
            out.push((v / 256 + 247) as u8);
            out.push((v % 256) as u8);
        }
        -1131..=-108 => {
            let v = -v - 108;
            out.push((v / 256 + 251) as u8);
            out.push((v % 256) as u8);
        }
        _ => {
            out.push(28);
            out.extend_from_slice(&(v as i16).to_be_bytes());
        }
    }
}
