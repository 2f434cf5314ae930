//! CFF to TrueType outline conversion
//!
//! Browsers accept CFF-flavoured WOFF2, but the encoder here only ever emits
//! `glyf`-based fonts, so OpenType/CFF sources are first redrawn as quadratic
//! TrueType outlines.

use std::borrow::Cow;

use kurbo::{CubicBez, Point};
use rayon::prelude::*;
use skrifa::instance::{LocationRef, Size};
use skrifa::outline::{DrawSettings, OutlinePen};
use skrifa::raw::TableProvider;
use skrifa::{GlyphId, MetadataProvider};
use read_fonts::tables::glyf::CurvePoint;
use write_fonts::tables::glyf::{Contour, GlyfLocaBuilder, SimpleGlyph};
use write_fonts::tables::loca::LocaFormat;
use write_fonts::types::Tag as WriteTag;
use write_fonts::FontBuilder;

use crate::error::ConvertError;
use crate::sfnt::SfntTables;

/// Maximum distance, in font units, between a cubic and its quadratic approximation.
const QUAD_TOLERANCE: f64 = 1.0;
const TRUETYPE_FLAVOR: u32 = 0x0001_0000;
const HEAD_CHECKSUM_ADJUSTMENT: usize = 8;
const HEAD_INDEX_TO_LOC_FORMAT: usize = 50;
const HEAD_MIN_LEN: usize = 54;
const DROPPED_TABLES: [&[u8; 4]; 6] = [b"CFF ", b"CFF2", b"VORG", b"DSIG", b"glyf", b"loca"];

/// Rebuild an OpenType/CFF font as TrueType, keeping every non-outline table.
pub fn otf_to_ttf(data: &[u8]) -> Result<Vec<u8>, ConvertError> {
    let source = SfntTables::read(data)?;
    if source.get(b"CFF2").is_some() {
        return Err(ConvertError::Unsupported("CFF2 outlines"));
    }
    if source.get(b"CFF ").is_none() {
        return Err(ConvertError::Malformed("no CFF table".into()));
    }
    let head = source
        .get(b"head")
        .filter(|head| head.len() >= HEAD_MIN_LEN)
        .ok_or_else(|| ConvertError::Malformed("missing or short head table".into()))?;

    let font = skrifa::FontRef::new(data).map_err(|e| ConvertError::Malformed(e.to_string()))?;
    let num_glyphs = font
        .maxp()
        .map_err(|e| ConvertError::Malformed(format!("maxp: {e}")))?
        .num_glyphs();

    let glyphs = (0..u32::from(num_glyphs))
        .into_par_iter()
        .map_init(|| font.outline_glyphs(), |outlines, gid| draw_glyph(outlines, gid))
        .collect::<Result<Vec<_>, _>>()?;

    let mut builder = GlyfLocaBuilder::new();
    let mut max_points = 0usize;
    let mut max_contours = 0usize;
    for (gid, glyph) in glyphs.iter().enumerate() {
        max_points = max_points.max(glyph.contours.iter().map(Contour::len).sum());
        max_contours = max_contours.max(glyph.contours.len());
        builder.add_glyph(glyph).map_err(|e| ConvertError::Glyph {
            glyph: gid as u32,
            reason: e.to_string(),
        })?;
    }
    let (glyf, loca, loca_format) = builder.build();

    let mut head = head.to_vec();
    head[HEAD_CHECKSUM_ADJUSTMENT..HEAD_CHECKSUM_ADJUSTMENT + 4].fill(0);
    let index_to_loc: i16 = match loca_format {
        LocaFormat::Short => 0,
        LocaFormat::Long => 1,
    };
    head[HEAD_INDEX_TO_LOC_FORMAT..HEAD_INDEX_TO_LOC_FORMAT + 2]
        .copy_from_slice(&index_to_loc.to_be_bytes());
    let maxp = truetype_maxp(num_glyphs, max_points, max_contours);

    let mut out = FontBuilder::new();
    for table in &source.tables {
        if DROPPED_TABLES.contains(&&table.tag) {
            continue;
        }
        let data: Cow<[u8]> = match &table.tag {
            b"head" => Cow::Owned(head.clone()),
            b"maxp" => Cow::Owned(maxp.clone()),
            _ => Cow::Borrowed(table.data.as_ref()),
        };
        out.add_raw(WriteTag::new(&table.tag), data);
    }
    out.add_table(&glyf)
        .and_then(|out| out.add_table(&loca))
        .map_err(|e| ConvertError::Compile(e.to_string()))?;
    let ttf = out.build();

    // the result must read back as a TrueType font
    let check = SfntTables::read(&ttf)?;
    if check.flavor != TRUETYPE_FLAVOR || check.get(b"glyf").is_none() {
        return Err(ConvertError::Compile("converted font has no glyf table".into()));
    }
    log::debug!(
        "converted {} CFF glyphs to TrueType ({} bytes)",
        num_glyphs,
        ttf.len()
    );
    Ok(ttf)
}

fn draw_glyph(
    outlines: &skrifa::outline::OutlineGlyphCollection,
    gid: u32,
) -> Result<SimpleGlyph, ConvertError> {
    let Some(outline) = outlines.get(GlyphId::new(gid)) else {
        return Ok(SimpleGlyph::default());
    };
    let mut pen = QuadPen::default();
    outline
        .draw(
            DrawSettings::unhinted(Size::unscaled(), LocationRef::default()),
            &mut pen,
        )
        .map_err(|e| ConvertError::Glyph {
            glyph: gid,
            reason: e.to_string(),
        })?;

    let mut glyph = SimpleGlyph {
        bbox: Default::default(),
        contours: pen.finish(),
        instructions: vec![],
    };
    glyph.recompute_bounding_box();
    Ok(glyph)
}

/// Build a version 1.0 `maxp` for quadratic outlines without hinting.
fn truetype_maxp(num_glyphs: u16, max_points: usize, max_contours: usize) -> Vec<u8> {
    let clamp = |v: usize| u16::try_from(v).unwrap_or(u16::MAX);
    let mut maxp = Vec::with_capacity(32);
    maxp.extend_from_slice(&TRUETYPE_FLAVOR.to_be_bytes());
    maxp.extend_from_slice(&num_glyphs.to_be_bytes());
    maxp.extend_from_slice(&clamp(max_points).to_be_bytes());
    maxp.extend_from_slice(&clamp(max_contours).to_be_bytes());
    // maxCompositePoints, maxCompositeContours
    maxp.extend_from_slice(&[0; 4]);
    // maxZones
    maxp.extend_from_slice(&1u16.to_be_bytes());
    // maxTwilightPoints through maxComponentDepth
    maxp.extend_from_slice(&[0; 16]);
    maxp
}

/// Collects an outline as quadratic contours, splitting cubics as they arrive.
#[derive(Default)]
struct QuadPen {
    contours: Vec<Vec<(Point, bool)>>,
    current: Vec<(Point, bool)>,
}

impl QuadPen {
    fn last_point(&self) -> Point {
        self.current.last().map_or(Point::ZERO, |(p, _)| *p)
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.contours.push(std::mem::take(&mut self.current));
        }
    }

    /// Round, close and flip every contour into TrueType (clockwise) order.
    fn finish(mut self) -> Vec<Contour> {
        self.flush();
        self.contours
            .into_iter()
            .filter_map(|points| {
                let mut points: Vec<CurvePoint> = points
                    .into_iter()
                    .map(|(p, on_curve)| {
                        CurvePoint::new(p.x.round() as i16, p.y.round() as i16, on_curve)
                    })
                    .collect();
                // an explicit closing point duplicates the start
                if points.len() > 1 && points.first() == points.last() {
                    points.pop();
                }
                if points.is_empty() {
                    return None;
                }
                points[1..].reverse();
                Some(Contour::from(points))
            })
            .collect()
    }
}

impl OutlinePen for QuadPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.flush();
        self.current.push((point(x, y), true));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.current.push((point(x, y), true));
    }

    fn quad_to(&mut self, cx0: f32, cy0: f32, x: f32, y: f32) {
        self.current.push((point(cx0, cy0), false));
        self.current.push((point(x, y), true));
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        let cubic = CubicBez::new(
            self.last_point(),
            point(cx0, cy0),
            point(cx1, cy1),
            point(x, y),
        );
        for (_, _, quad) in cubic.to_quads(QUAD_TOLERANCE) {
            self.current.push((quad.p1, false));
            self.current.push((quad.p2, true));
        }
    }

    fn close(&mut self) {
        self.flush();
    }
}

fn point(x: f32, y: f32) -> Point {
    Point::new(f64::from(x), f64::from(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    /// Sum of the font as big-endian u32 words, zero padded.
    fn whole_font_checksum(font: &[u8]) -> u32 {
        font.chunks(4).fold(0u32, |sum, chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            sum.wrapping_add(u32::from_be_bytes(word))
        })
    }

    #[test]
    fn converts_cff_font_to_truetype() {
        let otf = fixtures::opentype_font("Cubic Serif", "Regular", 400);
        let ttf = otf_to_ttf(&otf).expect("convert");

        let tables = SfntTables::read(&ttf).expect("read converted");
        assert_eq!(tables.flavor, TRUETYPE_FLAVOR);
        assert!(tables.get(b"CFF ").is_none());
        assert!(tables.get(b"glyf").is_some());
        assert!(tables.get(b"loca").is_some());
        assert_eq!(tables.get(b"name"), SfntTables::read(&otf).unwrap().get(b"name"));

        let maxp = tables.get(b"maxp").expect("maxp");
        assert_eq!(maxp.len(), 32);
        assert_eq!(&maxp[..6], &[0, 1, 0, 0, 0, 2]);
        assert_eq!(whole_font_checksum(&ttf), 0xB1B0_AFBA);

        // the notdef is empty, the second glyph carries the outline
        let outlines = skrifa::FontRef::new(&ttf).expect("parse").outline_glyphs();
        let mut pen = QuadPen::default();
        outlines
            .get(GlyphId::new(1))
            .expect("glyph 1")
            .draw(
                DrawSettings::unhinted(Size::unscaled(), LocationRef::default()),
                &mut pen,
            )
            .expect("draw glyph 1");
        assert!(!pen.finish().is_empty());
    }

    #[test]
    fn pen_reverses_contours_and_drops_closing_point() {
        let mut pen = QuadPen::default();
        pen.move_to(0.0, 0.0);
        pen.line_to(0.0, 100.0);
        pen.line_to(100.0, 100.0);
        pen.line_to(0.0, 0.0);
        pen.close();

        let contours = pen.finish();
        assert_eq!(contours.len(), 1);
        let points: Vec<_> = contours[0].iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(points, vec![(0, 0), (100, 100), (0, 100)]);
    }

    #[test]
    fn pen_splits_cubics_into_quadratics() {
        let mut pen = QuadPen::default();
        pen.move_to(0.0, 0.0);
        pen.curve_to(0.0, 300.0, 300.0, 300.0, 300.0, 0.0);
        pen.close();

        let contours = pen.finish();
        let points: Vec<_> = contours[0].iter().collect();
        assert!(points.iter().any(|p| !p.on_curve));
        assert!(points.iter().all(|p| p.y >= 0 && p.y <= 300));
        assert!(points.contains(&&CurvePoint::new(300, 0, true)));
    }

    #[test]
    fn rejects_fonts_without_cff() {
        let ttf = fixtures::truetype_font("Quad Sans", "Regular", 400);
        assert!(matches!(otf_to_ttf(&ttf), Err(ConvertError::Malformed(_))));
    }
}
