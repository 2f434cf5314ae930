//! `@font-face` stylesheet generation

use std::fmt::{Display, Write as _};

use serde::Serialize;
use uuid::Uuid;

use crate::format::FontFormat;
use crate::repository::FontAsset;

const FALLBACK_FAMILY: &str = "CustomFont";
const FALLBACK_WEIGHT: u16 = 400;

/// Generated stylesheet plus the fonts that could not be included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CssOutput {
    pub css: String,
    pub skipped: Vec<SkippedFont>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFont {
    pub id: Uuid,
    pub reason: String,
}

/// Build one `@font-face` block per font and weight.
///
/// `weights` overrides each font's own weight class when non-empty.
/// `resolve` turns a storage key into the URL written into `src`.
pub fn font_face_css<E, F>(fonts: &[FontAsset], weights: Option<&[u16]>, resolve: F) -> CssOutput
where
    E: Display,
    F: Fn(&str) -> Result<String, E>,
{
    let mut out = CssOutput::default();

    for font in fonts {
        let Some(key) = source_key(font) else {
            log::warn!("font {} has no stored file, leaving it out of the stylesheet", font.id);
            out.skipped.push(SkippedFont {
                id: font.id,
                reason: "no stored file".into(),
            });
            continue;
        };
        let url = match resolve(key) {
            Ok(url) => url,
            Err(err) => {
                log::warn!("cannot resolve url for {key}: {err}");
                out.skipped.push(SkippedFont {
                    id: font.id,
                    reason: format!("url unavailable: {err}"),
                });
                continue;
            }
        };

        let family = escape(family_name(font));
        let style = font_style(&font.style);
        let format = css_format(key);
        let url = escape(&url);
        for weight in weights_for(font, weights) {
            if !out.css.is_empty() {
                out.css.push('\n');
            }
            // writing into a String cannot fail
            let _ = write!(
                out.css,
                "@font-face {{\n  font-family: \"{family}\";\n  font-style: {style};\n  font-weight: {weight};\n  src: url(\"{url}\") format(\"{format}\");\n}}\n"
            );
        }
    }

    out
}

/// WOFF2 rendition when present, else the original upload.
fn source_key(font: &FontAsset) -> Option<&str> {
    font.woff2_file
        .as_deref()
        .filter(|k| !k.is_empty())
        .or(Some(font.original_file.as_str()).filter(|k| !k.is_empty()))
}

fn family_name(font: &FontAsset) -> &str {
    [&font.full_name, &font.family, &font.name]
        .into_iter()
        .map(|name| name.trim())
        .find(|name| !name.is_empty())
        .unwrap_or(FALLBACK_FAMILY)
}

fn font_style(style: &str) -> &'static str {
    let style = style.to_ascii_lowercase();
    if style.contains("italic") || style.contains("oblique") {
        "italic"
    } else {
        "normal"
    }
}

fn css_format(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map_or("", |(_, ext)| ext);
    match FontFormat::from_ext(ext) {
        Some(format @ (FontFormat::Woff | FontFormat::Woff2)) => format.css_format(),
        _ => "truetype",
    }
}

fn weights_for(font: &FontAsset, weights: Option<&[u16]>) -> Vec<u16> {
    match weights {
        Some(list) if !list.is_empty() => list.to_vec(),
        _ if font.weight > 0 => vec![font.weight],
        _ => vec![FALLBACK_WEIGHT],
    }
}

/// Escape a value for a double-quoted CSS string.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn asset(original: &str, woff2: Option<&str>) -> FontAsset {
        FontAsset {
            id: Uuid::new_v4(),
            owner: "alice".into(),
            name: "upload.ttf".into(),
            family: "Fixture Sans".into(),
            full_name: "Fixture Sans Bold".into(),
            postscript_name: "FixtureSans-Bold".into(),
            style: "Bold".into(),
            weight: 700,
            manufacturer: String::new(),
            license: String::new(),
            designer: String::new(),
            version: String::new(),
            copyright: String::new(),
            description: String::new(),
            format: FontFormat::Ttf,
            original_file: original.into(),
            woff2_file: woff2.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn cdn(key: &str) -> Result<String, String> {
        Ok(format!("https://cdn.test/{key}"))
    }

    #[test]
    fn prefers_woff2_rendition() {
        let fonts = [asset("1-a.ttf", Some("1-a.woff2"))];
        let out = font_face_css(&fonts, None, cdn);

        assert!(out.skipped.is_empty());
        assert!(out.css.contains("font-family: \"Fixture Sans Bold\";"));
        assert!(out.css.contains("src: url(\"https://cdn.test/1-a.woff2\") format(\"woff2\");"));
        assert!(out.css.contains("font-weight: 700;"));
        assert!(out.css.contains("font-style: normal;"));
    }

    #[test]
    fn infers_format_from_original_key() {
        let cases = [
            ("1-a.woff", "woff"),
            ("1-a.ttf", "truetype"),
            ("1-a.otf", "truetype"),
            ("1-a", "truetype"),
        ];
        for (key, expected) in cases {
            let out = font_face_css(&[asset(key, None)], None, cdn);
            assert!(out.css.contains(&format!("format(\"{expected}\")")), "{key}: {}", out.css);
        }
    }

    #[test]
    fn emits_one_block_per_requested_weight() {
        let fonts = [asset("1-a.ttf", None)];
        let out = font_face_css(&fonts, Some(&[300, 400, 700]), cdn);
        assert_eq!(out.css.matches("@font-face").count(), 3);
        assert!(out.css.contains("font-weight: 300;"));

        let out = font_face_css(&fonts, Some(&[]), cdn);
        assert_eq!(out.css.matches("@font-face").count(), 1);
        assert!(out.css.contains("font-weight: 700;"));

        let mut weightless = asset("1-a.ttf", None);
        weightless.weight = 0;
        let out = font_face_css(&[weightless], None, cdn);
        assert!(out.css.contains("font-weight: 400;"));
    }

    #[test]
    fn family_falls_back_and_is_escaped() {
        let mut font = asset("1-a.ttf", None);
        font.full_name = String::new();
        font.family = "Quote \"Sans\" \\ Mono".into();
        let out = font_face_css(&[font.clone()], None, cdn);
        assert!(out.css.contains(r#"font-family: "Quote \"Sans\" \\ Mono";"#), "{}", out.css);

        font.family = String::new();
        let out = font_face_css(&[font.clone()], None, cdn);
        assert!(out.css.contains("font-family: \"upload.ttf\";"));

        font.name = String::new();
        let out = font_face_css(&[font], None, cdn);
        assert!(out.css.contains("font-family: \"CustomFont\";"));
    }

    #[test]
    fn italic_and_oblique_styles_are_italic() {
        for style in ["Italic", "Bold Oblique", "light italic"] {
            let mut font = asset("1-a.ttf", None);
            font.style = style.into();
            let out = font_face_css(&[font], None, cdn);
            assert!(out.css.contains("font-style: italic;"), "{style}");
        }
    }

    #[test]
    fn skips_fonts_without_keys_or_urls() {
        let keyless = asset("", None);
        let unresolvable = asset("1-b.ttf", None);
        let fine = asset("1-c.ttf", None);
        let out = font_face_css(
            &[keyless.clone(), unresolvable.clone(), fine],
            None,
            |key: &str| {
                if key == "1-b.ttf" {
                    Err("signing failed")
                } else {
                    Ok(format!("https://cdn.test/{key}"))
                }
            },
        );

        assert_eq!(out.css.matches("@font-face").count(), 1);
        let skipped: Vec<_> = out.skipped.iter().map(|s| s.id).collect();
        assert_eq!(skipped, vec![keyless.id, unresolvable.id]);
    }
}
