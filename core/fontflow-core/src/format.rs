//! Container signature sniffing for fontflow-core

use std::fmt;

use serde::{Deserialize, Serialize};

/// `00 01 00 00`, the TrueType sfnt version.
const TRUETYPE_SIG: [u8; 4] = [0x00, 0x01, 0x00, 0x00];
/// Legacy Apple TrueType sfnt version.
const APPLE_TRUE_SIG: [u8; 4] = *b"true";
const OPENTYPE_CFF_SIG: [u8; 4] = *b"OTTO";
const WOFF_SIG: [u8; 4] = *b"wOFF";
const WOFF2_SIG: [u8; 4] = *b"wOF2";

/// Font container formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFormat {
    Ttf,
    Otf,
    Woff,
    Woff2,
}

impl FontFormat {
    /// Identify a container from its leading bytes.
    ///
    /// Filenames and declared content types are never consulted; a buffer
    /// shorter than four bytes, a font collection (`ttcf`) or anything else
    /// without a known signature yields `None`.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        let head: [u8; 4] = data.get(..4)?.try_into().ok()?;
        match head {
            TRUETYPE_SIG | APPLE_TRUE_SIG => Some(Self::Ttf),
            OPENTYPE_CFF_SIG => Some(Self::Otf),
            WOFF_SIG => Some(Self::Woff),
            WOFF2_SIG => Some(Self::Woff2),
            _ => None,
        }
    }

    pub fn ext(self) -> &'static str {
        match self {
            Self::Ttf => "ttf",
            Self::Otf => "otf",
            Self::Woff => "woff",
            Self::Woff2 => "woff2",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Ttf => "font/ttf",
            Self::Otf => "font/otf",
            Self::Woff => "font/woff",
            Self::Woff2 => "font/woff2",
        }
    }

    /// Token used inside a CSS `src: url(...) format("...")` descriptor.
    pub fn css_format(self) -> &'static str {
        match self {
            Self::Ttf => "truetype",
            Self::Otf => "opentype",
            Self::Woff => "woff",
            Self::Woff2 => "woff2",
        }
    }

    /// Parse a lowercase extension such as `ttf` or `woff2`.
    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ttf" => Some(Self::Ttf),
            "otf" => Some(Self::Otf),
            "woff" => Some(Self::Woff),
            "woff2" => Some(Self::Woff2),
            _ => None,
        }
    }
}

impl fmt::Display for FontFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ext())
    }
}
