//! Web-format transcoding: every supported upload ends up as WOFF2 when possible

use std::borrow::Cow;

use crate::error::ConvertError;
use crate::format::FontFormat;
use crate::{truetype, woff, woff2};

const OTTO: u32 = u32::from_be_bytes(*b"OTTO");

/// Produce a WOFF2 rendition of a validated font.
///
/// Returns `None` when no WOFF2 could be produced; the reason is logged and
/// never propagated, since the original upload is still usable.
pub fn ensure_woff2(data: &[u8], format: FontFormat) -> Option<Vec<u8>> {
    match to_woff2(data, format) {
        Ok(out) => Some(out),
        Err(err) => {
            log::warn!("no woff2 produced for {format} source: {err}");
            None
        }
    }
}

fn to_woff2(data: &[u8], format: FontFormat) -> Result<Vec<u8>, ConvertError> {
    let sfnt: Cow<[u8]> = match format {
        FontFormat::Woff2 => return Ok(data.to_vec()),
        FontFormat::Ttf => Cow::Borrowed(data),
        FontFormat::Otf => Cow::Owned(truetype::otf_to_ttf(data)?),
        FontFormat::Woff => {
            let decoded = woff::decode(data)?;
            if decoded.get(..4) == Some(&OTTO.to_be_bytes()[..]) {
                Cow::Owned(truetype::otf_to_ttf(&decoded)?)
            } else {
                Cow::Owned(decoded)
            }
        }
    };
    woff2::encode(&sfnt)
}
