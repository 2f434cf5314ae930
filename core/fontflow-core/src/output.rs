//! Streaming output helpers for inspection reports

use std::io::Write;

use anyhow::Result;
use serde::Serialize;

/// Write items as a prettified JSON array.
pub fn write_json_pretty<T: Serialize>(items: &[T], mut w: impl Write) -> Result<()> {
    let json = serde_json::to_string_pretty(items)?;
    w.write_all(json.as_bytes())?;
    w.write_all(b"\n")?;
    Ok(())
}

/// Write items as newline-delimited JSON (NDJSON).
pub fn write_ndjson<T: Serialize>(items: &[T], mut w: impl Write) -> Result<()> {
    for item in items {
        let line = serde_json::to_string(item)?;
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{FontMetadata, FontTypeInfo};
    use crate::format::FontFormat;

    fn sample() -> FontTypeInfo {
        FontTypeInfo {
            format: FontFormat::Woff2,
            metadata: FontMetadata {
                family: "A".into(),
                weight: 400,
                ..FontMetadata::default()
            },
        }
    }

    #[test]
    fn ndjson_writes_one_line_per_item() {
        let items = vec![sample(), sample()];
        let mut buf = Vec::new();

        write_ndjson(&items, &mut buf).expect("write ndjson");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: FontTypeInfo = serde_json::from_str(lines[0]).expect("parse");
        assert_eq!(parsed, sample());
    }

    #[test]
    fn pretty_json_is_one_array() {
        let mut buf = Vec::new();
        write_json_pretty(&[sample()], &mut buf).expect("write json");

        let parsed: Vec<FontTypeInfo> = serde_json::from_slice(&buf).expect("parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].format, FontFormat::Woff2);
    }
}
