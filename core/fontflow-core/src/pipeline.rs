//! Upload orchestration: detect, store, transcode, record
//!
//! [`FontLibrary`] sequences the detector, the object store, the transcoder
//! and the record store. Objects are always written before the record that
//! points at them, and a record is only removed after its objects are gone.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::detect::detect_and_validate;
use crate::error::{PipelineError, StorageError};
use crate::format::FontFormat;
use crate::repository::{FontAsset, FontRepository, NewFontAsset};
use crate::storage::ObjectStore;
use crate::transcode::ensure_woff2;

/// Lifetime of preview and stylesheet URLs unless configured otherwise.
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(3600);
const MAX_NAME_CHARS: usize = 150;
const FALLBACK_NAME: &str = "font";

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub font: FontAsset,
    /// Set when the font was stored without a WOFF2 rendition.
    pub warning: Option<String>,
}

/// A record as listed to its owner, with a temporary download link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FontWithPreview {
    #[serde(flatten)]
    pub font: FontAsset,
    pub preview_url: Option<String>,
}

pub struct FontLibrary {
    store: Arc<dyn ObjectStore>,
    repository: Arc<dyn FontRepository>,
    url_ttl: Duration,
}

impl FontLibrary {
    pub fn new(store: Arc<dyn ObjectStore>, repository: Arc<dyn FontRepository>) -> Self {
        Self {
            store,
            repository,
            url_ttl: DEFAULT_URL_TTL,
        }
    }

    pub fn with_url_ttl(mut self, ttl: Duration) -> Self {
        self.url_ttl = ttl;
        self
    }

    pub fn url_ttl(&self) -> Duration {
        self.url_ttl
    }

    /// Validate, store and record one uploaded font for `owner`.
    pub fn upload(
        &self,
        owner: &str,
        filename: &str,
        data: Option<&[u8]>,
    ) -> Result<UploadOutcome, PipelineError> {
        let data = data
            .filter(|d| !d.is_empty())
            .ok_or(PipelineError::NoFileProvided)?;
        let info = detect_and_validate(data)?;

        let original_key = storage_key(Utc::now().timestamp_millis(), filename, info.format);
        self.store.put(&original_key, data, info.mime())?;

        let mut warning = None;
        let woff2_file = match ensure_woff2(data, info.format) {
            // the upload already is the web rendition
            Some(_) if info.format == FontFormat::Woff2 => Some(original_key.clone()),
            Some(woff2) => {
                let key = woff2_key(&original_key);
                if let Err(err) = self.store.put(&key, &woff2, FontFormat::Woff2.mime()) {
                    self.discard(&[original_key.as_str()]);
                    return Err(err.into());
                }
                Some(key)
            }
            None => {
                warning = Some(format!(
                    "font stored without a WOFF2 version: {} conversion failed",
                    info.format
                ));
                None
            }
        };

        let created = self.repository.create(NewFontAsset {
            owner: owner.to_string(),
            name: display_name(filename),
            metadata: info.metadata,
            format: info.format,
            original_file: original_key.clone(),
            woff2_file: woff2_file.clone(),
        });
        let font = match created {
            Ok(font) => font,
            Err(err) => {
                log::error!("recording upload {original_key} failed: {err}");
                let mut keys = vec![original_key.as_str()];
                keys.extend(woff2_file.as_deref().filter(|k| *k != original_key));
                self.discard(&keys);
                return Err(err.into());
            }
        };

        log::info!(
            "stored {} for {owner}: {} ({}, woff2: {})",
            font.id,
            font.original_file,
            font.format,
            font.woff2_file.as_deref().unwrap_or("none")
        );
        Ok(UploadOutcome { font, warning })
    }

    /// The owner's fonts, newest first, each with a signed preview URL.
    pub fn list(&self, owner: &str) -> Result<Vec<FontWithPreview>, PipelineError> {
        let fonts = self.repository.list_by_owner(owner)?;
        Ok(fonts
            .into_iter()
            .map(|font| {
                let preview_url = match self.object_url(&font.original_file) {
                    Ok(url) => Some(url),
                    Err(err) => {
                        log::warn!("no preview url for {}: {err}", font.id);
                        None
                    }
                };
                FontWithPreview { font, preview_url }
            })
            .collect())
    }

    /// Remove a font's objects, then its record.
    pub fn delete(&self, owner: &str, id: Uuid) -> Result<FontAsset, PipelineError> {
        let font = self.owned(owner, id)?;

        self.store.delete(&font.original_file)?;
        if let Some(woff2) = font.woff2_file.as_deref() {
            if woff2 != font.original_file {
                self.store.delete(woff2)?;
            }
        }
        self.repository.delete(font.id)?;

        log::info!("deleted {} for {owner}", font.id);
        Ok(font)
    }

    /// Load the owner's fonts in the requested order for stylesheet generation.
    ///
    /// Unknown ids and fonts owned by someone else are skipped.
    pub fn fonts_for_css(&self, owner: &str, ids: &[Uuid]) -> Result<Vec<FontAsset>, PipelineError> {
        let mut fonts = Vec::with_capacity(ids.len());
        for id in ids {
            match self.owned(owner, *id) {
                Ok(font) => fonts.push(font),
                Err(PipelineError::NotFound | PipelineError::Forbidden) => {
                    log::warn!("skipping font {id} for {owner}: not in their library");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(fonts)
    }

    /// Signed URL for an object, valid for the configured TTL.
    pub fn object_url(&self, key: &str) -> Result<String, StorageError> {
        self.store.signed_url(key, self.url_ttl)
    }

    fn owned(&self, owner: &str, id: Uuid) -> Result<FontAsset, PipelineError> {
        let font = self.repository.find(id)?.ok_or(PipelineError::NotFound)?;
        if font.owner != owner {
            return Err(PipelineError::Forbidden);
        }
        Ok(font)
    }

    /// Best-effort removal of objects whose upload could not be completed.
    fn discard(&self, keys: &[&str]) {
        for key in keys {
            if let Err(err) = self.store.delete(key) {
                log::error!("could not remove orphaned object {key}: {err}");
            }
        }
    }
}

/// Storage key of an original upload.
///
/// A millisecond timestamp and a random fragment keep concurrent uploads of
/// the same name apart. The extension always comes from the detected format,
/// never from the uploaded filename.
pub fn storage_key(unix_millis: i64, filename: &str, format: FontFormat) -> String {
    let name = sanitize_filename(filename);
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name.as_str(),
    };
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{unix_millis}-{}-{stem}.{}", &nonce[..8], format.ext())
}

/// Key of the WOFF2 rendition stored next to `original_key`.
pub fn woff2_key(original_key: &str) -> String {
    let stem = original_key
        .rsplit_once('.')
        .map_or(original_key, |(stem, _)| stem);
    format!("{stem}.woff2")
}

/// Reduce an uploaded filename to letters, digits, `.`, `_` and `-`.
///
/// Directory components are dropped, every other run of characters becomes
/// a single `-`, and dot runs collapse so the result never contains `..`.
pub fn sanitize_filename(filename: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    static DOTS: OnceLock<Regex> = OnceLock::new();
    let unsafe_runs = UNSAFE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}._-]+").expect("valid regex"));
    let dot_runs = DOTS.get_or_init(|| Regex::new(r"\.{2,}").expect("valid regex"));

    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let replaced = unsafe_runs.replace_all(base, "-");
    let collapsed = dot_runs.replace_all(&replaced, ".");
    let trimmed = collapsed.trim_matches(['-', '.']);
    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }
    trimmed.chars().take(MAX_NAME_CHARS).collect()
}

fn display_name(filename: &str) -> String {
    let name = filename.trim();
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}
