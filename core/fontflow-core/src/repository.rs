//! Font records and the stores that persist them

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detect::FontMetadata;
use crate::error::RepositoryError;
use crate::format::FontFormat;

/// One uploaded font and the storage keys of its renditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontAsset {
    pub id: Uuid,
    pub owner: String,
    /// Display name, the filename as uploaded.
    pub name: String,
    pub family: String,
    pub full_name: String,
    pub postscript_name: String,
    pub style: String,
    pub weight: u16,
    pub manufacturer: String,
    pub license: String,
    #[serde(default)]
    pub designer: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub description: String,
    pub format: FontFormat,
    pub original_file: String,
    pub woff2_file: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything a repository needs to create a [`FontAsset`].
#[derive(Debug, Clone)]
pub struct NewFontAsset {
    pub owner: String,
    pub name: String,
    pub metadata: FontMetadata,
    pub format: FontFormat,
    pub original_file: String,
    pub woff2_file: Option<String>,
}

impl NewFontAsset {
    fn into_asset(self) -> FontAsset {
        let FontMetadata {
            family,
            full_name,
            postscript_name,
            style,
            weight,
            manufacturer,
            license,
            designer,
            version,
            copyright,
            description,
        } = self.metadata;
        FontAsset {
            id: Uuid::new_v4(),
            owner: self.owner,
            name: self.name,
            family,
            full_name,
            postscript_name,
            style,
            weight,
            manufacturer,
            license,
            designer,
            version,
            copyright,
            description,
            format: self.format,
            original_file: self.original_file,
            woff2_file: self.woff2_file,
            created_at: Utc::now(),
        }
    }
}

/// Structured record persistence.
pub trait FontRepository: Send + Sync {
    fn create(&self, new: NewFontAsset) -> Result<FontAsset, RepositoryError>;
    fn find(&self, id: Uuid) -> Result<Option<FontAsset>, RepositoryError>;
    /// The owner's records, newest first.
    fn list_by_owner(&self, owner: &str) -> Result<Vec<FontAsset>, RepositoryError>;
    /// Returns `false` when no record had this id.
    fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;
}

fn newest_first(mut fonts: Vec<FontAsset>) -> Vec<FontAsset> {
    fonts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    fonts
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<Uuid, FontAsset>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FontRepository for MemoryRepository {
    fn create(&self, new: NewFontAsset) -> Result<FontAsset, RepositoryError> {
        let asset = new.into_asset();
        self.records
            .write()
            .map_err(|_| RepositoryError::Poisoned)?
            .insert(asset.id, asset.clone());
        Ok(asset)
    }

    fn find(&self, id: Uuid) -> Result<Option<FontAsset>, RepositoryError> {
        let records = self.records.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(records.get(&id).cloned())
    }

    fn list_by_owner(&self, owner: &str) -> Result<Vec<FontAsset>, RepositoryError> {
        let records = self.records.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(newest_first(
            records
                .values()
                .filter(|f| f.owner == owner)
                .cloned()
                .collect(),
        ))
    }

    fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().map_err(|_| RepositoryError::Poisoned)?;
        Ok(records.remove(&id).is_some())
    }
}

/// Records kept as a pretty-printed JSON array in a single file.
///
/// Every mutation rewrites the whole file through a temporary sibling and a
/// rename, so readers never observe a half-written array.
#[derive(Debug)]
pub struct JsonRepository {
    path: PathBuf,
    records: Mutex<Vec<FontAsset>>,
}

impl JsonRepository {
    /// Load `path`, or start empty when it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(RepositoryError::Io { path, source }),
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &[FontAsset]) -> Result<(), RepositoryError> {
        let io_err = |source| RepositoryError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl FontRepository for JsonRepository {
    fn create(&self, new: NewFontAsset) -> Result<FontAsset, RepositoryError> {
        let asset = new.into_asset();
        let mut records = self.records.lock().map_err(|_| RepositoryError::Poisoned)?;
        records.push(asset.clone());
        if let Err(err) = self.persist(&records) {
            records.pop();
            return Err(err);
        }
        Ok(asset)
    }

    fn find(&self, id: Uuid) -> Result<Option<FontAsset>, RepositoryError> {
        let records = self.records.lock().map_err(|_| RepositoryError::Poisoned)?;
        Ok(records.iter().find(|f| f.id == id).cloned())
    }

    fn list_by_owner(&self, owner: &str) -> Result<Vec<FontAsset>, RepositoryError> {
        let records = self.records.lock().map_err(|_| RepositoryError::Poisoned)?;
        Ok(newest_first(
            records.iter().filter(|f| f.owner == owner).cloned().collect(),
        ))
    }

    fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut records = self.records.lock().map_err(|_| RepositoryError::Poisoned)?;
        let Some(index) = records.iter().position(|f| f.id == id) else {
            return Ok(false);
        };
        let removed = records.remove(index);
        if let Err(err) = self.persist(&records) {
            records.insert(index, removed);
            return Err(err);
        }
        Ok(true)
    }
}
