//! Object storage collaborators
//!
//! The pipeline only sees [`ObjectStore`]. [`FsStore`] keeps objects on disk
//! and hands out signed, expiring URLs; [`MemoryStore`] keeps them in a map
//! and records every mutation so tests can assert on write order.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;

use crate::error::StorageError;

const SIGNING_CONTEXT: &str = "fontflow 2024-06 object url signatures";
const CONTENT_TYPE_DIR: &str = ".content-types";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Put/get/delete plus time-limited read URLs.
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    /// Deleting a missing object is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
    fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Reject keys that could escape a flat namespace.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('.')
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.chars().any(char::is_control);
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Keyed blake3 signatures over `key` and an expiry timestamp.
#[derive(Clone)]
pub struct UrlSigner {
    key: [u8; 32],
}

impl UrlSigner {
    pub fn new(secret: &str) -> Result<Self, StorageError> {
        if secret.is_empty() {
            return Err(StorageError::Signing("signing secret is empty".into()));
        }
        Ok(Self {
            key: blake3::derive_key(SIGNING_CONTEXT, secret.as_bytes()),
        })
    }

    pub fn sign(&self, key: &str, expires: i64) -> String {
        self.digest(key, expires).to_hex().to_string()
    }

    /// `true` when `signature` matches and `expires` is not earlier than `now`.
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        if expires < now {
            return false;
        }
        match blake3::Hash::from_hex(signature) {
            // `Hash` equality is constant-time
            Ok(given) => given == self.digest(key, expires),
            Err(_) => false,
        }
    }

    fn digest(&self, key: &str, expires: i64) -> blake3::Hash {
        blake3::keyed_hash(&self.key, format!("{key}\n{expires}").as_bytes())
    }
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UrlSigner(..)")
    }
}

fn expiry(ttl: Duration) -> i64 {
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    Utc::now().timestamp().saturating_add(ttl)
}

/// Filesystem-backed store serving objects through signed URLs.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    public_base: String,
    signer: UrlSigner,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(
        root: impl Into<PathBuf>,
        public_base: impl Into<String>,
        secret: &str,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        let types = root.join(CONTENT_TYPE_DIR);
        fs::create_dir_all(&types).map_err(|source| StorageError::Io {
            path: types.clone(),
            source,
        })?;
        Ok(Self {
            root,
            public_base: public_base.into().trim_end_matches('/').to_string(),
            signer: UrlSigner::new(secret)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Content type recorded when the object was stored.
    pub fn content_type(&self, key: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        match fs::read_to_string(self.type_path(key)) {
            Ok(value) => Ok(value),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Ok(DEFAULT_CONTENT_TYPE.to_string())
            }
            Err(source) => Err(StorageError::Io {
                path: self.type_path(key),
                source,
            }),
        }
    }

    /// Check a signature produced by [`ObjectStore::signed_url`] at time `now`.
    pub fn verify_signature(&self, key: &str, expires: i64, signature: &str, now: i64) -> bool {
        self.signer.verify(key, expires, signature, now)
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn type_path(&self, key: &str) -> PathBuf {
        self.root.join(CONTENT_TYPE_DIR).join(key)
    }
}

impl ObjectStore for FsStore {
    fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.object_path(key);
        fs::write(&path, data).map_err(|source| StorageError::Io { path, source })?;
        let path = self.type_path(key);
        fs::write(&path, content_type).map_err(|source| StorageError::Io { path, source })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let path = self.object_path(key);
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::Io { path, source },
        })
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        for path in [self.object_path(key), self.type_path(key)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(StorageError::Io { path, source }),
            }
        }
        Ok(())
    }

    fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        validate_key(key)?;
        let expires = expiry(ttl);
        let signature = self.signer.sign(key, expires);
        Ok(format!(
            "{}/objects/{key}?expires={expires}&signature={signature}",
            self.public_base
        ))
    }
}

/// A mutation seen by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put { key: String, content_type: String },
    Delete { key: String },
}

/// In-process store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
    ops: Mutex<Vec<StoreOp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every put/delete so far, oldest first.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .ok()?
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }

    fn record(&self, op: StoreOp) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(op);
        }
    }
}

fn poisoned() -> StorageError {
    StorageError::Io {
        path: PathBuf::from("<memory>"),
        source: io::Error::new(io::ErrorKind::Other, "memory store lock poisoned"),
    }
}

impl ObjectStore for MemoryStore {
    fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.objects
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        self.record(StoreOp::Put {
            key: key.to_string(),
            content_type: content_type.to_string(),
        });
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .map_err(|_| poisoned())?
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.write().map_err(|_| poisoned())?.remove(key);
        self.record(StoreOp::Delete {
            key: key.to_string(),
        });
        Ok(())
    }

    fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(format!("memory://{key}?expires={}", expiry(ttl)))
    }
}
