//! fontflow-core: font ingestion and web-format normalisation
//!
//! Takes an uploaded font binary, decides what it really is, pulls out the
//! names a font manager cares about, produces a WOFF2 rendition for the web,
//! and keeps both behind signed, expiring URLs.
//!
//! ## Pieces
//!
//! - [`format`] and [`detect`]: signature sniffing and validation. A buffer is
//!   a font because of its bytes, never because of its filename.
//! - [`woff`], [`woff2`], [`truetype`]: container codecs and CFF to TrueType
//!   outline conversion. [`transcode::ensure_woff2`] chains them.
//! - [`storage`] and [`repository`]: the object store and record store
//!   collaborators, each with an in-memory and a filesystem implementation.
//! - [`pipeline::FontLibrary`]: upload, list, delete, all scoped to one owner.
//! - [`css`]: `@font-face` rules for a set of stored fonts.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fontflow_core::{detect_and_validate, ensure_woff2};
//!
//! let bytes = std::fs::read("Inter-Regular.ttf")?;
//! let info = detect_and_validate(&bytes)?;
//! println!("{} {} ({})", info.metadata.family, info.metadata.style, info.format);
//!
//! if let Some(woff2) = ensure_woff2(&bytes, info.format) {
//!     std::fs::write("Inter-Regular.woff2", woff2)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod css;
pub mod detect;
pub mod discovery;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod repository;
pub mod sfnt;
pub mod storage;
pub mod transcode;
pub mod truetype;
pub mod woff;
pub mod woff2;

/// Synthetic fonts for tests and benchmarks.
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use css::{font_face_css, CssOutput, SkippedFont};
pub use detect::{detect_and_validate, FontMetadata, FontTypeInfo};
pub use error::{ConvertError, FontError, PipelineError, RepositoryError, StorageError};
pub use format::FontFormat;
pub use pipeline::{FontLibrary, FontWithPreview, UploadOutcome};
pub use repository::{FontAsset, FontRepository, JsonRepository, MemoryRepository, NewFontAsset};
pub use storage::{FsStore, MemoryStore, ObjectStore};
pub use transcode::ensure_woff2;
