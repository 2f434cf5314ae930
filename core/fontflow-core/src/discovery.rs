//! Font file discovery for batch inspection and conversion

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use walkdir::WalkDir;

use crate::format::FontFormat;

/// A file whose leading bytes carry a supported font signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFile {
    pub path: PathBuf,
    pub format: FontFormat,
}

/// Trait for enumerating font files from some backing store.
pub trait FontDiscovery {
    fn discover(&self) -> Result<Vec<FontFile>>;
}

/// Recursive filesystem walker that keeps files by signature, not extension.
#[derive(Debug, Clone)]
pub struct PathDiscovery {
    roots: Vec<PathBuf>,
    follow_symlinks: bool,
}

impl PathDiscovery {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots = roots.into_iter().map(Into::into).collect();
        Self {
            roots,
            follow_symlinks: false,
        }
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }
}

impl FontDiscovery for PathDiscovery {
    fn discover(&self) -> Result<Vec<FontFile>> {
        let mut found = Vec::new();

        for root in &self.roots {
            if !root.exists() {
                return Err(anyhow!("root path does not exist: {}", root.display()));
            }

            for entry in WalkDir::new(root).follow_links(self.follow_symlinks) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(format) = sniff_file(entry.path())? {
                    found.push(FontFile {
                        path: entry.path().to_path_buf(),
                        format,
                    });
                }
            }
        }

        Ok(found)
    }
}

fn sniff_file(path: &Path) -> Result<Option<FontFormat>> {
    let mut head = [0u8; 4];
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut filled = 0;
    while filled < head.len() {
        let n = file
            .read(&mut head[filled..])
            .with_context(|| format!("reading {}", path.display()))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(FontFormat::sniff(&head[..filled]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn keeps_files_by_signature() {
        let tmp = tempdir().expect("tempdir");
        let nested = tmp.path().join("a/b");
        fs::create_dir_all(&nested).expect("mkdir");
        let renamed = nested.join("sample.bin");
        fs::write(&renamed, fixtures::truetype_font("Walk Sans", "Regular", 400)).expect("font");
        fs::write(nested.join("fake.ttf"), b"not a font").expect("fake");
        fs::write(nested.join("empty.otf"), b"").expect("empty");

        let fonts = PathDiscovery::new([tmp.path()]).discover().expect("discover");

        assert_eq!(
            fonts,
            vec![FontFile {
                path: renamed,
                format: FontFormat::Ttf
            }]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let missing = tmp.path().join("nope");
        assert!(PathDiscovery::new([missing]).discover().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinks_when_enabled() {
        use std::os::unix::fs::symlink;

        let tmp = tempdir().expect("tempdir");
        let real_dir = tmp.path().join("real");
        let link_dir = tmp.path().join("link");
        fs::create_dir_all(&real_dir).expect("mkdir real");
        fs::write(
            real_dir.join("linked.otf"),
            fixtures::opentype_font("Walk Serif", "Regular", 400),
        )
        .expect("font");
        symlink(&real_dir, &link_dir).expect("symlink");

        let fonts = PathDiscovery::new([&link_dir])
            .follow_symlinks(true)
            .discover()
            .expect("discover");

        assert!(fonts
            .iter()
            .any(|f| f.path.ends_with("linked.otf") && f.format == FontFormat::Otf));
    }
}
