use solescope_core::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Extensions indexed when scanning a category directory.
pub const REFERENCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// The reference image tree: `root/<category>/<slug>/<image>`.
#[derive(Debug, Clone)]
pub struct ReferenceLibrary {
    root: PathBuf,
}

/// One reference image. `source_ref` is the path relative to the library
/// root with `/` separators and is what the index stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub source_ref: String,
    pub path: PathBuf,
}

impl ReferenceLibrary {
    /// Open an existing tree. The root must be a directory.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "reference root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.root.join(category)
    }

    /// Slug directories of a category, sorted.
    pub fn slugs(&self, category: &str) -> Result<Vec<String>> {
        let dir = self.category_dir(category);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut slugs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                slugs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        slugs.sort();
        Ok(slugs)
    }

    /// Every reference image of a category in `slug/filename` order. A
    /// missing category directory yields an empty list.
    pub fn images(&self, category: &str) -> Result<Vec<ReferenceImage>> {
        let mut images = Vec::new();
        for slug in self.slugs(category)? {
            let slug_dir = self.category_dir(category).join(&slug);
            let mut files = Vec::new();
            for entry in fs::read_dir(&slug_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if has_reference_extension(&name) {
                    files.push(name);
                }
            }
            files.sort();
            images.extend(files.into_iter().map(|name| ReferenceImage {
                source_ref: format!("{}/{}/{}", category, slug, name),
                path: slug_dir.join(&name),
            }));
        }
        Ok(images)
    }

    /// Map a client-supplied relative path to a file beneath the root.
    ///
    /// Absolute paths and `..` components are rejected before touching the
    /// filesystem. The canonical result must still lie under the root, which
    /// catches symlinks pointing outside it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let candidate = Path::new(relative);
        if relative.is_empty() {
            return Err(Error::Validation("empty path".to_string()));
        }
        for component in candidate.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::PathEscape(relative.to_string()));
                }
            }
        }

        let joined = self.root.join(candidate);
        let canonical = joined
            .canonicalize()
            .map_err(|_| Error::NotFound(relative.to_string()))?;
        if !canonical.starts_with(&self.root) {
            return Err(Error::PathEscape(relative.to_string()));
        }
        if !canonical.is_file() {
            return Err(Error::NotFound(relative.to_string()));
        }
        Ok(canonical)
    }
}

fn has_reference_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            REFERENCE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
