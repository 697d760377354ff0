//! Case-insensitive, slash-normalized resource names. Everything the engine
//! references (shaders, textures, sounds, archive entries) is addressed by a
//! relative forward-slash path, and two spellings that differ only in case or
//! slash direction are the same resource. `ResourceName` encodes that rule
//! once so parsers, indexes, and the packager never compare raw strings.
//!
//! Types:
//!
//! - `ResourceName` keeps the original spelling for display and archive
//!   entries while comparing, hashing, and ordering case-insensitively.
//! - `ResourceSet` is an insertion-ordered set of names; the packager relies
//!   on insertion order when it replays the map's reference list.
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Insertion-ordered set of resource names.
pub type ResourceSet = indexmap::IndexSet<ResourceName>;

#[derive(Debug, Clone, Default)]
pub struct ResourceName {
    value: String,
}

impl ResourceName {
    pub fn new(value: impl AsRef<str>) -> Self {
        let value = value.as_ref().trim().replace('\\', "/");
        Self { value }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Last path segment (file name).
    pub fn file_name(&self) -> &str {
        self.value.rsplit('/').next().unwrap_or(&self.value)
    }

    /// Last path segment with the extension removed.
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    /// Extension without the dot, if the last segment has one.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < name.len() => Some(&name[idx + 1..]),
            _ => None,
        }
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Replaces the extension, or appends one if there is none.
    pub fn with_extension(&self, ext: &str) -> Self {
        let base = match self.extension() {
            Some(e) => &self.value[..self.value.len() - e.len() - 1],
            None => &self.value,
        };
        Self {
            value: format!("{base}.{ext}"),
        }
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        // Byte-wise so a prefix boundary inside a multibyte char cannot
        // panic; lossy-decoded names may carry arbitrary UTF-8.
        self.value
            .as_bytes()
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
    }

    /// Filesystem location of this resource under `root`.
    pub fn fs_path(&self, root: &Path) -> PathBuf {
        root.join(&self.value)
    }
}

impl PartialEq for ResourceName {
    fn eq(&self, other: &Self) -> bool {
        self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl Eq for ResourceName {}

impl Hash for ResourceName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.value.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl PartialOrd for ResourceName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let lhs = self.value.bytes().map(|b| b.to_ascii_lowercase());
        let rhs = other.value.bytes().map(|b| b.to_ascii_lowercase());
        lhs.cmp(rhs)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for ResourceName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
