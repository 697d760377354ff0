//! One asset source: a loose directory (`etmain` or a `.pk3dir`) or a `.pk3`
//! archive. Sources answer the same four questions regardless of backing
//! (does an entry exist, what are its bytes, which shader files do you
//! carry, is there a `shaderlist.txt`), so the scanner and packager never
//! branch on the storage kind.
//!
//! Types:
//!
//! - `AssetSource` wraps the backing store plus its exclusion flag. An
//!   excluded source is indexed for subtraction only and never contributes
//!   content to the output archive.
//!
//! Archive entries are indexed once at open time into a case-insensitive
//! lookup table; the underlying `ZipArchive` handle stays open for the
//! lifetime of the source and is shared behind a mutex because `zip` reads
//! require exclusive access.
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use zip::ZipArchive;

use crate::name::ResourceName;

const SHADERLIST: &str = "scripts/shaderlist.txt";

#[derive(Debug)]
pub struct AssetSource {
    name: String,
    root: PathBuf,
    excluded: bool,
    kind: SourceKind,
}

enum SourceKind {
    Directory,
    Archive {
        zip: Mutex<ZipArchive<File>>,
        entries: HashMap<ResourceName, usize>,
    },
}

impl std::fmt::Debug for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Directory => f.write_str("Directory"),
            SourceKind::Archive { entries, .. } => {
                write!(f, "Archive({} entries)", entries.len())
            }
        }
    }
}

impl AssetSource {
    pub fn directory(root: PathBuf) -> Self {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self {
            name,
            root,
            excluded: false,
            kind: SourceKind::Directory,
        }
    }

    /// Opens a `.pk3` and indexes its entry names. The file handle stays
    /// open until the source is dropped.
    pub fn archive(path: PathBuf, excluded: bool) -> io::Result<Self> {
        let file = File::open(&path)?;
        let mut zip = ZipArchive::new(file).map_err(io::Error::from)?;
        let mut entries = HashMap::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index(index).map_err(io::Error::from)?;
            if entry.is_dir() {
                continue;
            }
            entries.insert(ResourceName::new(entry.name()), index);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            root: path,
            excluded,
            kind: SourceKind::Archive {
                zip: Mutex::new(zip),
                entries,
            },
        })
    }

    /// Directory name or archive file name, for logs and diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory root or archive file path.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn is_archive(&self) -> bool {
        matches!(self.kind, SourceKind::Archive { .. })
    }

    pub fn contains(&self, entry: &ResourceName) -> bool {
        match &self.kind {
            SourceKind::Directory => entry.fs_path(&self.root).is_file(),
            SourceKind::Archive { entries, .. } => entries.contains_key(entry),
        }
    }

    pub fn read(&self, entry: &ResourceName) -> io::Result<Vec<u8>> {
        match &self.kind {
            SourceKind::Directory => fs::read(entry.fs_path(&self.root)),
            SourceKind::Archive { zip, entries } => {
                let index = *entries.get(entry).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{} has no entry {entry}", self.name),
                    )
                })?;
                let mut zip = zip.lock();
                let mut file = zip.by_index(index).map_err(io::Error::from)?;
                let mut buf = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }

    /// Entry names of an archive source; empty for directories. Used by the
    /// built-in content index.
    pub fn entry_names(&self) -> Vec<ResourceName> {
        match &self.kind {
            SourceKind::Directory => Vec::new(),
            SourceKind::Archive { entries, .. } => entries.keys().cloned().collect(),
        }
    }

    /// Shader files directly under `scripts/`, sorted by name.
    pub fn shader_files(&self) -> io::Result<Vec<ResourceName>> {
        let mut files = match &self.kind {
            SourceKind::Directory => {
                let scripts = self.root.join("scripts");
                if !scripts.is_dir() {
                    return Ok(Vec::new());
                }
                let mut found = Vec::new();
                for entry in fs::read_dir(&scripts)? {
                    let entry = entry?;
                    if !entry.file_type()?.is_file() {
                        continue;
                    }
                    let file_name = entry.file_name().to_string_lossy().into_owned();
                    let name = ResourceName::new(format!("scripts/{file_name}"));
                    if name.has_extension("shader") {
                        found.push(name);
                    }
                }
                found
            }
            SourceKind::Archive { entries, .. } => entries
                .keys()
                .filter(|name| {
                    name.starts_with("scripts/")
                        && name.has_extension("shader")
                        && !name.as_str()["scripts/".len()..].contains('/')
                })
                .cloned()
                .collect(),
        };
        files.sort();
        Ok(files)
    }

    /// Lowercased stems from this source's `scripts/shaderlist.txt`, if any.
    pub fn shaderlist(&self) -> Option<Vec<String>> {
        let list = ResourceName::new(SHADERLIST);
        if !self.contains(&list) {
            return None;
        }
        let bytes = self.read(&list).ok()?;
        let text = String::from_utf8_lossy(&bytes);
        Some(
            text.lines()
                .map(|line| match line.find("//") {
                    Some(idx) => line[..idx].trim(),
                    None => line.trim(),
                })
                .filter(|line| !line.is_empty())
                .map(|line| line.to_ascii_lowercase())
                .collect(),
        )
    }
}
