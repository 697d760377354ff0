//! Built-in content index. The base game archives (`pak0.pk3`, optionally
//! `sd-mapobjects.pk3`, and the newest `etjump-*.pk3` from a sibling
//! `etjump_stable/` install) are read once; their shader names and entry
//! paths form the subtraction set. Anything listed here already ships with
//! the game and must never end up in the output archive.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use mapscan::{parse_shader_bytes, ScanError};
use pakfs::{AssetSource, CancelToken, ResourceName, PAK0};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::PackError;

#[derive(Debug, Default)]
pub struct BuiltinIndex {
    pub shaders: HashSet<ResourceName>,
    pub resources: HashSet<ResourceName>,
}

impl BuiltinIndex {
    pub fn contains_shader(&self, name: &ResourceName) -> bool {
        self.shaders.contains(name)
    }

    pub fn contains_resource(&self, name: &ResourceName) -> bool {
        self.resources.contains(name)
    }

    fn merge(&mut self, other: BuiltinIndex) {
        self.shaders.extend(other.shaders);
        self.resources.extend(other.resources);
    }
}

/// Indexes every configured base archive. `pak0.pk3` is mandatory; the rest
/// are picked up when present.
pub fn index_builtins(et_main: &Path, cancel: &CancelToken) -> Result<BuiltinIndex, PackError> {
    let pak0 = et_main.join(PAK0);
    if !pak0.is_file() {
        return Err(PackError::MissingBaseArchive(pak0));
    }

    let mut archives = vec![pak0];
    let mapobjects = et_main.join("sd-mapobjects.pk3");
    if mapobjects.is_file() {
        archives.push(mapobjects);
    }
    if let Some(etjump) = newest_etjump(et_main) {
        archives.push(etjump);
    }

    let indexed: Vec<Result<BuiltinIndex, PackError>> = archives
        .into_par_iter()
        .map(|path| index_archive(&path, cancel))
        .collect();

    let mut merged = BuiltinIndex::default();
    for index in indexed {
        merged.merge(index?);
    }
    debug!(
        shaders = merged.shaders.len(),
        resources = merged.resources.len(),
        "built-in content indexed"
    );
    Ok(merged)
}

fn index_archive(path: &Path, cancel: &CancelToken) -> Result<BuiltinIndex, PackError> {
    let source =
        AssetSource::archive(path.to_path_buf(), true).map_err(|source| PackError::Io {
            action: "open base archive",
            path: path.to_path_buf(),
            source,
        })?;

    let mut index = BuiltinIndex::default();
    for entry in source.entry_names() {
        if cancel.is_canceled() {
            return Err(PackError::Canceled);
        }
        if entry.starts_with("scripts/") && entry.has_extension("shader") {
            let label = format!("{}:{}", source.name(), entry);
            let parsed = source
                .read(&entry)
                .map_err(|error| ScanError::io(label.clone(), error))
                .and_then(|bytes| parse_shader_bytes(bytes, label, false, cancel));
            match parsed {
                Ok(defs) => {
                    for def in defs {
                        index.shaders.insert(def.name);
                    }
                }
                Err(error) if error.is_canceled() => return Err(PackError::Canceled),
                Err(error) => {
                    // Base content is not ours to fix; note it and move on.
                    warn!(%error, "skipping unparsable base shader file");
                }
            }
        } else {
            index.resources.insert(entry);
        }
    }
    debug!(archive = source.name(), "base archive indexed");
    Ok(index)
}

/// Newest `etjump-*.pk3` under the sibling `etjump_stable/` directory, by
/// case-insensitive name.
fn newest_etjump(et_main: &Path) -> Option<PathBuf> {
    let dir = et_main.parent()?.join("etjump_stable");
    let mut best: Option<(String, PathBuf)> = None;
    for entry in fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if !path.is_file() || !name.starts_with("etjump-") || !name.ends_with(".pk3") {
            continue;
        }
        if best.as_ref().map(|(b, _)| name > *b).unwrap_or(true) {
            best = Some((name, path));
        }
    }
    best.map(|(_, path)| path)
}
