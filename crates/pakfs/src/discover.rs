//! Enumerates and orders asset sources for a map. The order is the
//! precedence: when two sources define the same shader, the earlier source
//! wins.
//!
//! 1. `pak0.pk3` in `etmain`, as an excluded pseudo-source, so base-game
//!    definitions always shadow user content.
//! 2. `map_root` (the map's own directory tree).
//! 3. `etmain` itself, when the map lives in a `.pk3dir`.
//! 4. Every other `*.pk3dir` under `etmain`, name-descending.
//! 5. Loose `*.pk3` archives found in the directories above, last,
//!    name-descending; considered only when archive loading is enabled or
//!    per-archive filters are configured.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::layout::{is_pk3dir, LayoutError, MapLayout};
use crate::source::AssetSource;

pub const PAK0: &str = "pak0.pk3";

/// Base archives never indexed as regular content sources; the built-in
/// content index owns them.
const BASE_ARCHIVES: &[&str] = &[PAK0, "sd-mapobjects.pk3"];

#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Index loose `*.pk3` archives as content sources.
    pub load_archives: bool,
    /// Archives indexed for subtraction only (name or stem, any case).
    pub exclude: Vec<String>,
    /// Archives dropped entirely.
    pub ignore: Vec<String>,
}

impl SourceOptions {
    fn considers_archives(&self) -> bool {
        self.load_archives || !self.exclude.is_empty() || !self.ignore.is_empty()
    }
}

/// Builds the ordered source list for `layout`.
pub fn discover_sources(
    layout: &MapLayout,
    options: &SourceOptions,
) -> Result<Vec<AssetSource>, LayoutError> {
    let mut directories = vec![layout.map_root().to_path_buf()];
    if layout.et_main() != layout.map_root() {
        directories.push(layout.et_main().to_path_buf());
    }

    let mut pk3dirs = Vec::new();
    for path in read_dir(layout.et_main())? {
        if path.is_dir() && is_pk3dir(&path) && path != *layout.map_root() {
            pk3dirs.push(path);
        }
    }
    sort_name_descending(&mut pk3dirs);
    directories.extend(pk3dirs);

    let mut archives = Vec::new();
    if options.considers_archives() {
        let mut archive_paths = Vec::new();
        for dir in &directories {
            for path in read_dir(dir)? {
                if path.is_file() && has_extension(&path, "pk3") && !is_base_archive(&path) {
                    archive_paths.push(path);
                }
            }
        }
        sort_name_descending(&mut archive_paths);

        for path in archive_paths {
            let file_name = file_name_lossy(&path);
            if matches_filter(&options.ignore, &file_name) {
                debug!(archive = %file_name, "ignoring archive");
                continue;
            }
            let excluded = matches_filter(&options.exclude, &file_name);
            if !excluded && !options.load_archives {
                continue;
            }
            match AssetSource::archive(path.clone(), excluded) {
                Ok(source) => {
                    debug!(archive = %file_name, excluded, "indexed archive source");
                    archives.push(source);
                }
                Err(error) => {
                    warn!(archive = %path.display(), %error, "skipping unreadable archive");
                }
            }
        }
    }

    let mut sources = Vec::new();
    let pak0_path = layout.et_main().join(PAK0);
    if pak0_path.is_file() {
        match AssetSource::archive(pak0_path.clone(), true) {
            Ok(source) => sources.push(source),
            Err(error) => {
                warn!(archive = %pak0_path.display(), %error, "failed to open pak0.pk3");
            }
        }
    }
    sources.extend(directories.into_iter().map(AssetSource::directory));
    sources.extend(archives);

    debug!(count = sources.len(), "asset sources resolved");
    Ok(sources)
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, LayoutError> {
    let entries = fs::read_dir(dir).map_err(|source| LayoutError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LayoutError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        paths.push(entry.path());
    }
    Ok(paths)
}

fn sort_name_descending(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| {
        let a = file_name_lossy(a).to_ascii_lowercase();
        let b = file_name_lossy(b).to_ascii_lowercase();
        b.cmp(&a)
    });
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn is_base_archive(path: &Path) -> bool {
    let name = file_name_lossy(path).to_ascii_lowercase();
    BASE_ARCHIVES.contains(&name.as_str())
}

/// Filters accept the archive file name with or without the `.pk3` suffix.
fn matches_filter(filters: &[String], file_name: &str) -> bool {
    let stem = file_name
        .strip_suffix(".pk3")
        .or_else(|| file_name.strip_suffix(".PK3"))
        .unwrap_or(file_name);
    filters.iter().any(|filter| {
        filter.eq_ignore_ascii_case(file_name) || filter.eq_ignore_ascii_case(stem)
    })
}
