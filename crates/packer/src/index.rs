//! Shader definition index across all asset sources. Every shader file
//! reachable through the source list is parsed in parallel and merged into
//! one map keyed by shader name; when two sources define the same name, the
//! source with the smaller precedence key wins. Losing definitions from
//! non-excluded sources are kept as duplicate diagnostics and logged once
//! the scan finishes.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;

use mapscan::{parse_shader_bytes, ScanError, ShaderDef};
use pakfs::{AssetSource, CancelToken, ResourceName};
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, warn};

/// A shader definition together with where it came from.
#[derive(Debug)]
pub struct IndexedShader {
    pub def: ShaderDef,
    /// Precedence key: index of the defining source in the source list.
    pub source: usize,
    /// Defining script file, relative to the source root.
    pub file: ResourceName,
    /// Definitions from excluded sources subtract but never contribute.
    pub excluded: bool,
}

#[derive(Debug, Default)]
pub struct ShaderIndex {
    shaders: HashMap<ResourceName, IndexedShader>,
    duplicates: HashMap<ResourceName, Vec<String>>,
}

impl ShaderIndex {
    pub fn get(&self, name: &ResourceName) -> Option<&IndexedShader> {
        self.shaders.get(name)
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    pub fn duplicates(&self) -> &HashMap<ResourceName, Vec<String>> {
        &self.duplicates
    }

    fn insert(&mut self, def: ShaderDef, source: usize, file: &ResourceName, excluded: bool) {
        let name = def.name.clone();
        let candidate = IndexedShader {
            source,
            file: file.clone(),
            excluded,
            def,
        };
        match self.shaders.entry(name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
            Entry::Occupied(mut slot) => {
                let both_contribute = !candidate.excluded && !slot.get().excluded;
                let loser = if candidate.source < slot.get().source {
                    let previous = slot.insert(candidate);
                    format!("source #{}: {}", previous.source, previous.file)
                } else {
                    format!("source #{}: {}", candidate.source, candidate.file)
                };
                if both_contribute {
                    self.duplicates.entry(name).or_default().push(loser);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Honor each source's `scripts/shaderlist.txt`.
    pub use_shaderlist: bool,
    /// Keep editor/compiler image references.
    pub include_source: bool,
}

/// Parses every reachable shader file and builds the merged index.
pub fn build_index(
    sources: &[AssetSource],
    options: &IndexOptions,
    cancel: &CancelToken,
) -> Result<ShaderIndex, ScanError> {
    let mut work = Vec::new();
    for (precedence, source) in sources.iter().enumerate() {
        match shader_files_for(source, options) {
            Ok(files) => work.extend(files.into_iter().map(|file| (precedence, file))),
            Err(error) => {
                warn!(source = source.name(), %error, "failed to enumerate shader files");
            }
        }
    }

    let merged = Mutex::new(ShaderIndex::default());
    work.into_par_iter()
        .try_for_each(|(precedence, file)| -> Result<(), ScanError> {
            if cancel.is_canceled() {
                return Err(ScanError::Canceled);
            }
            let source = &sources[precedence];
            let label = format!("{}:{}", source.name(), file);
            let bytes = source
                .read(&file)
                .map_err(|error| ScanError::io(label.clone(), error))?;
            let defs = parse_shader_bytes(bytes, label, options.include_source, cancel)?;
            let mut index = merged.lock();
            for def in defs {
                index.insert(def, precedence, &file, source.is_excluded());
            }
            Ok(())
        })?;

    let index = merged.into_inner();
    for (name, losers) in index.duplicates() {
        warn!(shader = %name, losers = ?losers, "duplicate shader definition");
    }
    debug!(shaders = index.len(), "shader index built");
    Ok(index)
}

/// Shader files of one source after the skip rules: compiler artifacts are
/// dropped, and the shaderlist allowlist applies when configured
/// (`levelshots` always passes).
fn shader_files_for(
    source: &AssetSource,
    options: &IndexOptions,
) -> io::Result<Vec<ResourceName>> {
    let allowlist = if options.use_shaderlist {
        source.shaderlist()
    } else {
        None
    };
    Ok(source
        .shader_files()?
        .into_iter()
        .filter(|file| {
            let stem = file.file_stem().to_ascii_lowercase();
            if stem == "q3shaderscopyforradiant"
                || stem.starts_with("q3map_")
                || stem.starts_with("q3map2_")
            {
                return false;
            }
            if let Some(list) = &allowlist {
                if stem != "levelshots" && !list.iter().any(|allowed| *allowed == stem) {
                    return false;
                }
            }
            true
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn dir_source(root: &Path, files: &[(&str, &str)]) -> AssetSource {
        for (rel, contents) in files {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        AssetSource::directory(root.to_path_buf())
    }

    #[test]
    fn lower_source_index_wins_and_loser_is_recorded() {
        let temp = tempfile::tempdir().unwrap();
        let first = dir_source(
            &temp.path().join("first"),
            &[("scripts/mm.shader", "textures/x\n{\nq3map_remapShader textures/a\n}\n")],
        );
        let second = dir_source(
            &temp.path().join("second"),
            &[("scripts/other.shader", "textures/x\n{\nq3map_remapShader textures/b\n}\n")],
        );

        let sources = [first, second];
        let index =
            build_index(&sources, &IndexOptions::default(), &CancelToken::new()).expect("index");

        let indexed = index.get(&ResourceName::new("textures/x")).expect("definition");
        assert_eq!(indexed.source, 0);
        assert!(indexed.def.shaders.contains(&ResourceName::new("textures/a")));
        assert_eq!(index.duplicates().len(), 1);
    }

    #[test]
    fn excluded_source_conflicts_are_not_diagnosed() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path().join("base.pk3");
        {
            use std::io::Write;
            let file = fs::File::create(&base).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::FileOptions::default();
            zip.start_file("scripts/base.shader", options).unwrap();
            zip.write_all(b"textures/x\n{\n}\n").unwrap();
            zip.finish().unwrap();
        }
        let excluded = AssetSource::archive(base, true).unwrap();
        let user = dir_source(
            &temp.path().join("etmain"),
            &[("scripts/user.shader", "textures/x\n{\n}\n")],
        );

        let sources = [excluded, user];
        let index =
            build_index(&sources, &IndexOptions::default(), &CancelToken::new()).expect("index");

        let indexed = index.get(&ResourceName::new("textures/x")).expect("definition");
        assert!(indexed.excluded, "pak-style source should keep precedence");
        assert!(index.duplicates().is_empty());
    }

    #[test]
    fn shaderlist_filters_files_but_levelshots_pass() {
        let temp = tempfile::tempdir().unwrap();
        let source = dir_source(
            &temp.path().join("etmain"),
            &[
                ("scripts/shaderlist.txt", "listed\n"),
                ("scripts/listed.shader", "textures/listed\n{\n}\n"),
                ("scripts/unlisted.shader", "textures/unlisted\n{\n}\n"),
                ("scripts/levelshots.shader", "levelshots/demo\n{\n}\n"),
                ("scripts/q3map_demo.shader", "textures/generated\n{\n}\n"),
            ],
        );

        let options = IndexOptions {
            use_shaderlist: true,
            ..Default::default()
        };
        let sources = [source];
        let index = build_index(&sources, &options, &CancelToken::new()).expect("index");

        assert!(index.get(&ResourceName::new("textures/listed")).is_some());
        assert!(index.get(&ResourceName::new("levelshots/demo")).is_some());
        assert!(index.get(&ResourceName::new("textures/unlisted")).is_none());
        assert!(index.get(&ResourceName::new("textures/generated")).is_none());
    }
}
