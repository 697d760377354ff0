//! Pipeline that turns a `.map` plus its surrounding content tree into one
//! distributable `.pk3`. The stages mirror how the data flows: discover the
//! layout and asset sources, scan everything in parallel (the map itself,
//! the auxiliary scripts, every reachable shader file, and the base game
//! archives), close the reference graph, then replay the resolved set into
//! the output archive.
//!
//! Types:
//!
//! - `PackOptions` is the full options surface of the tool; the CLI maps
//!   its flags straight onto it.
//! - `PackError` classifies failures for the driver: layout violations and
//!   parse errors are fatal, missing assets are soft unless
//!   `require_all_assets` promotes them, cancellation is its own outcome.
//! - `PackSummary` reports what was (or, on a dry run, would have been)
//!   written.
//!
//! Functions:
//!
//! - `pack` runs the whole pipeline for one map.
mod archive;
mod builtin;
mod index;
mod resolve;

pub use archive::Pk3Writer;
pub use builtin::{index_builtins, BuiltinIndex};
pub use index::{build_index, IndexOptions, IndexedShader, ShaderIndex};
pub use resolve::{resolve, Resolution};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mapscan::{default_parsers, parse_map, run_parser, AuxParser, AuxResource, ScanError};
use pakfs::{
    discover_sources, AssetSource, CancelToken, LayoutError, MapLayout, ResourceName,
    SourceOptions,
};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PackError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("compiled bsp not found next to the map: {0}")]
    MissingBsp(PathBuf),

    #[error("required base archive not found: {0}")]
    MissingBaseArchive(PathBuf),

    #[error("missing required asset: {0}")]
    MissingAsset(ResourceName),

    #[error("output already exists: {0} (pass --overwrite to replace it)")]
    OutputExists(PathBuf),

    #[error("failed to {action}: {path}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive write failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("operation canceled")]
    Canceled,

    #[error("internal error ({0}); please report this as a bug")]
    Internal(&'static str),
}

impl PackError {
    pub fn is_canceled(&self) -> bool {
        match self {
            Self::Canceled => true,
            Self::Scan(error) => error.is_canceled(),
            _ => false,
        }
    }
}

/// Everything that controls one packing run.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    pub map_file: PathBuf,
    /// Output `.pk3` path; a directory means `<map-name>.pk3` inside it,
    /// absent means the working directory.
    pub output: Option<PathBuf>,
    pub overwrite: bool,
    /// Resolve everything, write nothing.
    pub dry_run: bool,
    /// Honor per-source `scripts/shaderlist.txt` allowlists.
    pub use_shaderlist: bool,
    /// Pack the `.map`, dev images, and compile-time model references too.
    pub include_source: bool,
    /// Promote missing assets from warnings to fatal errors.
    pub require_all_assets: bool,
    /// Index loose `.pk3` archives as content sources.
    pub load_archives: bool,
    pub exclude_sources: Vec<String>,
    pub ignore_sources: Vec<String>,
}

#[derive(Debug)]
pub struct PackSummary {
    pub output: PathBuf,
    /// Archive-relative entry names, sorted.
    pub entries: Vec<ResourceName>,
    pub warnings: usize,
    pub dry_run: bool,
}

/// Runs the full pipeline for one map.
pub fn pack(options: &PackOptions, cancel: &CancelToken) -> Result<PackSummary, PackError> {
    let layout = MapLayout::discover(&options.map_file)?;
    info!(
        map = layout.name(),
        root = %layout.map_root().display(),
        "packing map"
    );

    let sources = discover_sources(
        &layout,
        &SourceOptions {
            load_archives: options.load_archives,
            exclude: options.exclude_sources.clone(),
            ignore: options.ignore_sources.clone(),
        },
    )?;

    let index_options = IndexOptions {
        use_shaderlist: options.use_shaderlist,
        include_source: options.include_source,
    };
    let parsers = default_parsers();

    // The map scan is inherently sequential; everything else fans out
    // alongside it.
    let (map_result, (aux_result, (index_result, builtin_result))) = rayon::join(
        || parse_map(layout.map_path(), options.include_source, cancel),
        || {
            rayon::join(
                || collect_aux(&parsers, &layout, cancel),
                || {
                    rayon::join(
                        || build_index(&sources, &index_options, cancel),
                        || index_builtins(layout.et_main(), cancel),
                    )
                },
            )
        },
    );

    let mut assets = map_result?;
    for reference in aux_result? {
        if reference.is_shader {
            assets.shaders.insert(reference.name);
        } else {
            assets.resources.insert(reference.name);
        }
    }
    let index = index_result?;
    let builtin = builtin_result?;

    let resolution = resolve(&assets.shaders, &index, &builtin);
    let has_style_lights = assets.has_style_lights || resolution.has_light_styles();

    let output = resolve_output(options, &layout);
    if options.dry_run {
        info!(output = %output.display(), "dry run; nothing will be written");
    }

    let bsp = layout.bsp_path();
    if !bsp.is_file() {
        return Err(PackError::MissingBsp(bsp));
    }

    let mut packager = Packager {
        sources: &sources,
        builtin: &builtin,
        writer: Pk3Writer::create(&output, options.overwrite, options.dry_run)?,
        require_all: options.require_all_assets,
        warnings: 0,
        cancel,
    };

    let bsp_entry = ResourceName::new(format!("maps/{}.bsp", layout.name()));
    packager.writer.add_file(&bsp_entry, &bsp)?;

    if options.include_source {
        let map_entry = ResourceName::new(format!("maps/{}.map", layout.name()));
        packager.writer.add_file(&map_entry, layout.map_path())?;
    }

    let bsp_mtime = modified(&bsp);
    let lightmaps = collect_lightmaps(&layout)?;
    if !lightmaps.is_empty() {
        let mut stale = false;
        for path in &lightmaps {
            packager.check_cancel()?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or(PackError::Internal("lightmap path without file name"))?;
            let entry = ResourceName::new(format!("maps/{}/{}", layout.name(), file_name));
            packager.writer.add_file(&entry, path)?;
            if bsp_is_newer(path, bsp_mtime) {
                stale = true;
            }
        }
        if stale {
            warn!("lightmaps are older than the compiled bsp; re-run the light stage?");
            packager.warnings += 1;
        }
    }

    for name in &assets.resources {
        packager.add_resource(name)?;
    }

    for indexed in resolution.shaders.values() {
        packager.check_cancel()?;
        let source = &sources[indexed.source];
        packager.add_pinned(&indexed.file, source)?;
        if let Some(implicit) = &indexed.def.implicit_mapping {
            packager.add_texture(implicit)?;
        }
        for resource in &indexed.def.resources {
            if is_texture_reference(resource) {
                packager.add_texture(resource)?;
            } else {
                packager.add_resource(resource)?;
            }
        }
    }

    for name in &resolution.textures {
        packager.add_texture(name)?;
    }

    if has_style_lights && !lightmaps.is_empty() {
        let entry = ResourceName::new(format!("scripts/q3map_{}.shader", layout.name()));
        let path = entry.fs_path(layout.map_root());
        if path.is_file() {
            packager.writer.add_file(&entry, &path)?;
            if bsp_is_newer(&path, bsp_mtime) {
                warn!("style shader is older than the compiled bsp");
                packager.warnings += 1;
            }
        } else {
            warn!(file = %entry, "style lights present but the style shader file is missing");
            packager.warnings += 1;
        }
    }

    let warnings = packager.warnings;
    let entries = packager.writer.finish()?;
    for entry in &entries {
        debug!(entry = %entry, "packed entry");
    }
    info!(
        entries = entries.len(),
        warnings,
        output = %output.display(),
        dry_run = options.dry_run,
        "pack complete"
    );
    Ok(PackSummary {
        output,
        entries,
        warnings,
        dry_run: options.dry_run,
    })
}

fn collect_aux(
    parsers: &[Box<dyn AuxParser>],
    layout: &MapLayout,
    cancel: &CancelToken,
) -> Result<Vec<AuxResource>, ScanError> {
    let collected: Vec<Result<Vec<AuxResource>, ScanError>> = parsers
        .par_iter()
        .map(|parser| run_parser(parser.as_ref(), layout, cancel))
        .collect();
    let mut merged = Vec::new();
    for result in collected {
        merged.extend(result?);
    }
    Ok(merged)
}

fn resolve_output(options: &PackOptions, layout: &MapLayout) -> PathBuf {
    match &options.output {
        Some(path) if path.is_dir() => path.join(format!("{}.pk3", layout.name())),
        Some(path) => path.clone(),
        None => PathBuf::from(format!("{}.pk3", layout.name())),
    }
}

/// `lm_*.tga` files in the map's lightmap directory, name-sorted.
fn collect_lightmaps(layout: &MapLayout) -> Result<Vec<PathBuf>, PackError> {
    let dir = layout.lightmap_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(&dir).map_err(|source| PackError::Io {
        action: "read lightmap directory",
        path: dir.clone(),
        source,
    })?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PackError::Io {
            action: "read lightmap directory",
            path: dir.clone(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if name.starts_with("lm_") && name.ends_with(".tga") && entry.path().is_file() {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn bsp_is_newer(file: &Path, bsp_mtime: Option<SystemTime>) -> bool {
    match (modified(file), bsp_mtime) {
        (Some(file_mtime), Some(bsp_mtime)) => bsp_mtime > file_mtime,
        _ => false,
    }
}

/// Bare names and `.tga`/`.jpg` paths follow the texture fallback rule;
/// everything else resolves verbatim.
fn is_texture_reference(name: &ResourceName) -> bool {
    match name.extension() {
        None => true,
        Some(ext) => ext.eq_ignore_ascii_case("tga") || ext.eq_ignore_ascii_case("jpg"),
    }
}

struct Packager<'a> {
    sources: &'a [AssetSource],
    builtin: &'a BuiltinIndex,
    writer: Pk3Writer,
    require_all: bool,
    warnings: usize,
    cancel: &'a CancelToken,
}

impl Packager<'_> {
    fn check_cancel(&self) -> Result<(), PackError> {
        if self.cancel.is_canceled() {
            Err(PackError::Canceled)
        } else {
            Ok(())
        }
    }

    fn soft(&mut self, name: &ResourceName, message: String) -> Result<(), PackError> {
        if self.require_all {
            return Err(PackError::MissingAsset(name.clone()));
        }
        warn!("{message}");
        self.warnings += 1;
        Ok(())
    }

    /// Excluded sources count as already shipped to the players.
    fn excluded_has(&self, name: &ResourceName) -> bool {
        self.sources
            .iter()
            .any(|source| source.is_excluded() && source.contains(name))
    }

    /// First non-excluded source that has the entry wins; archives are
    /// copied byte-for-byte.
    fn resolve_entry(&mut self, name: &ResourceName) -> Result<bool, PackError> {
        for source in self.sources.iter().filter(|source| !source.is_excluded()) {
            if !source.contains(name) {
                continue;
            }
            if source.is_archive() {
                let bytes = source.read(name).map_err(|error| PackError::Io {
                    action: "read archive entry",
                    path: source.root_path().to_path_buf(),
                    source: error,
                })?;
                self.writer.add_bytes(name, &bytes)?;
            } else {
                self.writer.add_file(name, &name.fs_path(source.root_path()))?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Copies an entry from one specific source, bypassing precedence.
    /// Shader script files must come from the source that won.
    fn add_pinned(&mut self, entry: &ResourceName, source: &AssetSource) -> Result<(), PackError> {
        if self.writer.is_satisfied(entry) {
            return Ok(());
        }
        if source.is_archive() {
            let bytes = source.read(entry).map_err(|error| PackError::Io {
                action: "read archive entry",
                path: source.root_path().to_path_buf(),
                source: error,
            })?;
            self.writer.add_bytes(entry, &bytes)?;
        } else {
            self.writer.add_file(entry, &entry.fs_path(source.root_path()))?;
        }
        Ok(())
    }

    fn add_resource(&mut self, name: &ResourceName) -> Result<(), PackError> {
        self.check_cancel()?;
        if self.writer.is_satisfied(name) {
            return Ok(());
        }
        if self.builtin.contains_resource(name) || self.excluded_has(name) {
            self.writer.mark_satisfied(name.clone());
            return Ok(());
        }
        if self.resolve_entry(name)? {
            return Ok(());
        }
        self.soft(name, format!("missing resource: {name}"))
    }

    /// Texture fallback: extension-less names try `.tga` then `.jpg`; an
    /// explicit extension is looked up as-is. The bare name is marked
    /// satisfied on success so later references short-circuit.
    fn add_texture(&mut self, name: &ResourceName) -> Result<(), PackError> {
        self.check_cancel()?;
        if self.writer.is_satisfied(name) {
            return Ok(());
        }
        let candidates = match name.extension() {
            None => vec![name.with_extension("tga"), name.with_extension("jpg")],
            Some(_) => vec![name.clone()],
        };
        for candidate in &candidates {
            if self.builtin.contains_resource(candidate)
                || self.writer.is_satisfied(candidate)
                || self.excluded_has(candidate)
            {
                self.writer.mark_satisfied(name.clone());
                return Ok(());
            }
        }
        for candidate in &candidates {
            if self.resolve_entry(candidate)? {
                self.writer.mark_satisfied(name.clone());
                return Ok(());
            }
        }
        self.soft(
            name,
            format!("Missing texture reference (no .tga or .jpg found): {name}"),
        )
    }
}
