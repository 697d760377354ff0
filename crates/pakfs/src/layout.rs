//! Locates a map inside the game's content layout. A packable map must live
//! at `<etmain>/maps/<name>.map` or `<etmain>/<mod>.pk3dir/maps/<name>.map`;
//! anything else is rejected before any parsing starts. The discovered
//! layout pins down the two directories every later stage keys off:
//! `map_root` (the directory one level above `maps/`) and `et_main` itself.
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("map file not found: {0}")]
    MapMissing(PathBuf),

    #[error("not a .map file: {0}")]
    NotAMap(PathBuf),

    #[error("map must live under <etmain>/maps/ or <etmain>/<mod>.pk3dir/maps/: {0}")]
    OutsideMaps(PathBuf),

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct MapLayout {
    name: String,
    path: PathBuf,
    et_main: PathBuf,
    map_root: PathBuf,
}

impl MapLayout {
    /// Resolves the layout from a `.map` path, validating the directory
    /// shape along the way.
    pub fn discover(map_file: &Path) -> Result<Self, LayoutError> {
        let path = map_file
            .canonicalize()
            .map_err(|_| LayoutError::MapMissing(map_file.to_path_buf()))?;
        if !path.is_file() {
            return Err(LayoutError::MapMissing(path));
        }
        if !matches_ignore_case(path.extension(), "map") {
            return Err(LayoutError::NotAMap(path));
        }

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| LayoutError::NotAMap(path.clone()))?;

        let maps_dir = path
            .parent()
            .filter(|dir| matches_ignore_case(dir.file_name(), "maps"))
            .ok_or_else(|| LayoutError::OutsideMaps(path.clone()))?;
        let map_root = maps_dir
            .parent()
            .ok_or_else(|| LayoutError::OutsideMaps(path.clone()))?;

        let et_main = if is_named(map_root, "etmain") {
            map_root.to_path_buf()
        } else if is_pk3dir(map_root) {
            map_root
                .parent()
                .filter(|dir| is_named(dir, "etmain"))
                .ok_or_else(|| LayoutError::OutsideMaps(path.clone()))?
                .to_path_buf()
        } else {
            return Err(LayoutError::OutsideMaps(path));
        };

        Ok(Self {
            name,
            et_main,
            map_root: map_root.to_path_buf(),
            path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the `.map` source.
    pub fn map_path(&self) -> &Path {
        &self.path
    }

    pub fn et_main(&self) -> &Path {
        &self.et_main
    }

    /// One level above `maps/`; either `et_main` itself or a `.pk3dir`.
    pub fn map_root(&self) -> &Path {
        &self.map_root
    }

    /// The compiled BSP sits next to the map source.
    pub fn bsp_path(&self) -> PathBuf {
        self.path.with_extension("bsp")
    }

    /// External lightmaps live in a directory named after the map.
    pub fn lightmap_dir(&self) -> PathBuf {
        self.path
            .parent()
            .expect("map path always has a parent")
            .join(&self.name)
    }
}

fn matches_ignore_case(component: Option<&std::ffi::OsStr>, expected: &str) -> bool {
    component
        .map(|c| c.to_string_lossy().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn is_named(dir: &Path, expected: &str) -> bool {
    matches_ignore_case(dir.file_name(), expected)
}

pub(crate) fn is_pk3dir(dir: &Path) -> bool {
    dir.file_name()
        .map(|n| {
            n.to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(".pk3dir")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn discovers_map_directly_under_etmain() {
        let temp = tempfile::tempdir().unwrap();
        let map = temp.path().join("etmain/maps/oasis.map");
        touch(&map);

        let layout = MapLayout::discover(&map).expect("layout");
        assert_eq!(layout.name(), "oasis");
        assert!(is_named(layout.et_main(), "etmain"));
        assert_eq!(layout.map_root(), layout.et_main());
        assert!(layout.bsp_path().ends_with("maps/oasis.bsp"));
    }

    #[test]
    fn discovers_map_inside_pk3dir() {
        let temp = tempfile::tempdir().unwrap();
        let map = temp.path().join("etmain/mymod.pk3dir/maps/oasis.map");
        touch(&map);

        let layout = MapLayout::discover(&map).expect("layout");
        assert!(is_pk3dir(layout.map_root()));
        assert!(is_named(layout.et_main(), "etmain"));
    }

    #[test]
    fn rejects_map_outside_maps_directory() {
        let temp = tempfile::tempdir().unwrap();
        let map = temp.path().join("etmain/oasis.map");
        touch(&map);

        assert!(matches!(
            MapLayout::discover(&map),
            Err(LayoutError::OutsideMaps(_))
        ));
    }

    #[test]
    fn rejects_maps_dir_without_etmain() {
        let temp = tempfile::tempdir().unwrap();
        let map = temp.path().join("somewhere/maps/oasis.map");
        touch(&map);

        assert!(matches!(
            MapLayout::discover(&map),
            Err(LayoutError::OutsideMaps(_))
        ));
    }

    #[test]
    fn rejects_non_map_extension() {
        let temp = tempfile::tempdir().unwrap();
        let map = temp.path().join("etmain/maps/oasis.bsp");
        touch(&map);

        assert!(matches!(
            MapLayout::discover(&map),
            Err(LayoutError::NotAMap(_))
        ));
    }
}
