//! Output archive writer. Wraps `zip::ZipWriter` with the two behaviors the
//! packager needs everywhere: entries are deduplicated by case-insensitive
//! name, and a dry run records entries without touching the filesystem.
//!
//! Beyond real entries, a name can be marked *satisfied*: bare texture
//! names whose `.tga`/`.jpg` form was packed are recorded this way, so
//! later references to the bare name short-circuit.
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use pakfs::{ResourceName, ResourceSet};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::PackError;

pub struct Pk3Writer {
    output: PathBuf,
    zip: Option<ZipWriter<File>>,
    /// Entries actually written, in write order.
    added: ResourceSet,
    /// Entries plus aliases that no longer need packing.
    satisfied: ResourceSet,
}

impl Pk3Writer {
    pub fn create(output: &Path, overwrite: bool, dry_run: bool) -> Result<Self, PackError> {
        if output.exists() && !overwrite && !dry_run {
            return Err(PackError::OutputExists(output.to_path_buf()));
        }
        let zip = if dry_run {
            None
        } else {
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| PackError::Io {
                    action: "create output directory",
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let file = File::create(output).map_err(|source| PackError::Io {
                action: "create output archive",
                path: output.to_path_buf(),
                source,
            })?;
            Some(ZipWriter::new(file))
        };
        Ok(Self {
            output: output.to_path_buf(),
            zip,
            added: ResourceSet::default(),
            satisfied: ResourceSet::default(),
        })
    }

    pub fn is_satisfied(&self, name: &ResourceName) -> bool {
        self.satisfied.contains(name)
    }

    /// Records that `name` needs no entry of its own.
    pub fn mark_satisfied(&mut self, name: ResourceName) {
        self.satisfied.insert(name);
    }

    /// Adds a filesystem file under `entry`; returns false when the entry
    /// was already present.
    pub fn add_file(&mut self, entry: &ResourceName, path: &Path) -> Result<bool, PackError> {
        if self.is_satisfied(entry) {
            return Ok(false);
        }
        let bytes = fs::read(path).map_err(|source| PackError::Io {
            action: "read",
            path: path.to_path_buf(),
            source,
        })?;
        self.write(entry, &bytes)
    }

    pub fn add_bytes(&mut self, entry: &ResourceName, bytes: &[u8]) -> Result<bool, PackError> {
        if self.is_satisfied(entry) {
            return Ok(false);
        }
        self.write(entry, bytes)
    }

    fn write(&mut self, entry: &ResourceName, bytes: &[u8]) -> Result<bool, PackError> {
        if let Some(zip) = self.zip.as_mut() {
            let options =
                FileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.start_file(entry.as_str(), options)?;
            zip.write_all(bytes).map_err(|source| PackError::Io {
                action: "write archive entry",
                path: self.output.clone(),
                source,
            })?;
        }
        debug!(entry = %entry, bytes = bytes.len(), "added");
        self.added.insert(entry.clone());
        self.satisfied.insert(entry.clone());
        Ok(true)
    }

    pub fn entry_count(&self) -> usize {
        self.added.len()
    }

    /// Closes the archive and returns the sorted entry list.
    pub fn finish(mut self) -> Result<Vec<ResourceName>, PackError> {
        if let Some(mut zip) = self.zip.take() {
            zip.finish()?;
        }
        let mut entries: Vec<ResourceName> = self.added.into_iter().collect();
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn deduplicates_by_case_insensitive_name() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out.pk3");
        let mut writer = Pk3Writer::create(&output, false, false).unwrap();

        assert!(writer.add_bytes(&ResourceName::new("textures/a.tga"), b"one").unwrap());
        assert!(!writer.add_bytes(&ResourceName::new("Textures/A.TGA"), b"two").unwrap());
        let entries = writer.finish().unwrap();
        assert_eq!(entries.len(), 1);

        let mut zip = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut contents = String::new();
        zip.by_name("textures/a.tga")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "one");
    }

    #[test]
    fn refuses_existing_output_without_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out.pk3");
        fs::write(&output, b"old").unwrap();

        assert!(matches!(
            Pk3Writer::create(&output, false, false),
            Err(PackError::OutputExists(_))
        ));
        assert!(Pk3Writer::create(&output, true, false).is_ok());
    }

    #[test]
    fn dry_run_records_entries_without_writing() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out.pk3");
        let mut writer = Pk3Writer::create(&output, false, true).unwrap();
        writer.add_bytes(&ResourceName::new("maps/demo.bsp"), b"bsp").unwrap();
        let entries = writer.finish().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!output.exists());
    }

    #[test]
    fn satisfied_marks_block_future_writes() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out.pk3");
        let mut writer = Pk3Writer::create(&output, false, true).unwrap();
        writer.mark_satisfied(ResourceName::new("textures/a"));
        assert!(!writer.add_bytes(&ResourceName::new("textures/a"), b"x").unwrap());
        assert_eq!(writer.entry_count(), 0);
    }
}
