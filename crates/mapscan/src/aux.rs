//! Auxiliary reference parsers for the scripts that ship alongside a map:
//! the mapscript, the soundscript, the speakerscript, and the arena file.
//! Each parser is optional (a missing file is informational, not an error)
//! and each contributes the parsed file itself to the output in addition to
//! whatever references it extracts. The pipeline runs them concurrently.
use std::fs::File;
use std::io::BufReader;

use pakfs::{CancelToken, MapLayout, ResourceName};
use tracing::{debug, info};

use crate::line::LineReader;
use crate::ScanError;

/// A reference extracted by an auxiliary parser.
#[derive(Debug, Clone)]
pub struct AuxResource {
    pub name: ResourceName,
    /// Shader-class references join the map's shader set and participate in
    /// texture fallback; the rest are looked up verbatim.
    pub is_shader: bool,
}

impl AuxResource {
    fn file(name: ResourceName) -> Self {
        Self {
            name,
            is_shader: false,
        }
    }
}

pub trait AuxParser: Send + Sync {
    fn description(&self) -> &'static str;

    /// Location of the script, relative to `map_root`.
    fn entry_name(&self, layout: &MapLayout) -> ResourceName;

    fn extract(
        &self,
        layout: &MapLayout,
        reader: LineReader<BufReader<File>>,
    ) -> Result<Vec<AuxResource>, ScanError>;
}

/// Runs one parser against its file, if present. The file itself is added
/// to the returned references so it ships with the map.
pub fn run_parser(
    parser: &dyn AuxParser,
    layout: &MapLayout,
    cancel: &CancelToken,
) -> Result<Vec<AuxResource>, ScanError> {
    let entry = parser.entry_name(layout);
    let path = entry.fs_path(layout.map_root());
    if !path.is_file() {
        info!(
            parser = parser.description(),
            path = %path.display(),
            "no auxiliary file, skipping"
        );
        return Ok(Vec::new());
    }

    let reader = LineReader::open(&path, cancel.clone())?;
    let mut found = parser.extract(layout, reader)?;
    found.push(AuxResource::file(entry));
    debug!(
        parser = parser.description(),
        references = found.len(),
        "auxiliary file parsed"
    );
    Ok(found)
}

pub fn default_parsers() -> Vec<Box<dyn AuxParser>> {
    vec![
        Box::new(Mapscript),
        Box::new(Soundscript),
        Box::new(Speakerscript),
        Box::new(Arena),
    ]
}

fn strip_quotes(token: &str) -> &str {
    token.trim_matches('"')
}

/// `maps/<name>.script`: entity scripting; references sounds to play and
/// shader remaps to apply at runtime.
struct Mapscript;

impl AuxParser for Mapscript {
    fn description(&self) -> &'static str {
        "mapscript"
    }

    fn entry_name(&self, layout: &MapLayout) -> ResourceName {
        ResourceName::new(format!("maps/{}.script", layout.name()))
    }

    fn extract(
        &self,
        _layout: &MapLayout,
        reader: LineReader<BufReader<File>>,
    ) -> Result<Vec<AuxResource>, ScanError> {
        let mut found = Vec::new();
        for line in reader {
            let line = line?;
            let mut tokens = line.value.split_whitespace();
            let Some(keyword) = tokens.next() else {
                continue;
            };
            match keyword.to_ascii_lowercase().as_str() {
                "playsound" => {
                    if let Some(arg) = tokens.next() {
                        let arg = strip_quotes(arg);
                        if !arg.is_empty() {
                            found.push(AuxResource {
                                name: ResourceName::new(arg),
                                is_shader: false,
                            });
                        }
                    }
                }
                "remapshader" => {
                    for arg in tokens.by_ref().take(2) {
                        let arg = strip_quotes(arg);
                        if !arg.is_empty() {
                            found.push(AuxResource {
                                name: ResourceName::new(arg),
                                is_shader: true,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(found)
    }
}

/// `sound/scripts/<name>.sounds`: named sound sets; every `sound` line
/// names a wav file.
struct Soundscript;

impl AuxParser for Soundscript {
    fn description(&self) -> &'static str {
        "soundscript"
    }

    fn entry_name(&self, layout: &MapLayout) -> ResourceName {
        ResourceName::new(format!("sound/scripts/{}.sounds", layout.name()))
    }

    fn extract(
        &self,
        _layout: &MapLayout,
        reader: LineReader<BufReader<File>>,
    ) -> Result<Vec<AuxResource>, ScanError> {
        let mut found = Vec::new();
        let mut depth = 0usize;
        for line in reader {
            let line = line?;
            let mut tokens = line.value.split_whitespace();
            // `sound` lines only count inside a named block; a top-level
            // token with the same spelling is a block name.
            if depth > 0
                && tokens
                    .next()
                    .is_some_and(|t| t.eq_ignore_ascii_case("sound"))
            {
                if let Some(arg) = tokens.next() {
                    let arg = strip_quotes(arg);
                    if !arg.is_empty() {
                        found.push(AuxResource {
                            name: ResourceName::new(arg),
                            is_shader: false,
                        });
                    }
                }
            }
            for ch in line.value.chars() {
                match ch {
                    '{' => depth += 1,
                    '}' => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
        }
        Ok(found)
    }
}

/// `sound/maps/<name>.sps`: placed speakers; `noise` keys name wav files.
struct Speakerscript;

impl AuxParser for Speakerscript {
    fn description(&self) -> &'static str {
        "speakerscript"
    }

    fn entry_name(&self, layout: &MapLayout) -> ResourceName {
        ResourceName::new(format!("sound/maps/{}.sps", layout.name()))
    }

    fn extract(
        &self,
        _layout: &MapLayout,
        reader: LineReader<BufReader<File>>,
    ) -> Result<Vec<AuxResource>, ScanError> {
        let mut found = Vec::new();
        let mut depth = 0usize;
        // Depth of the open speakerDef block, when inside one.
        let mut speaker_depth: Option<usize> = None;
        let mut pending_speaker = false;
        for line in reader {
            let line = line?;
            let mut tokens = line.value.split_whitespace();
            let first = tokens.next();
            if first.is_some_and(|t| t.eq_ignore_ascii_case("speakerdef")) {
                pending_speaker = true;
            } else if speaker_depth.is_some()
                && first.is_some_and(|t| t.eq_ignore_ascii_case("noise"))
            {
                if let Some(arg) = tokens.next() {
                    let arg = strip_quotes(arg);
                    if !arg.is_empty() {
                        found.push(AuxResource {
                            name: ResourceName::new(arg),
                            is_shader: false,
                        });
                    }
                }
            }
            for ch in line.value.chars() {
                match ch {
                    '{' => {
                        depth += 1;
                        if pending_speaker {
                            speaker_depth = Some(depth);
                            pending_speaker = false;
                        }
                    }
                    '}' => {
                        if speaker_depth == Some(depth) {
                            speaker_depth = None;
                        }
                        depth = depth.saturating_sub(1);
                    }
                    _ => {}
                }
            }
        }
        Ok(found)
    }
}

/// `scripts/<name>.arena`: server browser metadata; implies the levelshot
/// image.
struct Arena;

impl AuxParser for Arena {
    fn description(&self) -> &'static str {
        "arena"
    }

    fn entry_name(&self, layout: &MapLayout) -> ResourceName {
        ResourceName::new(format!("scripts/{}.arena", layout.name()))
    }

    fn extract(
        &self,
        layout: &MapLayout,
        reader: LineReader<BufReader<File>>,
    ) -> Result<Vec<AuxResource>, ScanError> {
        let mut stem = layout.name().to_string();
        for line in reader {
            let line = line?;
            let mut tokens = line.value.split_whitespace();
            if tokens.next().is_some_and(|t| t.eq_ignore_ascii_case("map")) {
                if let Some(arg) = tokens.next() {
                    let arg = strip_quotes(arg);
                    if !arg.is_empty() {
                        stem = arg.to_string();
                    }
                }
            }
        }
        // Levelshots are plain textures; fallback picks .tga or .jpg.
        Ok(vec![AuxResource {
            name: ResourceName::new(format!("levelshots/{stem}")),
            is_shader: true,
        }])
    }
}
