//! `.map` source scanner. Walks the entity/brush structure with an explicit
//! state machine and collects every shader and file reference the compiled
//! level will need at runtime: brush face and patch shaders, entity key
//! references (fog, celshader, remaps, models, skins, sounds), and the
//! style-light flag that later decides whether the generated style shader
//! file ships.
//!
//! The scanner is strictly sequential; the surrounding pipeline runs it in
//! parallel with the shader index and built-in content scans.
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use pakfs::{CancelToken, ResourceName, ResourceSet};
use tracing::debug;

use crate::line::{Line, LineReader};
use crate::ScanError;

/// References gathered from a map and its auxiliary scripts.
#[derive(Debug, Default)]
pub struct MapAssets {
    /// Referenced shader names; may or may not have definitions.
    pub shaders: ResourceSet,
    /// Referenced non-shader files (models, skins, sounds, scripts).
    pub resources: ResourceSet,
    /// Set when a `light` entity carries a `style` key or an included shader
    /// declares light styles.
    pub has_style_lights: bool,
}

/// Shaders the base game always defines; never worth referencing.
const FAST_SKIP: &[&str] = &["common/caulk", "common/nodraw", "common/trigger"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Outside,
    Entity,
    Brush,
    Patch,
    AfterDef,
}

pub fn parse_map(
    path: &Path,
    include_source: bool,
    cancel: &CancelToken,
) -> Result<MapAssets, ScanError> {
    let reader = LineReader::open(path, cancel.clone())?;
    parse_map_reader(reader, include_source)
}

pub fn parse_map_reader<R: BufRead>(
    reader: LineReader<R>,
    include_source: bool,
) -> Result<MapAssets, ScanError> {
    let label = reader.label().to_string();
    let mut assets = MapAssets::default();
    let mut state = State::Outside;
    let mut expect_brace = false;
    let mut keys: HashMap<String, String> = HashMap::new();
    let mut patch_shader_seen = false;
    let mut last_index = 0;

    for line in reader {
        let line = line?;
        last_index = line.index;

        if expect_brace {
            if line.first != '{' {
                return Err(invalid(&label, &line, "expected '{'"));
            }
            expect_brace = false;
            continue;
        }

        match state {
            State::Outside => match line.first {
                '{' => {
                    keys.clear();
                    state = State::Entity;
                }
                '}' => return Err(invalid(&label, &line, "stray '}' at top level")),
                _ => {}
            },
            State::Entity => {
                if line.first == '"' {
                    let (key, value) = parse_key_value(&label, &line)?;
                    keys.insert(key, value);
                } else if line.first == '}' {
                    apply_entity(&keys, &mut assets, include_source);
                    keys.clear();
                    state = State::Outside;
                } else if line.first == '{' {
                    // Geometry block wrapper; the def keyword follows.
                } else if line.value.eq_ignore_ascii_case("brushdef") {
                    state = State::Brush;
                    expect_brace = true;
                } else if line.value.eq_ignore_ascii_case("patchdef2")
                    || line.value.eq_ignore_ascii_case("patchdef3")
                {
                    state = State::Patch;
                    expect_brace = true;
                    patch_shader_seen = false;
                }
            }
            State::Brush => {
                if line.first == '}' {
                    state = State::AfterDef;
                } else {
                    let token = brush_face_shader(&label, &line)?;
                    add_texture_shader(token, &mut assets);
                }
            }
            State::Patch => {
                if line.first == '}' {
                    state = State::AfterDef;
                } else if line.first != '(' && !patch_shader_seen {
                    add_texture_shader(&line.value, &mut assets);
                    patch_shader_seen = true;
                }
            }
            State::AfterDef => {
                if line.first == '}' {
                    state = State::Entity;
                } else {
                    return Err(invalid(&label, &line, "expected '}' after geometry block"));
                }
            }
        }
    }

    if state != State::Outside || expect_brace {
        return Err(ScanError::invalid(
            label,
            last_index,
            "unterminated block at end of map",
            "",
        ));
    }

    debug!(
        shaders = assets.shaders.len(),
        resources = assets.resources.len(),
        style_lights = assets.has_style_lights,
        "map scan complete"
    );
    Ok(assets)
}

fn invalid(label: &str, line: &Line, reason: &str) -> ScanError {
    ScanError::invalid(label, line.index, reason, line.value.clone())
}

/// Extracts the shader token from a brush face line: everything after the
/// last `)` must start with a space, and the first token that follows is the
/// shader name without its `textures/` prefix.
fn brush_face_shader<'a>(label: &str, line: &'a Line) -> Result<&'a str, ScanError> {
    let value = line.value.as_str();
    let close = value
        .rfind(')')
        .ok_or_else(|| invalid(label, line, "brush face without plane definition"))?;
    let rest = &value[close + 1..];
    if !rest.starts_with(' ') {
        return Err(invalid(label, line, "no space after closing ')' on brush face"));
    }
    rest[1..]
        .split_whitespace()
        .next()
        .ok_or_else(|| invalid(label, line, "brush face without shader token"))
}

fn add_texture_shader(token: &str, assets: &mut MapAssets) {
    if FAST_SKIP.iter().any(|skip| token.eq_ignore_ascii_case(skip)) {
        return;
    }
    assets
        .shaders
        .insert(ResourceName::new(format!("textures/{token}")));
}

/// Parses a `"key" "value"` line; the key is lowercased for lookup.
fn parse_key_value(label: &str, line: &Line) -> Result<(String, String), ScanError> {
    let mut parts = line.value.split('"').skip(1);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(_), Some(value)) => Ok((key.to_ascii_lowercase(), value.to_string())),
        _ => Err(invalid(label, line, "malformed key/value pair")),
    }
}

fn apply_entity(keys: &HashMap<String, String>, assets: &mut MapAssets, include_source: bool) {
    let classname = keys.get("classname").map(String::as_str).unwrap_or("");

    for (key, value) in keys {
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "_fog" | "sun" => {
                assets.shaders.insert(ResourceName::new(value));
            }
            "_celshader" => {
                assets
                    .shaders
                    .insert(ResourceName::new(format!("textures/{value}")));
            }
            "shader" => {
                // Terrain entities habitually omit the textures/ prefix.
                let name = ResourceName::new(value);
                if keys.contains_key("terrain") && !name.starts_with("textures/") {
                    debug!(shader = %name, "terrain shader missing textures/ prefix; adding it");
                    assets
                        .shaders
                        .insert(ResourceName::new(format!("textures/{value}")));
                } else {
                    assets.shaders.insert(name);
                }
            }
            "targetshadername" | "targetshadernewname" => {
                assets.shaders.insert(ResourceName::new(value));
            }
            "model" => {
                // misc_model geometry is baked into the BSP at compile
                // time; the model file is only needed when packing sources.
                if !classname.eq_ignore_ascii_case("misc_model") || include_source {
                    assets.resources.insert(ResourceName::new(value));
                }
            }
            "model2" => {
                assets.resources.insert(ResourceName::new(value));
            }
            "skin" | "_skin" => {
                assets.resources.insert(ResourceName::new(value));
            }
            "noise" => {
                if !value.eq_ignore_ascii_case("nosound") {
                    assets.resources.insert(ResourceName::new(value));
                }
            }
            "sound" => {
                if classname.eq_ignore_ascii_case("dlight") && !value.eq_ignore_ascii_case("nosound")
                {
                    assets.resources.insert(ResourceName::new(value));
                }
            }
            "style" => {
                if classname.eq_ignore_ascii_case("light") {
                    assets.has_style_lights = true;
                }
            }
            _ => {}
        }
    }
}
