//! Shader-script parser. A shader file is a sequence of named brace blocks;
//! each block may nest stage blocks one level deep. The parser extracts just
//! enough to build the reference graph: shader-to-shader links
//! (`q3map_remapShader` and friends), file references (stage maps, sky
//! boxes, surface models, videomaps), implicit mappings, and the
//! light-style marker. Everything else is skipped untouched.
//!
//! Block comments may span lines; a single boolean tracks the open state and
//! suppresses everything in between.
use std::io::BufRead;

use pakfs::{CancelToken, ResourceName, ResourceSet};

use crate::line::LineReader;
use crate::ScanError;

/// One shader definition, as extracted from a script file.
#[derive(Debug, Clone)]
pub struct ShaderDef {
    pub name: ResourceName,
    /// Further shaders this definition references.
    pub shaders: ResourceSet,
    /// File references (textures, sky images, videomaps, models).
    pub resources: ResourceSet,
    /// Texture implied by an `implicit*` directive.
    pub implicit_mapping: Option<ResourceName>,
    pub has_light_styles: bool,
}

impl ShaderDef {
    fn new(name: ResourceName) -> Self {
        Self {
            name,
            shaders: ResourceSet::default(),
            resources: ResourceSet::default(),
            implicit_mapping: None,
            has_light_styles: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Top,
    AwaitBrace,
    Shader,
    Stage,
}

pub fn parse_shader_bytes(
    bytes: Vec<u8>,
    label: impl Into<String>,
    include_source: bool,
    cancel: &CancelToken,
) -> Result<Vec<ShaderDef>, ScanError> {
    let reader = LineReader::from_bytes(bytes, label, cancel.clone());
    parse_shader_reader(reader, include_source)
}

pub fn parse_shader_reader<R: BufRead>(
    reader: LineReader<R>,
    include_source: bool,
) -> Result<Vec<ShaderDef>, ScanError> {
    let label = reader.label().to_string();
    let mut defs = Vec::new();
    let mut current: Option<ShaderDef> = None;
    let mut state = State::Top;
    let mut in_block_comment = false;
    let mut last_index = 0;

    for line in reader {
        let line = line?;
        last_index = line.index;

        let cleaned = strip_block_comments(&line.value, &mut in_block_comment);
        let text = cleaned.trim();
        if text.is_empty() {
            continue;
        }
        let first = text.chars().next().expect("text is non-empty");

        match state {
            State::Top => {
                let (name, opened) = match text.strip_suffix('{') {
                    Some(stripped) => (stripped.trim(), true),
                    None => (text, false),
                };
                let name = name.split_whitespace().next().unwrap_or("");
                if name.is_empty() || name.starts_with('{') {
                    return Err(ScanError::invalid(
                        &label,
                        line.index,
                        "expected shader name",
                        text,
                    ));
                }
                current = Some(ShaderDef::new(ResourceName::new(name)));
                state = if opened { State::Shader } else { State::AwaitBrace };
            }
            State::AwaitBrace => {
                if first != '{' {
                    return Err(ScanError::invalid(
                        &label,
                        line.index,
                        "expected '{' after shader name",
                        text,
                    ));
                }
                state = State::Shader;
            }
            State::Shader => {
                if first == '{' {
                    state = State::Stage;
                } else if first == '}' {
                    if let Some(def) = current.take() {
                        defs.push(def);
                    }
                    state = State::Top;
                } else if let Some(def) = current.as_mut() {
                    shader_directive(text, def, include_source);
                }
            }
            State::Stage => {
                if first == '}' {
                    state = State::Shader;
                } else if let Some(def) = current.as_mut() {
                    stage_directive(text, def);
                }
            }
        }
    }

    if state != State::Top || in_block_comment {
        return Err(ScanError::invalid(
            label,
            last_index,
            "unterminated shader definition",
            "",
        ));
    }
    Ok(defs)
}

/// Removes `/* … */` spans from one line, carrying the open state across
/// lines through `in_block`.
fn strip_block_comments(value: &str, in_block: &mut bool) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    loop {
        if *in_block {
            match rest.find("*/") {
                Some(idx) => {
                    rest = &rest[idx + 2..];
                    *in_block = false;
                }
                None => break,
            }
        } else {
            match rest.find("/*") {
                Some(idx) => {
                    out.push_str(&rest[..idx]);
                    rest = &rest[idx + 2..];
                    *in_block = true;
                }
                None => {
                    out.push_str(rest);
                    break;
                }
            }
        }
    }
    out
}

fn shader_directive(text: &str, def: &mut ShaderDef, include_source: bool) {
    let mut tokens = text.split_whitespace();
    let Some(keyword) = tokens.next() else {
        return;
    };
    let keyword = keyword.to_ascii_lowercase();

    match keyword.as_str() {
        // High-frequency keywords with nothing to extract.
        "surfaceparm" | "cull" | "nopicmip" | "nomipmaps" | "tesssize" => return,

        "q3map_backshader" | "q3map_baseshader" | "q3map_cloneshader" | "q3map_remapshader"
        | "sunshader" => {
            if let Some(arg) = next_reference(&mut tokens) {
                def.shaders.insert(ResourceName::new(arg));
            }
            return;
        }

        "q3map_lightimage" | "qer_editorimage" | "q3map_normalimage" => {
            // Editor and compiler imagery only matters when packing sources.
            if include_source {
                if let Some(arg) = next_reference(&mut tokens) {
                    def.resources.insert(ResourceName::new(arg));
                }
            }
            return;
        }

        "skyparms" => {
            if let Some(base) = tokens.next() {
                let base = if base == "-" {
                    def.name.as_str().to_string()
                } else {
                    strip_quotes(base).to_string()
                };
                for side in ["bk", "dn", "ft", "up", "rt", "lf"] {
                    def.resources
                        .insert(ResourceName::new(format!("{base}_{side}")));
                }
            }
            return;
        }

        "q3map_surfacemodel" => {
            if let Some(arg) = next_reference(&mut tokens) {
                def.resources.insert(ResourceName::new(arg));
            }
            return;
        }

        "q3map_lightstyle" => {
            def.has_light_styles = true;
            return;
        }

        _ => {}
    }

    if keyword.starts_with("implicit") {
        if let Some(arg) = tokens.next() {
            def.implicit_mapping = Some(if arg == "-" {
                def.name.clone()
            } else {
                ResourceName::new(strip_quotes(arg))
            });
        }
    }
}

fn stage_directive(text: &str, def: &mut ShaderDef) {
    // Cheap filter: every stage keyword we care about starts with one of
    // these letters.
    let first = text
        .chars()
        .next()
        .map(|c| c.to_ascii_lowercase())
        .unwrap_or('\0');
    if !matches!(first, 'm' | 'a' | 'c' | 'v') {
        return;
    }

    let mut tokens = text.split_whitespace();
    let Some(keyword) = tokens.next() else {
        return;
    };
    match keyword.to_ascii_lowercase().as_str() {
        "map" | "clampmap" | "videomap" => {
            if let Some(arg) = next_reference(&mut tokens) {
                def.resources.insert(ResourceName::new(arg));
            }
        }
        "animmap" => {
            // First argument is the frame rate.
            tokens.next();
            for frame in tokens {
                let frame = strip_quotes(frame);
                if !frame.is_empty() && !frame.starts_with('$') {
                    def.resources.insert(ResourceName::new(frame));
                }
            }
        }
        _ => {}
    }
}

/// Next token as a reference: quotes removed, `$…` engine builtins dropped.
fn next_reference<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let token = strip_quotes(tokens.next()?);
    if token.is_empty() || token.starts_with('$') {
        None
    } else {
        Some(token)
    }
}

fn strip_quotes(token: &str) -> &str {
    token.trim_matches('"')
}
