//! Text parsers for map content: the logical line reader, the `.map` entity
//! and geometry scanner, the shader-script parser, and the auxiliary script
//! parsers (mapscript, soundscript, speakerscript, arena). Parsers only
//! extract file and shader references; they never validate rendering
//! semantics.
//!
//! All parsers surface structural failures as `ScanError` values rather than
//! panicking, and poll the shared `CancelToken` between lines.
mod aux;
mod line;
mod map;
mod shader;

pub use aux::{default_parsers, run_parser, AuxParser, AuxResource};
pub use line::{Line, LineReader};
pub use map::{parse_map, parse_map_reader, MapAssets};
pub use shader::{parse_shader_bytes, parse_shader_reader, ShaderDef};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{path}:{line}: {reason}: {text:?}")]
    InvalidData {
        path: String,
        line: u32,
        reason: String,
        text: String,
    },

    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation canceled")]
    Canceled,
}

impl ScanError {
    pub fn invalid(
        path: impl Into<String>,
        line: u32,
        reason: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::InvalidData {
            path: path.into(),
            line,
            reason: reason.into(),
            text: text.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
