//! Filesystem model for Quake III / Enemy Territory content. `mapscan` and
//! `packer` consumers pull everything they need about names, layout, and
//! storage from this crate: case-insensitive resource names, the
//! `etmain`/`.pk3dir` layout rules, and a uniform view over directory and
//! archive asset sources with a deterministic precedence order.
//!
//! Re-exports:
//!
//! - `ResourceName`/`ResourceSet` are the currency every parser and the
//!   packager trade in.
//! - `MapLayout` validates where a map lives and derives the paths the
//!   pipeline keys off.
//! - `AssetSource`, `discover_sources`, and `SourceOptions` build the
//!   ordered source list whose indices act as precedence keys.
//! - `CancelToken` is the single cooperative cancellation flag polled at
//!   every loop boundary.
mod cancel;
mod discover;
mod layout;
mod name;
mod source;

pub use cancel::CancelToken;
pub use discover::{discover_sources, SourceOptions, PAK0};
pub use layout::{LayoutError, MapLayout};
pub use name::{ResourceName, ResourceSet};
pub use source::AssetSource;
