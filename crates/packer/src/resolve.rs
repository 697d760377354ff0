//! Reference closure over the shader graph. Starting from the map's shader
//! names, every defined shader pulls in the shaders it references,
//! depth-first; names already shipped by the base game are dropped, and
//! names with no definition anywhere are left as bare texture references
//! for the packager's fallback rule.
use indexmap::IndexMap;

use pakfs::{ResourceName, ResourceSet};
use tracing::debug;

use crate::builtin::BuiltinIndex;
use crate::index::{IndexedShader, ShaderIndex};

#[derive(Debug, Default)]
pub struct Resolution<'a> {
    /// Shader definitions to pack, in discovery order.
    pub shaders: IndexMap<ResourceName, &'a IndexedShader>,
    /// Referenced names with no definition; treated as texture names.
    pub textures: ResourceSet,
}

impl Resolution<'_> {
    /// Flat set of file references contributed by the included shaders.
    pub fn resource_paths(&self) -> ResourceSet {
        self.shaders
            .values()
            .flat_map(|indexed| indexed.def.resources.iter().cloned())
            .collect()
    }

    pub fn has_light_styles(&self) -> bool {
        self.shaders
            .values()
            .any(|indexed| indexed.def.has_light_styles)
    }
}

pub fn resolve<'a>(
    roots: &ResourceSet,
    index: &'a ShaderIndex,
    builtin: &BuiltinIndex,
) -> Resolution<'a> {
    let mut resolution = Resolution::default();
    for name in roots {
        visit(name, index, builtin, &mut resolution);
    }
    debug!(
        shaders = resolution.shaders.len(),
        textures = resolution.textures.len(),
        "reference graph resolved"
    );
    resolution
}

fn visit<'a>(
    name: &ResourceName,
    index: &'a ShaderIndex,
    builtin: &BuiltinIndex,
    out: &mut Resolution<'a>,
) {
    // Membership check before recursion keeps self-references finite.
    if out.shaders.contains_key(name) || out.textures.contains(name) {
        return;
    }
    if builtin.contains_shader(name) {
        return;
    }
    match index.get(name) {
        Some(indexed) if !indexed.excluded => {
            out.shaders.insert(name.clone(), indexed);
            for linked in &indexed.def.shaders {
                visit(linked, index, builtin, out);
            }
        }
        // Defined by an excluded source: already shipped elsewhere.
        Some(_) => {}
        None => {
            out.textures.insert(name.clone());
        }
    }
}
