//! Materials and the raster shader lookup table.

use std::sync::Arc;

use prism_core::alloc::HashMap;

use crate::error::RenderError;
use crate::raster::RasterShapeType;

/// Stable identity of a material's shader pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl MaterialId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A shader pipeline reference. Batches sharing a material id are
/// combine-compatible; the device resolves the id to an actual pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
}

impl Material {
    pub fn new(id: u64, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: MaterialId::new(id),
            name: name.into(),
        })
    }
}

/// Configuration a raster shape needs its shader variant to support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterShaderKey {
    /// `None` selects the generic (ubershader) variant handling all shapes.
    pub shape: Option<RasterShapeType>,
    pub simple: bool,
    pub shadowed: bool,
    pub textured: bool,
    pub has_ramp: bool,
}

/// A shader variant for raster shapes.
#[derive(Debug, Clone)]
pub struct RasterShader {
    pub material: Arc<Material>,
}

/// Registry of materials and raster shader variants.
#[derive(Debug, Default)]
pub struct MaterialSet {
    raster_shaders: HashMap<RasterShaderKey, RasterShader>,
}

impl MaterialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raster_shader(&mut self, key: RasterShaderKey, shader: RasterShader) {
        self.raster_shaders.insert(key, shader);
    }

    /// Find the best shader for a requested raster configuration.
    ///
    /// Degradation ladder: the exact variant, then the non-simple variant,
    /// then the shape-generic (ubershader) variant, then the rampless one.
    /// Only when all of those miss is the lookup an error, which names the
    /// originally requested configuration.
    pub fn pick_raster_shader(&self, requested: RasterShaderKey) -> Result<&RasterShader, RenderError> {
        let mut key = requested;
        if let Some(shader) = self.raster_shaders.get(&key) {
            return Ok(shader);
        }
        key.simple = false;
        if let Some(shader) = self.raster_shaders.get(&key) {
            return Ok(shader);
        }
        key.shape = None;
        if let Some(shader) = self.raster_shaders.get(&key) {
            return Ok(shader);
        }
        key.has_ramp = false;
        if let Some(shader) = self.raster_shaders.get(&key) {
            return Ok(shader);
        }
        Err(RenderError::ShaderNotFound {
            shape: requested.shape,
            shadowed: requested.shadowed,
            textured: requested.textured,
            simple: requested.simple,
            has_ramp: requested.has_ramp,
        })
    }
}
