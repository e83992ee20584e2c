pub mod cache;
pub mod handle;
pub mod mesh;

pub use cache::AssetCache;
pub use handle::Handle;
pub use mesh::{MeshResource, SubMesh};

use crate::renderer::Material;

/// Everything a frame resolves through handles: geometry and materials.
pub struct Assets {
    pub meshes: AssetCache<MeshResource>,
    pub materials: AssetCache<Material>,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            meshes: AssetCache::new(),
            materials: AssetCache::new(),
        }
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}
