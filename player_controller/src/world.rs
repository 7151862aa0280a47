use std::sync::Arc;

use character_collision::WorldCollider;
use world_geometry::BakedWorld;

/// Load gate for the level's collision index. The controller only resolves
/// against a `Ready` world.
#[derive(Clone, Debug, Default)]
pub enum WorldSlot {
    #[default]
    Unloaded,
    Loading,
    Ready(Arc<WorldCollider>),
}

impl WorldSlot {
    pub fn begin_loading(&mut self) {
        if let WorldSlot::Ready(_) = self {
            log::info!("replacing loaded world");
        }
        *self = WorldSlot::Loading;
    }

    pub fn finish_loading(&mut self, world: Arc<WorldCollider>) {
        log::info!(
            "world ready: {} triangles, {} bvh nodes",
            world.index().triangle_count(),
            world.index().node_count()
        );
        *self = WorldSlot::Ready(world);
    }

    /// Builds the index from baked geometry and marks the slot ready.
    pub fn load_baked(&mut self, baked: &BakedWorld) {
        self.begin_loading();
        let collider = WorldCollider::from_triangles(baked.triangles());
        log::info!("indexed world '{}'", baked.name);
        self.finish_loading(Arc::new(collider));
    }

    pub fn unload(&mut self) {
        if !matches!(self, WorldSlot::Unloaded) {
            log::info!("world unloaded");
        }
        *self = WorldSlot::Unloaded;
    }

    pub fn ready(&self) -> Option<&WorldCollider> {
        match self {
            WorldSlot::Ready(world) => Some(world.as_ref()),
            WorldSlot::Unloaded | WorldSlot::Loading => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready().is_some()
    }
}
