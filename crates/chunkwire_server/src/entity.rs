//! Opaque id -> component bag, backed by `bevy_ecs`.
//!
//! The interest tracker, peer session table and tick loop never touch
//! `bevy_ecs::World` directly — they go through [`EntityRegistry`], which is
//! the only thing in this crate that names the ECS crate. This keeps the
//! component framework itself out of scope, as required by the core's
//! contract: we specify the component schemas, not the ECS internals.

use bevy_ecs::{prelude::Component, world::World as EcsWorld};

use crate::chunk_grid::ChunkId;
use crate::peer::ObserverId;

/// Opaque 64-bit entity identifier, stable for the entity's lifetime. Backed
/// by a `bevy_ecs::Entity`, whose generation counter means a freshly
/// allocated id never compares equal to a previously deleted one even if the
/// ECS reuses the underlying index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    fn from_ecs(entity: bevy_ecs::entity::Entity) -> Self {
        Self(entity.to_bits())
    }

    fn to_ecs(self) -> bevy_ecs::entity::Entity {
        bevy_ecs::entity::Entity::from_bits(self.0)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// World-space position of a movable entity (player, car, ...).
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

/// Chunk coordinates of a static, cell-granularity entity (e.g. a terrain
/// chunk placeholder). Distinct from a moving entity's [`Position`]: this
/// names a chunk directly rather than a point the chunk grid must resolve.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub x: i16,
    pub y: i16,
}

/// Marks an entity as the avatar of a connected peer. `view_id` is the
/// observer id the interest tracker will key that peer's visibility on.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub peer_handle: u64,
    pub view_id: u16,
}

/// Last input state received from the owning peer.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Input {
    pub x: i8,
    pub y: i8,
    pub use_item: bool,
    pub sprint: bool,
}

/// The entity kind written into an [`chunkwire_protocol::snapshot::EntitySnapshot`]'s
/// `kind` byte. Purely a wire-level hint for the client mirror's renderer.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kind(pub u8);

impl Kind {
    pub const GENERIC: Kind = Kind(0);
    pub const PLAYER: Kind = Kind(1);
    pub const CAR: Kind = Kind(2);
}

/// Opaque id -> component bag, with query-by-component-set.
pub struct EntityRegistry {
    world: EcsWorld,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            world: EcsWorld::new(),
        }
    }

    pub fn create(&mut self) -> EntityId {
        EntityId::from_ecs(self.world.spawn().id())
    }

    pub fn delete(&mut self, entity_id: EntityId) -> bool {
        self.world.despawn(entity_id.to_ecs())
    }

    pub fn exists(&self, entity_id: EntityId) -> bool {
        self.world.get_entity(entity_id.to_ecs()).is_some()
    }

    pub fn get<T: Component + Clone>(&self, entity_id: EntityId) -> Option<T> {
        self.world.get::<T>(entity_id.to_ecs()).cloned()
    }

    pub fn set<T: Component>(&mut self, entity_id: EntityId, component: T) {
        if let Some(mut entity) = self.world.get_entity_mut(entity_id.to_ecs()) {
            entity.insert(component);
        }
    }

    pub fn remove<T: Component>(&mut self, entity_id: EntityId) {
        if let Some(mut entity) = self.world.get_entity_mut(entity_id.to_ecs()) {
            entity.remove::<T>();
        }
    }

    /// Every entity that carries a [`Position`] component, for the tick
    /// loop's chunk-reconciliation pass.
    pub fn query_positioned(&mut self) -> Vec<(EntityId, Position)> {
        let mut query = self.world.query::<(bevy_ecs::entity::Entity, &Position)>();
        query
            .iter(&self.world)
            .map(|(entity, position)| (EntityId::from_ecs(entity), *position))
            .collect()
    }

    /// The entity representing `observer_id`'s own peer, if it still exists.
    pub fn query_by_view_id(&mut self, observer_id: ObserverId) -> Option<EntityId> {
        let mut query = self.world.query::<(bevy_ecs::entity::Entity, &ClientInfo)>();
        query
            .iter(&self.world)
            .find(|(_, info)| info.view_id == observer_id.0)
            .map(|(entity, _)| EntityId::from_ecs(entity))
    }
}

/// Computes the chunk id a positioned entity currently occupies, or a static
/// [`Chunk`]-tagged entity's packed coordinates. Lives here rather than on
/// [`EntityRegistry`] because it needs the grid's size parameters.
pub fn resolve_chunk_id(
    registry: &EntityRegistry,
    entity_id: EntityId,
    grid: &crate::chunk_grid::ChunkGrid,
) -> ChunkId {
    if let Some(position) = registry.get::<Position>(entity_id) {
        return grid.chunk_from_world(position.x as i32, position.y as i32);
    }
    if let Some(chunk) = registry.get::<Chunk>(entity_id) {
        let world_size = grid.world_size() as i32;
        if chunk.x < 0 || chunk.y < 0 || chunk.x as i32 >= world_size || chunk.y as i32 >= world_size {
            return crate::chunk_grid::CHUNK_NONE;
        }
        return (chunk.y as i32 * world_size + chunk.x as i32) as ChunkId;
    }
    crate::chunk_grid::CHUNK_NONE
}
