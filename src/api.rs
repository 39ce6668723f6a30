use crate::entity::Entity;
use crate::fixed::Fixed;
use crate::map::{Map, MapError};
use crate::narrowphase::PositionCheck;
use crate::types::*;
use crate::world::World;

/// Gameplay callbacks the collision core fires. Every method has a neutral
/// default, so an implementation only overrides what it cares about.
///
/// Hooks receive the world mutably and may move, damage or remove any
/// entity, including the ones currently being resolved; the core re-checks
/// its handles after every call.
pub trait GameHooks {
    // --- Damage --------------------------------------------------------------

    /// Applies damage; returns whether it took effect.
    fn apply_damage(
        &mut self,
        world: &mut World,
        target: EntityId,
        inflictor: Option<EntityId>,
        source: Option<EntityId>,
        damage: Damage,
    ) -> bool {
        let _ = (world, target, inflictor, source, damage);
        false
    }

    /// Kills an entity outright. The default removes it.
    fn kill(&mut self, world: &mut World, target: EntityId, inflictor: Option<EntityId>, source: Option<EntityId>) {
        let _ = (inflictor, source);
        world.remove(target);
    }

    // --- Pair collisions -----------------------------------------------------

    /// Asked for both orders of a pair before the built-in rules run.
    fn should_collide(&mut self, world: &mut World, a: EntityId, b: EntityId) -> CollideOverride {
        let _ = (world, a, b);
        CollideOverride::Default
    }

    /// Asked before a line is tested against an entity.
    fn should_collide_line(&mut self, world: &mut World, entity: EntityId, line: LineId) -> CollideOverride {
        let _ = (world, entity, line);
        CollideOverride::Default
    }

    /// Item-specific contact. Returns `false` to block the mover.
    fn item_collide(&mut self, world: &mut World, item: EntityId, other: EntityId, group: ItemGroup) -> bool {
        let _ = (world, item, other, group);
        true
    }

    /// A player touched a pickup.
    fn touch_special(&mut self, world: &mut World, special: EntityId, toucher: EntityId) {
        let _ = (world, special, toucher);
    }

    /// Player-versus-player bump. Returns whether a bump happened.
    fn kart_bounce(&mut self, world: &mut World, a: EntityId, b: EntityId) -> bool {
        let _ = (world, a, b);
        false
    }

    /// Contact damage after a player bump.
    fn pvp_touch_damage(&mut self, world: &mut World, a: EntityId, b: EntityId) {
        let _ = (world, a, b);
    }

    /// Player bounced off a solid object. Returns whether it bounced.
    fn solid_bounce(&mut self, world: &mut World, player: EntityId, solid: EntityId) -> bool {
        let _ = (world, player, solid);
        false
    }

    /// A spring launched `object`.
    fn sprung(&mut self, world: &mut World, spring: EntityId, object: EntityId) {
        let _ = (world, spring, object);
    }

    // --- Lines and surfaces --------------------------------------------------

    /// An entity changed sides of a trigger line during a committed move.
    fn cross_special_line(&mut self, world: &mut World, line: LineId, from_side: u8, entity: EntityId) {
        let _ = (world, line, from_side, entity);
    }

    /// A player hit a trip-wire while bouncing off it.
    fn apply_tripwire(&mut self, world: &mut World, player: EntityId) {
        let _ = (world, player);
    }

    /// A player bounced off a wall.
    fn bump_effect(&mut self, world: &mut World, player: EntityId) {
        let _ = (world, player);
    }

    /// A player stepped up or down without standing on a slope.
    fn stair_jank(&mut self, world: &mut World, player: EntityId) {
        let _ = (world, player);
    }

    /// A player landed from the air while moving horizontally.
    fn hit_floor(&mut self, world: &mut World, entity: EntityId) {
        let _ = (world, entity);
    }

    /// An entity touched a polyobject line while sliding or bouncing.
    fn touch_polyobject(&mut self, world: &mut World, poly: PolyId, entity: EntityId) {
        let _ = (world, poly, entity);
    }

    // --- Misc ----------------------------------------------------------------

    /// Line of sight for area damage.
    fn check_sight(&mut self, world: &World, from: EntityId, to: EntityId) -> bool {
        let _ = (world, from, to);
        true
    }

    fn play_sound(&mut self, world: &mut World, origin: EntityId, sound: SoundId) {
        let _ = (world, origin, sound);
    }
}

/// Hooks that take every default.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoHooks;

impl GameHooks for NoHooks {}

/// Public movement contract of the collision world.
pub trait MovementApi {
    /// Build a world over a validated map.
    fn new(map: Map, cfg: WorldConfig) -> Result<Self, MapError>
    where
        Self: Sized;

    // --- Tick lifecycle ------------------------------------------------------

    /// Clear per-tick flags and the crossed-line event list.
    fn begin_tick(&mut self);

    /// Take the trigger lines crossed since the last drain, in firing order.
    fn drain_crossings(&mut self) -> Vec<LineCrossing>;

    // --- Entities ------------------------------------------------------------

    /// Insert an entity and link it at its position.
    fn spawn(&mut self, entity: Entity) -> EntityId;

    /// Unlink and destroy an entity; its handle goes stale.
    fn remove(&mut self, id: EntityId) -> Option<Entity>;

    fn entity(&self, id: EntityId) -> Option<&Entity>;

    fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity>;

    /// Recompute which sectors the entity overlaps.
    fn update_membership(&mut self, id: EntityId);

    // --- Movement ------------------------------------------------------------

    /// Evaluate a candidate position without moving. `None` if the entity is
    /// gone (before or during the check).
    fn check_position(&mut self, hooks: &mut dyn GameHooks, id: EntityId, x: Fixed, y: Fixed) -> Option<PositionCheck>;

    /// Move in radius-sized sub-steps; all-or-nothing.
    fn try_move(&mut self, hooks: &mut dyn GameHooks, id: EntityId, x: Fixed, y: Fixed, allow_dropoff: bool) -> bool;

    /// Apply one tick of horizontal momentum, deflecting when blocked.
    fn move_by_momentum(&mut self, hooks: &mut dyn GameHooks, id: EntityId) -> bool;

    /// Teleport, keeping the current z.
    fn set_origin(&mut self, hooks: &mut dyn GameHooks, id: EntityId, x: Fixed, y: Fixed, z: Fixed) -> bool;

    /// Re-fit the entity between its floor and ceiling. Returns whether it fits.
    fn thing_height_clip(&mut self, hooks: &mut dyn GameHooks, id: EntityId) -> bool;

    /// Re-validate everything touching a sector after its heights changed.
    /// Returns `true` when something could not fit.
    fn check_sector(&mut self, hooks: &mut dyn GameHooks, sector: SectorId, crunch: bool) -> bool;
}
