//! Small hand-built levels and a recording hook set for unit tests.

use glam::IVec2;

use crate::api::GameHooks;
use crate::entity::Entity;
use crate::fixed::{Fixed, units};
use crate::map::{Line, Map, Polyobject, Sector, Slope};
use crate::types::*;
use crate::world::World;

/// A row of rectangular rooms laid out along +x, all `depth` deep in y.
/// Room `i` is sector `i`; neighbouring rooms share a two-sided divider.
pub struct RoomRow {
    depth: Fixed,
    rooms: Vec<(Fixed, Fixed, Fixed)>,
}

impl RoomRow {
    pub fn new(depth: Fixed) -> Self {
        Self { depth, rooms: Vec::new() }
    }

    pub fn room(mut self, width: Fixed, floor: Fixed, ceiling: Fixed) -> Self {
        self.rooms.push((width, floor, ceiling));
        self
    }

    pub fn parts(self) -> LevelParts {
        let h = self.depth;
        let mut parts = LevelParts {
            sectors: Vec::new(),
            lines: Vec::new(),
            polys: Vec::new(),
            slopes: Vec::new(),
            dividers: Vec::new(),
            rooms: Vec::new(),
        };
        let mut x0 = 0;
        let last = self.rooms.len().saturating_sub(1);
        for (i, &(width, floor, ceiling)) in self.rooms.iter().enumerate() {
            let x1 = x0 + width;
            let s = SectorId(i as u32);
            parts.sectors.push(Sector::new(floor, ceiling));
            parts.rooms.push((x0, x1));

            if i == 0 {
                parts.lines.push(Line::new(IVec2::new(x0, 0), IVec2::new(x0, h), s, None));
            }
            parts.lines.push(Line::new(IVec2::new(x0, h), IVec2::new(x1, h), s, None));
            parts.lines.push(Line::new(IVec2::new(x1, 0), IVec2::new(x0, 0), s, None));
            if i == last {
                parts.lines.push(Line::new(IVec2::new(x1, h), IVec2::new(x1, 0), s, None));
            } else {
                let right = SectorId(i as u32 + 1);
                parts.dividers.push(LineId(parts.lines.len() as u32));
                parts.lines.push(Line::new(IVec2::new(x1, 0), IVec2::new(x1, h), right, Some(s)));
            }
            x0 = x1;
        }
        parts
    }

    pub fn build(self) -> Map {
        self.parts().build()
    }
}

/// The pieces of a level before validation, open for tweaking.
pub struct LevelParts {
    pub sectors: Vec<Sector>,
    pub lines: Vec<Line>,
    pub polys: Vec<Polyobject>,
    pub slopes: Vec<Slope>,
    /// Two-sided lines between consecutive rooms, left to right.
    pub dividers: Vec<LineId>,
    /// x extent of each room.
    pub rooms: Vec<(Fixed, Fixed)>,
}

impl LevelParts {
    pub fn add_sector(&mut self, sector: Sector) -> SectorId {
        self.sectors.push(sector);
        SectorId(self.sectors.len() as u32 - 1)
    }

    /// Adds a one-sided line facing into `sector`.
    pub fn add_wall(&mut self, v1: IVec2, v2: IVec2, sector: SectorId) -> LineId {
        self.lines.push(Line::new(v1, v2, sector, None));
        LineId(self.lines.len() as u32 - 1)
    }

    /// A box-shaped polyobject inside room `room`. Its control sector gets
    /// `heights` as (floor, ceiling) when given.
    pub fn add_box_poly(
        &mut self,
        room: usize,
        x0: Fixed,
        y0: Fixed,
        x1: Fixed,
        y1: Fixed,
        heights: Option<(Fixed, Fixed)>,
        flags: PolyFlags,
    ) -> PolyId {
        let (floor, ceiling) = heights.unwrap_or((0, 0));
        let control = self.add_sector(Sector::new(floor, ceiling));
        let outside = SectorId(room as u32);
        let corners = [IVec2::new(x0, y0), IVec2::new(x1, y0), IVec2::new(x1, y1), IVec2::new(x0, y1)];
        let mut lines = Vec::new();
        for i in 0..4 {
            lines.push(LineId(self.lines.len() as u32));
            self.lines.push(Line::new(corners[i], corners[(i + 1) % 4], outside, Some(control)));
        }
        self.polys.push(Polyobject::new(lines, flags));
        PolyId(self.polys.len() as u32 - 1)
    }

    pub fn build(self) -> Map {
        Map::new(self.sectors, self.lines, self.polys, self.slopes).unwrap()
    }
}

/// Generic solid entity: radius 16, height 32.
pub fn thing_at(x: Fixed, y: Fixed, z: Fixed) -> Entity {
    Entity::new(EntityKind::Generic, x, y, z, units(16), units(32)).with_flags(MobjFlags::SOLID)
}

/// Solid, shootable player: radius 16, height 32.
pub fn player_at(x: Fixed, y: Fixed, z: Fixed) -> Entity {
    Entity::new(EntityKind::Player, x, y, z, units(16), units(32)).with_flags(MobjFlags::SOLID | MobjFlags::SHOOTABLE)
}

pub fn world_of(map: Map) -> World {
    use crate::api::MovementApi;
    World::new(map, WorldConfig::default()).unwrap()
}

#[derive(Clone, Debug, PartialEq)]
pub struct DamageCall {
    pub target: EntityId,
    pub inflictor: Option<EntityId>,
    pub source: Option<EntityId>,
    pub damage: Damage,
}

/// Hooks that record every call and answer with configurable results.
#[derive(Default)]
pub struct RecordingHooks {
    pub line_override: CollideOverride,
    pub pair_override: CollideOverride,
    /// `item_collide` answer; `true` lets the pair pass.
    pub item_passes: Option<bool>,
    pub kart_bounces: bool,
    pub solid_bounces: bool,
    /// Remove damaged targets.
    pub lethal: bool,

    pub damage: Vec<DamageCall>,
    pub kills: Vec<EntityId>,
    pub items: Vec<(EntityId, EntityId, ItemGroup)>,
    pub touched: Vec<(EntityId, EntityId)>,
    pub bounces: Vec<(EntityId, EntityId)>,
    pub pvp: Vec<(EntityId, EntityId)>,
    pub solid_hits: Vec<(EntityId, EntityId)>,
    pub springs: Vec<(EntityId, EntityId)>,
    pub crossings: Vec<(LineId, u8, EntityId)>,
    pub tripwires: Vec<EntityId>,
    pub bumps: Vec<EntityId>,
    pub stair_janks: Vec<EntityId>,
    pub floor_hits: Vec<EntityId>,
    pub poly_touches: Vec<(PolyId, EntityId)>,
    pub sounds: Vec<(EntityId, SoundId)>,
}

impl GameHooks for RecordingHooks {
    fn apply_damage(
        &mut self,
        world: &mut World,
        target: EntityId,
        inflictor: Option<EntityId>,
        source: Option<EntityId>,
        damage: Damage,
    ) -> bool {
        use crate::api::MovementApi;
        self.damage.push(DamageCall { target, inflictor, source, damage });
        if self.lethal {
            world.remove(target);
        }
        true
    }

    fn kill(&mut self, world: &mut World, target: EntityId, _inflictor: Option<EntityId>, _source: Option<EntityId>) {
        use crate::api::MovementApi;
        self.kills.push(target);
        world.remove(target);
    }

    fn should_collide(&mut self, _world: &mut World, _a: EntityId, _b: EntityId) -> CollideOverride {
        self.pair_override
    }

    fn should_collide_line(&mut self, _world: &mut World, _entity: EntityId, _line: LineId) -> CollideOverride {
        self.line_override
    }

    fn item_collide(&mut self, _world: &mut World, item: EntityId, other: EntityId, group: ItemGroup) -> bool {
        self.items.push((item, other, group));
        self.item_passes.unwrap_or(true)
    }

    fn touch_special(&mut self, _world: &mut World, special: EntityId, toucher: EntityId) {
        self.touched.push((special, toucher));
    }

    fn kart_bounce(&mut self, _world: &mut World, a: EntityId, b: EntityId) -> bool {
        self.bounces.push((a, b));
        self.kart_bounces
    }

    fn pvp_touch_damage(&mut self, _world: &mut World, a: EntityId, b: EntityId) {
        self.pvp.push((a, b));
    }

    fn solid_bounce(&mut self, _world: &mut World, player: EntityId, solid: EntityId) -> bool {
        self.solid_hits.push((player, solid));
        self.solid_bounces
    }

    fn sprung(&mut self, _world: &mut World, spring: EntityId, object: EntityId) {
        self.springs.push((spring, object));
    }

    fn cross_special_line(&mut self, _world: &mut World, line: LineId, from_side: u8, entity: EntityId) {
        self.crossings.push((line, from_side, entity));
    }

    fn apply_tripwire(&mut self, _world: &mut World, player: EntityId) {
        self.tripwires.push(player);
    }

    fn bump_effect(&mut self, _world: &mut World, player: EntityId) {
        self.bumps.push(player);
    }

    fn stair_jank(&mut self, _world: &mut World, player: EntityId) {
        self.stair_janks.push(player);
    }

    fn hit_floor(&mut self, _world: &mut World, entity: EntityId) {
        self.floor_hits.push(entity);
    }

    fn touch_polyobject(&mut self, _world: &mut World, poly: PolyId, entity: EntityId) {
        self.poly_touches.push((poly, entity));
    }

    fn play_sound(&mut self, _world: &mut World, origin: EntityId, sound: SoundId) {
        self.sounds.push((origin, sound));
    }
}
