use tracing::{info, trace};

use crate::api::{GameHooks, MovementApi};
use crate::blockmap::Blockmap;
use crate::crush;
use crate::entity::{Entities, Entity};
use crate::fixed::Fixed;
use crate::map::{BBox, Map, MapError};
use crate::movement;
use crate::narrowphase::{self, PositionCheck};
use crate::secnode::SecNodes;
use crate::types::*;

/// The collision world: static map, spatial index, entities and their
/// sector memberships.
pub struct World {
    pub cfg: WorldConfig,
    pub map: Map,
    pub blockmap: Blockmap,
    pub entities: Entities,
    pub nodes: SecNodes,
    pub tick: u32,
    crossings: Vec<LineCrossing>,
}

impl World {
    #[inline]
    pub fn sector_at(&self, x: Fixed, y: Fixed) -> SectorId {
        self.blockmap.sector_at(&self.map, x, y)
    }

    /// Links the entity into the grid cell of its origin and refreshes its
    /// sector memberships.
    pub fn set_position(&mut self, id: EntityId) {
        let Some(e) = self.entities.get(id) else { return };
        let (x, y, noblockmap) = (e.x, e.y, e.flags.contains(MobjFlags::NOBLOCKMAP));
        let sector = self.sector_at(x, y);
        let cell = if noblockmap { None } else { self.blockmap.cell_at(x, y) };
        if let Some(cell) = cell {
            self.blockmap.link(cell, id);
        }
        if let Some(e) = self.entities.get_mut(id) {
            e.cell = cell;
            e.sector = sector;
        }
        self.update_sector_nodes(id);
    }

    /// Takes the entity out of its grid cell. Sector nodes stay until the
    /// next [`set_position`](Self::set_position) so they can be reused.
    pub fn unset_position(&mut self, id: EntityId) {
        let Some(e) = self.entities.get_mut(id) else { return };
        if let Some(cell) = e.cell.take() {
            self.blockmap.unlink(cell, id);
        }
    }

    fn update_sector_nodes(&mut self, id: EntityId) {
        let Some(e) = self.entities.get(id) else { return };
        let (x, y, mut head) = (e.x, e.y, e.touching);
        let bbox = BBox::around(x, y, e.radius);

        self.nodes.disown_all(head);

        self.blockmap.new_episode();
        let range = self.blockmap.cells(&bbox);
        for lid in self.blockmap.collect_lines(range) {
            let line = self.map.line(lid);
            if line.polyobject.is_some() || !bbox.touches(&line.bbox) || line.box_side(&bbox) != -1 {
                continue;
            }
            let (front, back) = (line.front, line.back);
            head = Some(self.nodes.add(front, id, head));
            if let Some(back) = back {
                head = Some(self.nodes.add(back, id, head));
            }
        }
        let own = self.sector_at(x, y);
        head = Some(self.nodes.add(own, id, head));

        self.nodes.sweep_disowned(&mut head);
        trace!(?id, nodes = self.nodes.len(), "sector membership updated");
        if let Some(e) = self.entities.get_mut(id) {
            e.touching = head;
        }
    }

    /// Sectors the entity currently overlaps.
    pub fn touching_sectors(&self, id: EntityId) -> Vec<SectorId> {
        self.entities.get(id).map(|e| self.nodes.sectors_of(e.touching)).unwrap_or_default()
    }

    /// Union of the flags of every sector the entity overlaps.
    pub fn touching_sector_flags(&self, id: EntityId) -> SectorFlags {
        self.touching_sectors(id)
            .into_iter()
            .fold(SectorFlags::empty(), |acc, s| acc | self.map.sector(s).flags)
    }

    pub(crate) fn push_crossing(&mut self, crossing: LineCrossing) {
        self.crossings.push(crossing);
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            entities: self.entities.len(),
            sector_nodes: self.nodes.len(),
            free_nodes: self.nodes.free_len(),
            cells: self.blockmap.cell_count(),
        }
    }
}

impl MovementApi for World {
    fn new(map: Map, cfg: WorldConfig) -> Result<Self, MapError> {
        let blockmap = Blockmap::new(&map, &cfg)?;
        let nodes = SecNodes::new(map.sectors.len());
        info!(
            sectors = map.sectors.len(),
            lines = map.lines.len(),
            polyobjects = map.polyobjects.len(),
            cells = blockmap.cell_count(),
            "collision world ready"
        );
        Ok(Self { cfg, map, blockmap, entities: Entities::default(), nodes, tick: 0, crossings: Vec::new() })
    }

    fn begin_tick(&mut self) {
        for id in self.entities.ids() {
            if let Some(e) = self.entities.get_mut(id) {
                e.eflags.remove(ExtraFlags::SPRUNG | ExtraFlags::JUST_BOUNCED_WALL);
            }
        }
        self.crossings.clear();
        self.tick = self.tick.wrapping_add(1);
    }

    fn drain_crossings(&mut self) -> Vec<LineCrossing> {
        std::mem::take(&mut self.crossings)
    }

    fn spawn(&mut self, mut entity: Entity) -> EntityId {
        let (x, y) = (entity.x, entity.y);
        let sector = self.sector_at(x, y);
        entity.sector = sector;
        entity.floor_z = narrowphase::floor_z_at_pos(self, x, y, entity.z, entity.height);
        entity.ceiling_z = narrowphase::ceiling_z_at_pos(self, x, y, entity.z, entity.height);
        entity.floor_surface = Surface::Sector(sector);
        entity.ceiling_surface = Surface::Sector(sector);
        entity.cell = None;
        entity.touching = None;
        let id = self.entities.insert(entity);
        self.set_position(id);
        id
    }

    fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.unset_position(id);
        let mut head = self.entities.get(id)?.touching;
        self.nodes.delete_list(&mut head);
        trace!(?id, "entity removed");
        self.entities.take(id)
    }

    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    fn update_membership(&mut self, id: EntityId) {
        self.update_sector_nodes(id);
    }

    fn check_position(&mut self, hooks: &mut dyn GameHooks, id: EntityId, x: Fixed, y: Fixed) -> Option<PositionCheck> {
        narrowphase::check_position(self, hooks, id, x, y)
    }

    fn try_move(&mut self, hooks: &mut dyn GameHooks, id: EntityId, x: Fixed, y: Fixed, allow_dropoff: bool) -> bool {
        movement::try_move(self, hooks, id, x, y, allow_dropoff)
    }

    fn move_by_momentum(&mut self, hooks: &mut dyn GameHooks, id: EntityId) -> bool {
        movement::move_by_momentum(self, hooks, id)
    }

    fn set_origin(&mut self, hooks: &mut dyn GameHooks, id: EntityId, x: Fixed, y: Fixed, z: Fixed) -> bool {
        movement::set_origin(self, hooks, id, x, y, z)
    }

    fn thing_height_clip(&mut self, hooks: &mut dyn GameHooks, id: EntityId) -> bool {
        crush::thing_height_clip(self, hooks, id)
    }

    fn check_sector(&mut self, hooks: &mut dyn GameHooks, sector: SectorId, crunch: bool) -> bool {
        crush::check_sector(self, hooks, sector, crunch)
    }
}
