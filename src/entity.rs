//! Entity records and the generation-checked arena that owns them.

use crate::fixed::{Angle, FRACUNIT, Fixed};
use crate::secnode::NodeId;
use crate::types::*;

/// Per-type constants shared by every entity of one kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityInfo {
    /// Height at spawn; goo sink depth derives from it.
    pub spawn_height: Fixed,
    /// Springs: vertical launch speed.
    pub mass: Fixed,
    /// Springs: horizontal launch speed. Others: contact damage amount.
    pub damage: Fixed,
    pub speed: Fixed,
    /// Flags the entity spawned with.
    pub flags: MobjFlags,
    pub contact_damage: DamageKind,
    pub contact_sound: Option<SoundId>,
    pub active_sound: Option<SoundId>,
}

/// Player-only state read by the collision rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerState {
    pub spectator: bool,
    pub in_pain: bool,
    pub flashing: u32,
    pub hyudoro_timer: u32,
    pub just_bumped: u32,
    pub invincibility_timer: u32,
    pub grow_shrink_timer: i32,
    pub spinout_timer: u32,
    pub bumpers: u32,
    pub trick_panel: u8,
    pub bubble_blowup: u32,
    pub water_skip: u32,
    pub water_run: bool,
    /// Current ground speed.
    pub speed: Fixed,
    /// Conveyor momentum.
    pub cmomx: Fixed,
    pub cmomy: Fixed,
    /// Momentum relative to conveyors.
    pub rmomx: Fixed,
    pub rmomy: Fixed,
    pub stair_jank: u32,
    pub spring_stars: u32,
    pub tire_grease: u32,
}

#[derive(Clone, Debug)]
pub struct Entity {
    pub kind: EntityKind,
    pub info: EntityInfo,

    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub momx: Fixed,
    pub momy: Fixed,
    pub momz: Fixed,
    /// Vertical momentum inherited from the platform below.
    pub pmomz: Fixed,
    pub angle: Angle,
    pub pitch: Angle,
    pub roll: Angle,

    pub radius: Fixed,
    pub height: Fixed,
    pub scale: Fixed,

    pub flags: MobjFlags,
    pub flags2: MobjFlags2,
    pub eflags: ExtraFlags,

    pub health: i32,
    pub hitlag: u32,
    pub threshold: i32,
    pub extra_value1: i32,
    pub move_factor: Fixed,
    pub target: Option<EntityId>,
    pub tracer: Option<EntityId>,

    pub floor_z: Fixed,
    pub ceiling_z: Fixed,
    /// Height of the step just dropped below the floor, cleared on landing.
    pub floor_drop: Fixed,
    pub ceiling_drop: Fixed,
    pub floor_surface: Surface,
    pub ceiling_surface: Surface,
    pub standing_slope: Option<SlopeId>,
    pub terrain_pic: u32,
    pub sector: SectorId,

    pub player: Option<PlayerState>,

    pub(crate) cell: Option<usize>,
    pub(crate) touching: Option<NodeId>,
}

impl Entity {
    pub fn new(kind: EntityKind, x: Fixed, y: Fixed, z: Fixed, radius: Fixed, height: Fixed) -> Self {
        Self {
            kind,
            info: EntityInfo::default(),
            x,
            y,
            z,
            momx: 0,
            momy: 0,
            momz: 0,
            pmomz: 0,
            angle: 0,
            pitch: 0,
            roll: 0,
            radius,
            height,
            scale: FRACUNIT,
            flags: MobjFlags::empty(),
            flags2: MobjFlags2::empty(),
            eflags: ExtraFlags::empty(),
            health: 1,
            hitlag: 0,
            threshold: 0,
            extra_value1: 0,
            move_factor: 0,
            target: None,
            tracer: None,
            floor_z: z,
            ceiling_z: z.saturating_add(height),
            floor_drop: 0,
            ceiling_drop: 0,
            floor_surface: Surface::default(),
            ceiling_surface: Surface::default(),
            standing_slope: None,
            terrain_pic: 0,
            sector: SectorId(0),
            player: if kind == EntityKind::Player { Some(PlayerState::default()) } else { None },
            cell: None,
            touching: None,
        }
    }

    /// Sets the flags and records them as the spawn flags.
    pub fn with_flags(mut self, flags: MobjFlags) -> Self {
        self.flags = flags;
        self.info.flags = flags;
        self
    }

    pub fn with_info(mut self, info: EntityInfo) -> Self {
        self.flags = info.flags;
        self.info = info;
        self
    }

    pub fn with_momentum(mut self, momx: Fixed, momy: Fixed, momz: Fixed) -> Self {
        self.momx = momx;
        self.momy = momy;
        self.momz = momz;
        self
    }

    #[inline]
    pub fn top(&self) -> Fixed {
        self.z.saturating_add(self.height)
    }

    #[inline]
    pub fn is_flipped(&self) -> bool {
        self.eflags.contains(ExtraFlags::VERTICAL_FLIP)
    }

    /// 1 normally, -1 under reversed gravity.
    #[inline]
    pub fn flip_sign(&self) -> Fixed {
        if self.is_flipped() { -1 } else { 1 }
    }

    #[inline]
    pub fn is_player(&self) -> bool {
        self.player.is_some()
    }

    pub fn is_spectator(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.spectator)
    }

    /// Resting on whichever surface gravity pulls it towards.
    pub fn on_ground(&self) -> bool {
        if self.is_flipped() { self.top() >= self.ceiling_z } else { self.z <= self.floor_z }
    }
}

// --- Arena -------------------------------------------------------------------

struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Entity storage. Removed slots are reused with a bumped generation.
#[derive(Default)]
pub struct Entities {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Entities {
    pub fn insert(&mut self, entity: Entity) -> EntityId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entity = Some(entity);
            return EntityId { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, entity: Some(entity) });
        EntityId { index, generation: 0 }
    }

    pub fn take(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(entity)
    }

    #[inline]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entity.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entity.as_mut()
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Two distinct live entities at once.
    pub fn pair_mut(&mut self, a: EntityId, b: EntityId) -> Option<(&mut Entity, &mut Entity)> {
        if a.index == b.index || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (lo, hi, swapped) = if a.index < b.index { (a, b, false) } else { (b, a, true) };
        let (left, right) = self.slots.split_at_mut(hi.index as usize);
        let first = left[lo.index as usize].entity.as_mut()?;
        let second = right[0].entity.as_mut()?;
        Some(if swapped { (second, first) } else { (first, second) })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live handles in slot order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entity.is_some())
            .map(|(i, s)| EntityId { index: i as u32, generation: s.generation })
            .collect()
    }
}
